//! Port traits: the boundary between the protocol and the device.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ command group (fs / os)
//! ```
//!
//! Adapters (flash file system, RTOS task table, reboot hook) implement
//! these traits. The command groups hold them behind `Arc`, so every
//! method takes `&self` and implementations use interior mutability.

use core::fmt;

use crate::error::{MgmtError, Status};

// ───────────────────────────────────────────────────────────────
// File store (file sink / source for transfers)
// ───────────────────────────────────────────────────────────────

/// Errors from [`FileStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Named object does not exist.
    NotFound,
    /// Backing storage is full.
    Full,
    /// Offset lies beyond the end of the object.
    OutOfRange,
    /// Generic I/O error.
    Io,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file"),
            Self::Full => write!(f, "storage full"),
            Self::OutOfRange => write!(f, "offset out of range"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<StoreError> for MgmtError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::Full => Self::OutOfMemory,
            StoreError::OutOfRange => Self::InvalidArgument,
            StoreError::Io => Self::Unknown,
        }
    }
}

/// Named, byte-addressable objects.
pub trait FileStore: Send + Sync {
    /// Read up to `buf.len()` bytes at `off`. Returns the number of bytes
    /// read; `0` at end of object.
    fn read(&self, name: &str, off: usize, buf: &mut [u8]) -> Result<usize, StoreError>;

    /// Write `data` at `off`, creating the object if needed. Writing at
    /// `off == 0` truncates.
    fn write(&self, name: &str, off: usize, data: &[u8]) -> Result<(), StoreError>;

    /// Current length of the object.
    fn length(&self, name: &str) -> Result<usize, StoreError>;
}

// ───────────────────────────────────────────────────────────────
// OS port (task table + reboot)
// ───────────────────────────────────────────────────────────────

/// One row of the task statistics table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: String,
    pub prio: u32,
    pub tid: u32,
    pub state: u32,
    /// Stack bytes in use.
    pub stkuse: u32,
    /// Stack size in bytes.
    pub stksiz: u32,
    /// Context switch count.
    pub cswcnt: u32,
    pub runtime: u32,
    pub last_checkin: u32,
    pub next_checkin: u32,
}

/// Operating-system services behind the OS group.
pub trait OsPort: Send + Sync {
    /// Snapshot of the running tasks.
    fn tasks(&self) -> Vec<TaskInfo>;

    /// Schedule a reboot after `delay_ms`. Must return before the reboot
    /// so the response can be sent.
    fn reset(&self, delay_ms: u32) -> Status;
}
