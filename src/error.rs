//! Status taxonomy for the management runtime.
//!
//! A single `MgmtError` enum that every layer converts into: header
//! framing, registry dispatch, the call engine and the transfer state
//! machines all surface the same status values to callers. All variants
//! are `Copy` so they can be carried through the event bus and the
//! wait-signal without allocation.
//!
//! Codes 0–11 are the wire `rc` values a responder puts in its reply.
//! Codes from [`LOCAL_CODE_BASE`] upwards never leave the device; they
//! describe failures detected by the originator itself.

use core::fmt;

/// First code used for originator-local statuses.
pub const LOCAL_CODE_BASE: i32 = 256;

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`Transport`](crate::mgmt::transport::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Link is down or the peer went away.
    NotConnected,
    /// Outbound queue is full; the frame was not accepted.
    QueueFull,
    /// Frame does not fit the transport MTU.
    MtuExceeded,
    /// MTU leaves no room for payload once protocol overhead is removed.
    MtuTooSmall,
    /// Low-level write failed.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::QueueFull => write!(f, "outbound queue full"),
            Self::MtuExceeded => write!(f, "frame exceeds MTU"),
            Self::MtuTooSmall => write!(f, "MTU too small for protocol overhead"),
            Self::Io => write!(f, "I/O failure"),
        }
    }
}

// ---------------------------------------------------------------------------
// Management status
// ---------------------------------------------------------------------------

/// Every non-success outcome a management operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgmtError {
    /// Unrecognised failure (also used for unknown remote codes).
    Unknown,
    /// Out of memory or a fixed-capacity table is full.
    OutOfMemory,
    /// Caller-supplied name, buffer or size is invalid.
    InvalidArgument,
    /// No matching completion arrived within the wait interval.
    Timeout,
    /// Object or entry does not exist.
    NotFound,
    /// Conversation busy, or a response did not belong to it.
    BadState,
    /// Message too large for the frame or response buffer.
    MsgSize,
    /// Command not supported by the responder.
    NotSupported,
    /// Frame is malformed (short header, bad op, length mismatch).
    Corrupt,
    /// CBOR payload could not be decoded.
    Decode,
    /// CBOR payload could not be encoded.
    Encode,
    /// Offset or length bookkeeping violated during a transfer.
    Offset,
    /// The transport refused or failed to carry the frame.
    Transport(TransportError),
    /// A response arrived for a command no client handler serves.
    NoClientHandler,
    /// Declared object length exceeds the destination capacity.
    InsufficientSpace,
}

impl MgmtError {
    /// Numeric status code (`rc`) for this error.
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => 1,
            Self::OutOfMemory => 2,
            Self::InvalidArgument => 3,
            Self::Timeout => 4,
            Self::NotFound => 5,
            Self::BadState => 6,
            Self::MsgSize => 7,
            Self::NotSupported => 8,
            Self::Corrupt => 9,
            Self::Decode => 10,
            Self::Encode => 11,
            Self::Offset => LOCAL_CODE_BASE,
            Self::Transport(_) => LOCAL_CODE_BASE + 1,
            Self::NoClientHandler => LOCAL_CODE_BASE + 2,
            Self::InsufficientSpace => LOCAL_CODE_BASE + 3,
        }
    }

    /// Map a remote `rc` back to a status. `0` is not an error and maps
    /// to `None`.
    pub const fn from_code(code: i32) -> Option<Self> {
        let err = match code {
            0 => return None,
            2 => Self::OutOfMemory,
            3 => Self::InvalidArgument,
            4 => Self::Timeout,
            5 => Self::NotFound,
            6 => Self::BadState,
            7 => Self::MsgSize,
            8 => Self::NotSupported,
            9 => Self::Corrupt,
            10 => Self::Decode,
            11 => Self::Encode,
            _ => Self::Unknown,
        };
        Some(err)
    }

    /// Convert a remote `rc` into a [`Status`].
    pub fn check_rc(code: i32) -> Status {
        match Self::from_code(code) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

impl fmt::Display for MgmtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "{}-Unknown", self.code()),
            Self::OutOfMemory => write!(f, "{}-No Memory", self.code()),
            Self::InvalidArgument => write!(f, "{}-Invalid Argument", self.code()),
            Self::Timeout => write!(f, "{}-Timeout", self.code()),
            Self::NotFound => write!(f, "{}-No Entry", self.code()),
            Self::BadState => write!(f, "{}-Current state disallows command", self.code()),
            Self::MsgSize => write!(f, "{}-Response too large", self.code()),
            Self::NotSupported => write!(f, "{}-Command not supported", self.code()),
            Self::Corrupt => write!(f, "{}-Corrupt", self.code()),
            Self::Decode => write!(f, "{}-Decode", self.code()),
            Self::Encode => write!(f, "{}-Encode", self.code()),
            Self::Offset => write!(f, "{}-Offset", self.code()),
            Self::Transport(e) => write!(f, "{}-Transport ({e})", self.code()),
            Self::NoClientHandler => write!(f, "{}-No client handler", self.code()),
            Self::InsufficientSpace => write!(f, "{}-Insufficient space", self.code()),
        }
    }
}

impl From<TransportError> for MgmtError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<minicbor::decode::Error> for MgmtError {
    fn from(_: minicbor::decode::Error) -> Self {
        Self::Decode
    }
}

impl<E> From<minicbor::encode::Error<E>> for MgmtError {
    fn from(_: minicbor::encode::Error<E>) -> Self {
        Self::Encode
    }
}

// ---------------------------------------------------------------------------
// Convenience aliases
// ---------------------------------------------------------------------------

/// Outcome of an operation that produces no value.
pub type Status = core::result::Result<(), MgmtError>;

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, MgmtError>;
