//! Protocol lifecycle event bus.
//!
//! Subscribers are notified synchronously, in registration order, on the
//! context that publishes. For transport-delivered frames that is the
//! transport's completion context, not the original caller's.
//!
//! ```text
//! ┌────────────────┐  publish   ┌──────────────┐     ┌──────────────┐
//! │ dispatcher     │──────────▶│  EventBus    │────▶│ subscriber 0 │
//! │ (transport ctx)│            │  (≤ 8 subs)  │────▶│ subscriber 1 │
//! └────────────────┘            └──────────────┘     └──────────────┘
//! ```
//!
//! This is the only path by which the completion context reports back to
//! a caller parked in the call engine. Subscribers must not block.

use core::cell::RefCell;
use core::fmt;

use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, warn};

use crate::error::{MgmtError, Result, Status};

use super::header::Header;

/// Maximum number of subscribers.
pub const MAX_SUBSCRIBERS: usize = 8;

/// Lifecycle points at which the bus fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    // ── Responder side ────────────────────────────────────
    /// A command frame was received.
    CmdRecv = 0,
    /// A command handler produced a status.
    CmdStatus = 1,
    /// The response to a command has been sent (or dropped).
    CmdDone = 2,

    // ── Originator side ───────────────────────────────────
    /// A response frame was received.
    RspRecv = 3,
    /// A client handler produced a status.
    RspStatus = 4,
    /// Response handling is finished; the conversation may complete.
    RspDone = 5,
    /// A command left through the transport.
    CmdSent = 6,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CmdRecv => "cmd-recv",
            Self::CmdStatus => "cmd-status",
            Self::CmdDone => "cmd-done",
            Self::RspRecv => "rsp-recv",
            Self::RspStatus => "rsp-status",
            Self::RspDone => "rsp-done",
            Self::CmdSent => "cmd-sent",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber callback: `(kind, header, status)`. The status is present
/// for `*Status` and `*Done` events.
pub type Subscriber = Arc<dyn Fn(EventKind, &Header, Option<Status>) + Send + Sync>;

/// Handle for removing a subscriber again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u32);

#[derive(Clone)]
struct Entry {
    id: u32,
    f: Subscriber,
}

struct Table {
    next_id: u32,
    entries: heapless::Vec<Entry, MAX_SUBSCRIBERS>,
}

/// Ordered subscriber list.
pub struct EventBus {
    subscribers: Mutex<CriticalSectionRawMutex, RefCell<Table>>,
}

impl EventBus {
    pub const fn new() -> Self {
        Self {
            subscribers: Mutex::new(RefCell::new(Table {
                next_id: 0,
                entries: heapless::Vec::new(),
            })),
        }
    }

    /// Append a subscriber. Fails with `OutOfMemory` once
    /// [`MAX_SUBSCRIBERS`] are registered.
    pub fn subscribe(
        &self,
        f: impl Fn(EventKind, &Header, Option<Status>) + Send + Sync + 'static,
    ) -> Result<SubscriberId> {
        let f: Subscriber = Arc::new(f);
        let added = self.subscribers.lock(|t| {
            let mut t = t.borrow_mut();
            let id = t.next_id;
            t.entries.push(Entry { id, f }).ok()?;
            t.next_id = id.wrapping_add(1);
            Some(id)
        });
        match added {
            Some(id) => {
                debug!("MGMT: subscriber {} registered", id);
                Ok(SubscriberId(id))
            }
            None => {
                warn!("MGMT: subscriber table full ({MAX_SUBSCRIBERS})");
                Err(MgmtError::OutOfMemory)
            }
        }
    }

    /// Remove the subscriber behind `id`, keeping the order of the rest.
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock(|t| {
            let mut t = t.borrow_mut();
            let pos = t.entries.iter().position(|e| e.id == id.0)?;
            t.entries.remove(pos);
            Some(())
        });
        if removed.is_some() {
            debug!("MGMT: subscriber {} removed", id.0);
        }
        removed.is_some()
    }

    /// Notify every subscriber in registration order.
    ///
    /// The list is snapshotted first so callbacks run without the lock
    /// held and may themselves publish or subscribe.
    pub fn publish(&self, kind: EventKind, header: &Header, status: Option<Status>) {
        let snapshot = self.subscribers.lock(|t| t.borrow().entries.clone());
        for entry in &snapshot {
            (entry.f)(kind, header, status);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock(|t| t.borrow().entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
