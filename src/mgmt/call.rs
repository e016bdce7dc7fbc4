//! Synchronous call engine.
//!
//! One conversation slot per engine. A caller stamps a fresh sequence
//! number into the command, sends it, and parks on a wait-signal until
//! the dispatcher reports `RspDone` for that sequence or the timeout
//! elapses.
//!
//! ```text
//!  caller ctx                          link ctx
//!  ──────────                          ────────
//!  session(): try_lock slot ─ busy? ─▶ BadState
//!  seq = next()
//!  conversation.begin(seq)
//!  transport.send ─────────────────▶  … peer …
//!  wait(signal, timeout)              process_frame(rsp)
//!        ▲                              client handler ─▶ ReplySlot.put(seq)
//!        └──────── signal(status) ◀──── RspDone(seq) ─ seq matches? ─ no ─▶ warn, drop
//!  conversation.end()
//!  drop(session) ─▶ unlock
//! ```
//!
//! A transfer keeps one [`Session`] for all of its round trips, so no
//! other caller can interleave between chunks.
//!
//! A completion whose sequence does not match the live conversation is
//! logged and discarded, so a late reply to a timed-out call can never
//! wake or corrupt the next one.

use core::cell::RefCell;

use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};
use futures_lite::future::block_on;
use log::{debug, warn};

use crate::error::{MgmtError, Result, Status};

use super::dispatch::MgmtRuntime;
use super::events::{EventKind, SubscriberId};
use super::header::Header;
use super::transport::Transport;

// ── Conversation ─────────────────────────────────────────────

/// Correlation state shared between the caller and the link context.
pub struct Conversation {
    expected: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<u8>>>,
    done: Signal<CriticalSectionRawMutex, Status>,
}

impl Conversation {
    pub const fn new() -> Self {
        Self {
            expected: BlockingMutex::new(RefCell::new(None)),
            done: Signal::new(),
        }
    }

    /// Open a conversation for `seq`, clearing any stale signal.
    pub fn begin(&self, seq: u8) {
        self.expected.lock(|e| {
            self.done.reset();
            *e.borrow_mut() = Some(seq);
        });
    }

    /// `seq` belongs to the live conversation.
    pub fn is_current(&self, seq: u8) -> bool {
        self.expected.lock(|e| *e.borrow() == Some(seq))
    }

    /// Report the outcome for `seq`. Only the first completion carrying
    /// the live sequence signals the waiter; anything else is dropped.
    pub fn complete(&self, seq: u8, status: Status) -> bool {
        let matched = self.expected.lock(|e| {
            let mut e = e.borrow_mut();
            if *e == Some(seq) {
                *e = None;
                self.done.signal(status);
                true
            } else {
                false
            }
        });
        if !matched {
            warn!("MGMT: discarding completion for stale seq {}", seq);
        }
        matched
    }

    /// Close the conversation; later completions are stale.
    pub fn end(&self) {
        self.expected.lock(|e| *e.borrow_mut() = None);
    }

    async fn wait(&self) -> Status {
        self.done.wait().await
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

// ── Reply slot ───────────────────────────────────────────────

/// Decoded response body handed from a client handler to the caller.
///
/// Tagged with the sequence it answers; a `take` for any other sequence
/// yields nothing.
pub struct ReplySlot<R> {
    slot: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<(u8, R)>>>,
}

impl<R> ReplySlot<R> {
    pub const fn new() -> Self {
        Self {
            slot: BlockingMutex::new(RefCell::new(None)),
        }
    }

    pub fn put(&self, seq: u8, reply: R) {
        self.slot.lock(|s| *s.borrow_mut() = Some((seq, reply)));
    }

    /// Remove the reply for `seq`. A reply for another sequence is
    /// discarded.
    pub fn take(&self, seq: u8) -> Option<R> {
        let held = self.slot.lock(|s| s.borrow_mut().take());
        match held {
            Some((s, reply)) if s == seq => Some(reply),
            Some((s, _)) => {
                warn!("MGMT: dropping reply for seq {} (expected {})", s, seq);
                None
            }
            None => None,
        }
    }
}

impl<R> Default for ReplySlot<R> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Call engine ──────────────────────────────────────────────

/// Runs one command round trip at a time over `T`.
///
/// A runtime serves at most one engine at a time: client handlers are
/// found by group and command id alone, so responses carry nothing that
/// could tell two engines apart.
pub struct CallEngine<T> {
    runtime: Arc<MgmtRuntime>,
    transport: T,
    slot: Mutex<CriticalSectionRawMutex, ()>,
    conversation: Arc<Conversation>,
    subscription: SubscriberId,
}

impl<T> CallEngine<T> {
    pub fn runtime(&self) -> &Arc<MgmtRuntime> {
        &self.runtime
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Shared with client handlers so they can check `is_current`.
    pub fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }
}

impl<T: Transport> CallEngine<T> {
    /// Bind an engine to `runtime`.
    ///
    /// Fails with `BadState` while another engine is bound to the same
    /// runtime. The engine holds one event-bus subscriber slot; both are
    /// given back when it is dropped.
    pub fn new(runtime: Arc<MgmtRuntime>, transport: T) -> Result<Self> {
        if !runtime.bind_engine() {
            warn!("MGMT: runtime already has a call engine");
            return Err(MgmtError::BadState);
        }

        let conversation = Arc::new(Conversation::new());
        let conv = Arc::clone(&conversation);
        let subscription = runtime
            .events()
            .subscribe(move |kind, header, status| {
                if kind == EventKind::RspDone {
                    conv.complete(header.seq, status.unwrap_or(Ok(())));
                }
            })
            .inspect_err(|_| runtime.unbind_engine())?;

        Ok(Self {
            runtime,
            transport,
            slot: Mutex::new(()),
            conversation,
            subscription,
        })
    }

    pub fn mtu(&self) -> usize {
        self.transport.mtu()
    }

    /// Claim the conversation slot for a run of round trips.
    ///
    /// Fails with `BadState` immediately if another caller holds it.
    pub fn session(&self) -> Result<Session<'_, T>> {
        match self.slot.try_lock() {
            Ok(guard) => Ok(Session {
                engine: self,
                _guard: guard,
            }),
            Err(_) => {
                debug!("MGMT: conversation busy");
                Err(MgmtError::BadState)
            }
        }
    }

    /// One round trip with the configured timeout.
    pub fn call(&self, header: Header, payload: &[u8]) -> Result<Header> {
        self.session()?.call(header, payload)
    }

    pub fn call_with_timeout(
        &self,
        header: Header,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Header> {
        self.session()?.call_with_timeout(header, payload, timeout)
    }
}

impl<T> Drop for CallEngine<T> {
    fn drop(&mut self) {
        self.runtime.events().unsubscribe(self.subscription);
        self.runtime.unbind_engine();
    }
}

/// Exclusive use of an engine's conversation slot.
///
/// The slot is released when the session is dropped, on every exit path.
pub struct Session<'a, T> {
    engine: &'a CallEngine<T>,
    _guard: MutexGuard<'a, CriticalSectionRawMutex, ()>,
}

impl<T: Transport> Session<'_, T> {
    pub fn mtu(&self) -> usize {
        self.engine.transport.mtu()
    }

    pub fn call(&self, header: Header, payload: &[u8]) -> Result<Header> {
        let ms = self.engine.runtime.config().call_timeout_ms;
        self.call_with_timeout(header, payload, Duration::from_millis(u64::from(ms)))
    }

    /// Send one command and block until its completion or `timeout`.
    ///
    /// Returns the header as sent (with its sequence stamped) so the
    /// caller can collect the matching reply.
    pub fn call_with_timeout(
        &self,
        header: Header,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Header> {
        let runtime = &self.engine.runtime;
        let conversation = &self.engine.conversation;

        if payload.len() > runtime.config().max_payload() {
            return Err(MgmtError::MsgSize);
        }

        let mut header = header;
        header.seq = runtime.next_sequence();
        header.len = payload.len() as u16;

        conversation.begin(header.seq);
        if let Err(e) = self.engine.transport.send(&header, payload) {
            conversation.end();
            warn!("MGMT: send seq {} failed: {}", header.seq, e);
            return Err(e.into());
        }
        runtime.events().publish(EventKind::CmdSent, &header, None);

        let outcome = block_on(with_timeout(timeout, conversation.wait()));
        conversation.end();

        match outcome {
            Ok(status) => status.map(|()| header),
            Err(_) => {
                warn!(
                    "MGMT: seq {} timed out after {} ms",
                    header.seq,
                    timeout.as_millis()
                );
                Err(MgmtError::Timeout)
            }
        }
    }
}
