//! In-process management link between two runtimes.
//!
//! Each direction is a bounded `embassy-sync` channel drained by its own
//! delivery thread. A frame sent on one end is handed to the other end's
//! runtime, and whatever that runtime replies travels back the same way.
//!
//! ```text
//!  runtime A                                         runtime B
//!  ┌────────┐ send ┌──────────┐ deliver-a→b ┌──────────────────┐
//!  │ end A  │─────▶│ channel  │────────────▶│ B.process_frame  │
//!  │        │◀─────│ channel  │◀────────────│   (replies on B) │
//!  └────────┘      └──────────┘ deliver-b→a └──────────────────┘
//! ```
//!
//! Frames are queued with `try_send`, so a stalled peer surfaces as
//! [`TransportError::QueueFull`] rather than blocking the sender.

use core::sync::atomic::{AtomicBool, Ordering};

use std::sync::Arc;
use std::thread::JoinHandle;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future::block_on;
use log::{debug, info, warn};

use crate::error::TransportError;
use crate::mgmt::dispatch::MgmtRuntime;
use crate::mgmt::header::{Header, HEADER_SIZE, encode_frame};
use crate::mgmt::transport::Transport;

/// Frames in flight per direction.
pub const LINK_DEPTH: usize = 8;

/// `None` stops the delivery thread.
type Link = Channel<CriticalSectionRawMutex, Option<Vec<u8>>, LINK_DEPTH>;

/// One end of a loopback link.
pub struct LoopbackTransport {
    name: &'static str,
    outbound: Arc<Link>,
    mtu: usize,
    connected: AtomicBool,
}

impl LoopbackTransport {
    fn new(name: &'static str, mtu: usize) -> Self {
        Self {
            name,
            outbound: Arc::new(Channel::new()),
            mtu,
            connected: AtomicBool::new(true),
        }
    }

    /// Refuse further frames with [`TransportError::NotConnected`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        info!("LOOPBACK[{}]: disconnected", self.name);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, header: &Header, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if HEADER_SIZE + payload.len() > self.mtu {
            return Err(TransportError::MtuExceeded);
        }
        let frame = encode_frame(header, payload);
        self.outbound.try_send(Some(frame)).map_err(|_| {
            warn!("LOOPBACK[{}]: queue full, dropping frame", self.name);
            TransportError::QueueFull
        })
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}

/// Two connected ends plus their delivery threads.
///
/// Dropping the pair stops both threads.
pub struct LoopbackPair {
    a: Arc<LoopbackTransport>,
    b: Arc<LoopbackTransport>,
    workers: Vec<JoinHandle<()>>,
}

impl LoopbackPair {
    /// Connect runtime `a` to runtime `b` with the given MTU on both ends.
    pub fn connect(
        a: Arc<MgmtRuntime>,
        b: Arc<MgmtRuntime>,
        mtu: usize,
    ) -> Result<Self, TransportError> {
        let end_a = Arc::new(LoopbackTransport::new("a", mtu));
        let end_b = Arc::new(LoopbackTransport::new("b", mtu));

        let mut pair = Self {
            a: Arc::clone(&end_a),
            b: Arc::clone(&end_b),
            workers: Vec::with_capacity(2),
        };
        // frames sent on A are processed by B, which replies on B
        pair.workers.push(spawn_delivery("deliver-a>b", &end_a, b, &end_b)?);
        pair.workers.push(spawn_delivery("deliver-b>a", &end_b, a, &end_a)?);
        info!("LOOPBACK: linked (mtu {})", mtu);
        Ok(pair)
    }

    /// End attached to the first runtime.
    pub fn a(&self) -> &Arc<LoopbackTransport> {
        &self.a
    }

    /// End attached to the second runtime.
    pub fn b(&self) -> &Arc<LoopbackTransport> {
        &self.b
    }
}

impl Drop for LoopbackPair {
    fn drop(&mut self) {
        for end in [&self.a, &self.b] {
            block_on(end.outbound.send(None));
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("LOOPBACK: delivery thread panicked");
            }
        }
    }
}

fn spawn_delivery(
    name: &'static str,
    from: &LoopbackTransport,
    runtime: Arc<MgmtRuntime>,
    reply_on: &Arc<LoopbackTransport>,
) -> Result<JoinHandle<()>, TransportError> {
    let link = Arc::clone(&from.outbound);
    let reply_on = Arc::clone(reply_on);
    std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            while let Some(frame) = block_on(link.receive()) {
                if let Err(e) = runtime.process_frame(&frame, &*reply_on) {
                    debug!("LOOPBACK[{}]: frame status {}", name, e);
                }
            }
            debug!("LOOPBACK[{}]: stopped", name);
        })
        .map_err(|e| {
            warn!("LOOPBACK: cannot spawn {}: {}", name, e);
            TransportError::Io
        })
}
