//! Scripted remote peer for integration tests.
//!
//! Frames sent to the peer are recorded and handed to a responder thread,
//! which asks the script for replies and feeds them back into the
//! originator's runtime, optionally after a delay.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devmgmt::error::TransportError;
use devmgmt::mgmt::dispatch::MgmtRuntime;
use devmgmt::mgmt::header::{Header, encode_frame, split_frame};
use devmgmt::mgmt::transport::{NullTransport, Transport};

// ── Replies ───────────────────────────────────────────────────

/// One frame the peer sends back.
pub struct Reply {
    pub header: Header,
    pub body: Vec<u8>,
    pub delay: Duration,
}

/// Immediate response to `cmd` carrying `body`.
pub fn respond(cmd: &Header, body: Vec<u8>) -> Reply {
    Reply {
        header: cmd.response(body.len() as u16),
        body,
        delay: Duration::ZERO,
    }
}

#[allow(dead_code)]
impl Reply {
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_seq(mut self, seq: u8) -> Self {
        self.header.seq = seq;
        self
    }
}

type Script = Box<dyn Fn(&Header, &[u8]) -> Vec<Reply> + Send>;

// ── MockPeer ──────────────────────────────────────────────────

pub struct MockPeer {
    frames: Mutex<Sender<Vec<u8>>>,
    sent: Arc<Mutex<Vec<(Header, Vec<u8>)>>>,
    mtu: usize,
}

#[allow(dead_code)]
impl MockPeer {
    /// Start a peer that answers into `runtime`.
    pub fn spawn(
        runtime: Arc<MgmtRuntime>,
        mtu: usize,
        script: impl Fn(&Header, &[u8]) -> Vec<Reply> + Send + 'static,
    ) -> Self {
        let script: Script = Box::new(script);
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);

        std::thread::spawn(move || {
            for frame in rx {
                let (header, body) = split_frame(&frame).unwrap();
                log.lock().unwrap().push((header, body.to_vec()));
                for reply in script(&header, body) {
                    if !reply.delay.is_zero() {
                        std::thread::sleep(reply.delay);
                    }
                    let frame = encode_frame(&reply.header, &reply.body);
                    let _ = runtime.process_frame(&frame, &NullTransport);
                }
            }
        });

        Self {
            frames: Mutex::new(tx),
            sent,
            mtu,
        }
    }

    /// Commands the peer has received so far.
    pub fn sent(&self) -> Vec<(Header, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockPeer {
    fn send(&self, header: &Header, payload: &[u8]) -> Result<(), TransportError> {
        self.frames
            .lock()
            .unwrap()
            .send(encode_frame(header, payload))
            .map_err(|_| TransportError::NotConnected)
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}
