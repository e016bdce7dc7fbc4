//! Process-wide management runtime and frame dispatcher.
//!
//! ```text
//!  link rx ──▶ process_frame ──┬─ command (even op) ──▶ server registry ──▶ handler ──▶ link tx
//!                              │
//!                              └─ response (odd op) ──▶ client registry ──▶ handler ──▶ RspDone
//! ```
//!
//! `process_frame` runs on whatever context the link delivers frames on.
//! Every step publishes a lifecycle event; the call engine listens for
//! `RspDone` to wake a parked caller.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::config::{ConfigError, MgmtConfig};
use crate::error::{MgmtError, Status};

use super::cbor;
use super::events::{EventBus, EventKind};
use super::header::{Header, Op, split_frame};
use super::registry::{HandlerFn, MgmtCtxt, Registry, Role};
use super::sequence::SequenceAllocator;
use super::transport::Transport;

/// Registry, event bus, sequence counter and config for one device.
pub struct MgmtRuntime {
    config: MgmtConfig,
    registry: Registry,
    events: EventBus,
    sequence: SequenceAllocator,
    /// Set while a call engine is bound.
    engine_bound: AtomicBool,
}

impl MgmtRuntime {
    /// Build a runtime after validating `config`.
    pub fn new(config: MgmtConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "MGMT: runtime up (frame {} B, timeout {} ms)",
            config.max_frame_size, config.call_timeout_ms
        );
        Ok(Self {
            config,
            registry: Registry::new(),
            events: EventBus::new(),
            sequence: SequenceAllocator::new(),
            engine_bound: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &MgmtConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn next_sequence(&self) -> u8 {
        self.sequence.next()
    }

    /// Claim the runtime for a call engine. `false` if one is bound.
    pub(crate) fn bind_engine(&self) -> bool {
        self.engine_bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn unbind_engine(&self) {
        self.engine_bound.store(false, Ordering::Release);
    }

    /// Handle one complete inbound frame.
    ///
    /// Returns the status of the handler that ran (or of the framing
    /// check). For commands the status has already been reported to the
    /// peer in the response body.
    pub fn process_frame(&self, frame: &[u8], transport: &dyn Transport) -> Status {
        if frame.len() > self.config.max_frame_size {
            warn!(
                "MGMT: dropping {} B frame (limit {})",
                frame.len(),
                self.config.max_frame_size
            );
            return Err(MgmtError::MsgSize);
        }
        let (header, payload) = split_frame(frame).inspect_err(|e| {
            warn!("MGMT: framing error on {} B frame: {}", frame.len(), e);
        })?;

        debug!(
            "MGMT: rx {} group {} ({}) id {} seq {} len {}",
            header.op,
            header.group,
            super::group_name(header.group),
            header.id,
            header.seq,
            header.len
        );

        if header.is_command() {
            self.handle_command(header, payload, transport)
        } else {
            self.handle_response(header, payload, transport.mtu())
        }
    }

    fn pick(&self, role: Role, header: &Header) -> Option<HandlerFn> {
        let handler = self.registry.find(role, header.group, header.id)?;
        match header.op {
            Op::Read | Op::ReadRsp => handler.read,
            Op::Write | Op::WriteRsp => handler.write,
        }
    }

    fn handle_command(&self, header: Header, payload: &[u8], transport: &dyn Transport) -> Status {
        self.events.publish(EventKind::CmdRecv, &header, None);

        let mtu = transport.mtu().min(self.config.max_frame_size);
        let mut ctxt = MgmtCtxt::new(header, payload, mtu);
        let status = match self.pick(Role::Server, &header) {
            Some(f) => f(&mut ctxt),
            None => Err(MgmtError::NotSupported),
        };
        self.events.publish(EventKind::CmdStatus, &header, Some(status));

        let mut body = match status {
            Ok(()) => ctxt.rsp,
            Err(e) => {
                debug!("MGMT: group {} id {} -> {}", header.group, header.id, e);
                cbor::encode_rc(e.code())
            }
        };
        if body.len() > self.config.max_payload() {
            warn!(
                "MGMT: {} B response exceeds frame, replying MsgSize",
                body.len()
            );
            body = cbor::encode_rc(MgmtError::MsgSize.code());
        }

        let rsp = header.response(body.len() as u16);
        let sent = transport.send(&rsp, &body).map_err(MgmtError::from);
        if let Err(e) = sent {
            warn!("MGMT: response seq {} not sent: {}", header.seq, e);
        }

        let done = status.and(sent);
        self.events.publish(EventKind::CmdDone, &header, Some(done));
        done
    }

    fn handle_response(&self, header: Header, payload: &[u8], mtu: usize) -> Status {
        self.events.publish(EventKind::RspRecv, &header, None);

        let mut ctxt = MgmtCtxt::new(header, payload, mtu);
        let status = match self.pick(Role::Client, &header) {
            Some(f) => f(&mut ctxt),
            None => Err(MgmtError::NoClientHandler),
        };
        if let Err(e) = status {
            warn!(
                "MGMT: response group {} id {} seq {}: {}",
                header.group, header.id, header.seq, e
            );
        }

        self.events.publish(EventKind::RspStatus, &header, Some(status));
        self.events.publish(EventKind::RspDone, &header, Some(status));
        status
    }
}
