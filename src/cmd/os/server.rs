//! Responder-side OS group handlers backed by an [`OsPort`].

use std::sync::Arc;

use log::{info, warn};

use crate::config::MgmtConfig;
use crate::error::Status;
use crate::mgmt::cbor;
use crate::mgmt::dispatch::MgmtRuntime;
use crate::mgmt::group;
use crate::mgmt::registry::{Group, Handler, MgmtCtxt, Role};
use crate::ports::OsPort;

use super::{ID_ECHO, ID_RESET, ID_TASKSTAT, codec};

pub struct OsServer<P> {
    port: Arc<P>,
    reset_delay_ms: u32,
}

impl<P: OsPort + 'static> OsServer<P> {
    pub fn new(port: Arc<P>, config: &MgmtConfig) -> Arc<Self> {
        Arc::new(Self {
            port,
            reset_delay_ms: config.reset_delay_ms,
        })
    }

    pub fn group(self: &Arc<Self>) -> Group {
        let ts = Arc::clone(self);
        let rs = Arc::clone(self);
        Group::new(group::OS, "os")
            .with_handler(ID_ECHO, Handler::new().with_both(echo))
            .with_handler(
                ID_TASKSTAT,
                Handler::new().with_read(move |ctxt| ts.taskstat(ctxt)),
            )
            .with_handler(ID_RESET, Handler::new().with_write(move |ctxt| rs.reset(ctxt)))
    }

    /// Build a server over `port` and register it with `runtime`.
    pub fn register(runtime: &MgmtRuntime, port: Arc<P>) -> Arc<Group> {
        let group = Arc::new(Self::new(port, runtime.config()).group());
        runtime
            .registry()
            .register(Role::Server, Arc::clone(&group));
        group
    }

    fn taskstat(&self, ctxt: &mut MgmtCtxt<'_>) -> Status {
        let tasks = self.port.tasks();
        ctxt.rsp = codec::encode_taskstat_rsp(&tasks)?;
        Ok(())
    }

    fn reset(&self, ctxt: &mut MgmtCtxt<'_>) -> Status {
        info!("OS[server]: reset requested, {} ms", self.reset_delay_ms);
        self.port.reset(self.reset_delay_ms).inspect_err(|e| {
            warn!("OS[server]: reset refused: {}", e);
        })?;
        ctxt.rsp = cbor::empty_map();
        Ok(())
    }
}

fn echo(ctxt: &mut MgmtCtxt<'_>) -> Status {
    let text = codec::decode_echo_req(ctxt.payload)?;
    ctxt.rsp = codec::encode_echo_rsp(text)?;
    Ok(())
}
