//! Originator-side OS group commands.

use std::sync::Arc;

use log::{info, warn};

use crate::error::{MgmtError, Result, Status};
use crate::mgmt::call::{CallEngine, Conversation, ReplySlot};
use crate::mgmt::cbor;
use crate::mgmt::group;
use crate::mgmt::header::{Header, Op};
use crate::mgmt::registry::{Group, Handler, MgmtCtxt, Role};
use crate::mgmt::transport::Transport;
use crate::ports::TaskInfo;

use super::{ID_ECHO, ID_RESET, ID_TASKSTAT, codec};

/// Typed OS group client bound to one call engine.
pub struct OsClient<T> {
    engine: Arc<CallEngine<T>>,
    group: Arc<Group>,
    echoes: Arc<ReplySlot<String>>,
    tasks: Arc<ReplySlot<Vec<TaskInfo>>>,
}

fn stale(conv: &Conversation, ctxt: &MgmtCtxt<'_>) -> bool {
    if conv.is_current(ctxt.header.seq) {
        return false;
    }
    warn!(
        "OS[client]: reply id {} for stale seq {}",
        ctxt.header.id, ctxt.header.seq
    );
    true
}

impl<T: Transport> OsClient<T> {
    pub fn new(engine: Arc<CallEngine<T>>) -> Self {
        let echoes: Arc<ReplySlot<String>> = Arc::new(ReplySlot::new());
        let tasks: Arc<ReplySlot<Vec<TaskInfo>>> = Arc::new(ReplySlot::new());

        let echo = {
            let conv = Arc::clone(engine.conversation());
            let echoes = Arc::clone(&echoes);
            Handler::new().with_both(move |ctxt: &mut MgmtCtxt<'_>| -> Status {
                if stale(&conv, ctxt) {
                    return Err(MgmtError::BadState);
                }
                echoes.put(ctxt.header.seq, codec::decode_echo_rsp(ctxt.payload)?);
                Ok(())
            })
        };
        let taskstat = {
            let conv = Arc::clone(engine.conversation());
            let tasks = Arc::clone(&tasks);
            Handler::new().with_read(move |ctxt: &mut MgmtCtxt<'_>| -> Status {
                if stale(&conv, ctxt) {
                    return Err(MgmtError::BadState);
                }
                tasks.put(ctxt.header.seq, codec::decode_taskstat_rsp(ctxt.payload)?);
                Ok(())
            })
        };
        let reset = Handler::new().with_both(|ctxt: &mut MgmtCtxt<'_>| -> Status {
            cbor::rc_status(ctxt.payload)
        });

        let group = Arc::new(
            Group::new(group::OS, "os-client")
                .with_handler(ID_ECHO, echo)
                .with_handler(ID_TASKSTAT, taskstat)
                .with_handler(ID_RESET, reset),
        );
        engine
            .runtime()
            .registry()
            .register(Role::Client, Arc::clone(&group));

        Self {
            engine,
            group,
            echoes,
            tasks,
        }
    }

    /// Ask the peer to echo `text` back.
    pub fn echo(&self, text: &str) -> Result<String> {
        let body = codec::encode_echo_req(text)?;
        let sent = self
            .engine
            .call(Header::command(Op::Write, group::OS, ID_ECHO), &body)?;
        self.echoes.take(sent.seq).ok_or(MgmtError::BadState)
    }

    /// Fetch the peer's task table.
    pub fn taskstat(&self) -> Result<Vec<TaskInfo>> {
        let sent = self.engine.call(
            Header::command(Op::Read, group::OS, ID_TASKSTAT),
            &cbor::empty_map(),
        )?;
        self.tasks.take(sent.seq).ok_or(MgmtError::BadState)
    }

    /// Ask the peer to reboot.
    pub fn reset(&self) -> Result<()> {
        self.engine.call(
            Header::command(Op::Write, group::OS, ID_RESET),
            &cbor::empty_map(),
        )?;
        info!("OS[client]: peer accepted reset");
        Ok(())
    }
}

impl<T> Drop for OsClient<T> {
    fn drop(&mut self) {
        self.engine.runtime().registry().unregister(&self.group);
    }
}
