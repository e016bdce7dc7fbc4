//! Command group registry.
//!
//! Subsystems register [`Group`]s (a group id plus a handler table
//! indexed by command id) into one of two ordered lists: the responder
//! ("server") list serves incoming commands, the originator ("client")
//! list decodes incoming responses. Lookup is a linear scan in
//! registration order.
//!
//! ```text
//!  server: [ os ] ─▶ [ fs ] ─▶ [ user ]
//!  client: [ os-client ] ─▶ [ fs-client ]
//! ```

use core::cell::RefCell;
use core::fmt;

use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::info;

use crate::error::Status;

use super::header::Header;

// ── Handler context ──────────────────────────────────────────

/// Everything a handler sees while servicing one frame.
pub struct MgmtCtxt<'a> {
    /// Header of the frame being handled (host byte order).
    pub header: Header,
    /// CBOR body of the frame.
    pub payload: &'a [u8],
    /// Response body written by responder-side handlers.
    pub rsp: Vec<u8>,
    /// MTU of the transport the frame arrived on.
    pub mtu: usize,
}

impl<'a> MgmtCtxt<'a> {
    pub fn new(header: Header, payload: &'a [u8], mtu: usize) -> Self {
        Self {
            header,
            payload,
            rsp: Vec::new(),
            mtu,
        }
    }
}

/// A handler callback. Returns the status reported for the frame.
pub type HandlerFn = Arc<dyn Fn(&mut MgmtCtxt<'_>) -> Status + Send + Sync>;

// ── Handler / Group ──────────────────────────────────────────

/// Read-side and write-side callbacks for one command id.
#[derive(Clone, Default)]
pub struct Handler {
    pub read: Option<HandlerFn>,
    pub write: Option<HandlerFn>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read(mut self, f: impl Fn(&mut MgmtCtxt<'_>) -> Status + Send + Sync + 'static) -> Self {
        self.read = Some(Arc::new(f));
        self
    }

    pub fn with_write(mut self, f: impl Fn(&mut MgmtCtxt<'_>) -> Status + Send + Sync + 'static) -> Self {
        self.write = Some(Arc::new(f));
        self
    }

    /// Same callback for both directions.
    pub fn with_both(self, f: impl Fn(&mut MgmtCtxt<'_>) -> Status + Send + Sync + 'static) -> Self {
        let f: HandlerFn = Arc::new(f);
        Self {
            read: Some(Arc::clone(&f)),
            write: Some(f),
        }
    }

    /// Neither direction is served.
    pub fn is_unhandled(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// A named table of handlers sharing one group id.
#[derive(Debug)]
pub struct Group {
    id: u16,
    name: &'static str,
    handlers: Vec<Handler>,
}

impl Group {
    pub fn new(id: u16, name: &'static str) -> Self {
        Self {
            id,
            name,
            handlers: Vec::new(),
        }
    }

    /// Install `handler` at `command_id`, growing the table as needed.
    pub fn with_handler(mut self, command_id: u8, handler: Handler) -> Self {
        let idx = usize::from(command_id);
        if self.handlers.len() <= idx {
            self.handlers.resize_with(idx + 1, Handler::default);
        }
        self.handlers[idx] = handler;
        self
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of slots in the handler table.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// The handler at `command_id`, if the table is large enough and the
    /// slot serves at least one direction.
    pub fn handler(&self, command_id: u8) -> Option<&Handler> {
        self.handlers
            .get(usize::from(command_id))
            .filter(|h| !h.is_unhandled())
    }
}

// ── Registry ─────────────────────────────────────────────────

/// Which side of a conversation a group serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Services incoming commands.
    Server,
    /// Decodes incoming responses to commands this device originated.
    Client,
}

type GroupList = Mutex<CriticalSectionRawMutex, RefCell<Vec<Arc<Group>>>>;

/// Ordered group lists for both roles.
pub struct Registry {
    server: GroupList,
    client: GroupList,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            server: Mutex::new(RefCell::new(Vec::new())),
            client: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    fn list(&self, role: Role) -> &GroupList {
        match role {
            Role::Server => &self.server,
            Role::Client => &self.client,
        }
    }

    /// Append `group` to the tail of the role's list.
    pub fn register(&self, role: Role, group: Arc<Group>) {
        info!(
            "MGMT: register {:?} group {} ({}, {} handlers)",
            role,
            group.id(),
            group.name(),
            group.handler_count()
        );
        self.list(role).lock(|list| list.borrow_mut().push(group));
    }

    /// Unlink `group` (by identity) from whichever list holds it.
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister(&self, group: &Arc<Group>) -> bool {
        for list in [&self.server, &self.client] {
            let removed = list.lock(|list| {
                let mut list = list.borrow_mut();
                match list.iter().position(|g| Arc::ptr_eq(g, group)) {
                    Some(pos) => {
                        list.remove(pos);
                        true
                    }
                    None => false,
                }
            });
            if removed {
                info!("MGMT: unregister group {} ({})", group.id(), group.name());
                return true;
            }
        }
        false
    }

    /// Find the handler for `(group_id, command_id)` in the role's list.
    ///
    /// Groups sharing an id are scanned in order until one serves the
    /// command. Not-found is an ordinary outcome.
    pub fn find(&self, role: Role, group_id: u16, command_id: u8) -> Option<Handler> {
        self.list(role).lock(|list| {
            list.borrow()
                .iter()
                .filter(|g| g.id() == group_id)
                .find_map(|g| g.handler(command_id).cloned())
        })
    }

    /// Number of groups registered for `role`.
    pub fn len(&self, role: Role) -> usize {
        self.list(role).lock(|list| list.borrow().len())
    }

    pub fn is_empty(&self, role: Role) -> bool {
        self.len(role) == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MgmtError;
    use crate::mgmt::header::Op;

    fn ok(_: &mut MgmtCtxt<'_>) -> Status {
        Ok(())
    }

    fn not_found(_: &mut MgmtCtxt<'_>) -> Status {
        Err(MgmtError::NotFound)
    }

    fn run(handler: &HandlerFn) -> Status {
        let mut ctxt = MgmtCtxt::new(Header::command(Op::Read, 0, 0), &[], 64);
        handler(&mut ctxt)
    }

    #[test]
    fn find_returns_registered_handler() {
        let reg = Registry::new();
        let group = Group::new(0, "os")
            .with_handler(0, Handler::new().with_read(ok))
            .with_handler(5, Handler::new().with_write(not_found));
        reg.register(Role::Server, Arc::new(group));

        let echo = reg.find(Role::Server, 0, 0).unwrap();
        assert!(echo.read.is_some() && echo.write.is_none());
        assert_eq!(run(echo.read.as_ref().unwrap()), Ok(()));

        let reset = reg.find(Role::Server, 0, 5).unwrap();
        assert_eq!(run(reset.write.as_ref().unwrap()), Err(MgmtError::NotFound));
    }

    #[test]
    fn gaps_and_out_of_range_are_not_found() {
        let reg = Registry::new();
        reg.register(
            Role::Server,
            Arc::new(Group::new(0, "os").with_handler(2, Handler::new().with_read(ok))),
        );
        assert!(reg.find(Role::Server, 0, 1).is_none());
        assert!(reg.find(Role::Server, 0, 3).is_none());
        assert!(reg.find(Role::Server, 1, 2).is_none());
    }

    #[test]
    fn roles_are_separate() {
        let reg = Registry::new();
        reg.register(
            Role::Client,
            Arc::new(Group::new(8, "fs").with_handler(0, Handler::new().with_read(ok))),
        );
        assert!(reg.find(Role::Client, 8, 0).is_some());
        assert!(reg.find(Role::Server, 8, 0).is_none());
    }

    #[test]
    fn shared_group_id_continues_scanning() {
        let reg = Registry::new();
        reg.register(
            Role::Server,
            Arc::new(Group::new(64, "a").with_handler(0, Handler::new().with_read(ok))),
        );
        reg.register(
            Role::Server,
            Arc::new(Group::new(64, "b").with_handler(3, Handler::new().with_write(not_found))),
        );

        assert!(reg.find(Role::Server, 64, 0).unwrap().read.is_some());
        assert!(reg.find(Role::Server, 64, 3).unwrap().write.is_some());
    }

    #[test]
    fn unregister_restores_not_found_and_keeps_tail_order() {
        let reg = Registry::new();
        let a = Arc::new(Group::new(1, "a").with_handler(0, Handler::new().with_read(ok)));
        let b = Arc::new(Group::new(2, "b").with_handler(0, Handler::new().with_read(ok)));
        reg.register(Role::Server, Arc::clone(&a));
        reg.register(Role::Server, Arc::clone(&b));

        // Remove the tail, then append again.
        assert!(reg.unregister(&b));
        assert!(reg.find(Role::Server, 2, 0).is_none());
        assert_eq!(reg.len(Role::Server), 1);

        let c = Arc::new(Group::new(3, "c").with_handler(0, Handler::new().with_read(ok)));
        reg.register(Role::Server, Arc::clone(&c));
        assert!(reg.find(Role::Server, 1, 0).is_some());
        assert!(reg.find(Role::Server, 3, 0).is_some());

        assert!(reg.unregister(&a));
        assert!(reg.unregister(&c));
        assert!(reg.is_empty(Role::Server));
        assert!(!reg.unregister(&c), "double unregister is a no-op");
    }

    #[test]
    fn unregister_uses_identity_not_id() {
        let reg = Registry::new();
        let registered = Arc::new(Group::new(9, "shell"));
        let lookalike = Arc::new(Group::new(9, "shell"));
        reg.register(Role::Client, Arc::clone(&registered));
        assert!(!reg.unregister(&lookalike));
        assert!(reg.unregister(&registered));
    }
}
