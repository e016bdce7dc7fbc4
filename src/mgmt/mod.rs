//! Management protocol core.
//!
//! ```text
//! ┌──────────────┐   call()   ┌────────────┐  send   ┌───────────┐
//! │ cmd clients  │──────────▶│ CallEngine │───────▶│ Transport │
//! │ (fs, os)     │◀──────────│  (1 slot)  │         └─────┬─────┘
//! └──────────────┘   reply    └─────▲──────┘               │ rx
//!                                   │ RspDone              ▼
//!                             ┌─────┴──────┐        ┌─────────────┐
//!                             │  EventBus  │◀──────│ MgmtRuntime │
//!                             └────────────┘        │ + Registry  │
//!                                                   └─────────────┘
//! ```
//!
//! - [`header`]: fixed 8-byte frame header codec
//! - [`registry`]: command groups for both roles
//! - [`events`]: lifecycle event bus
//! - [`sequence`]: wrapping correlation counter
//! - [`dispatch`]: the runtime object and frame dispatcher
//! - [`call`]: single-slot synchronous call engine
//! - [`transport`]: outbound link trait
//! - [`cbor`]: shared body helpers

pub mod call;
pub mod cbor;
pub mod dispatch;
pub mod events;
pub mod header;
pub mod registry;
pub mod sequence;
pub mod transport;

/// Well-known group ids.
pub mod group {
    pub const OS: u16 = 0;
    pub const IMAGE: u16 = 1;
    pub const STAT: u16 = 2;
    pub const CONFIG: u16 = 3;
    pub const LOG: u16 = 4;
    pub const CRASH: u16 = 5;
    pub const SPLIT: u16 = 6;
    pub const RUN: u16 = 7;
    pub const FS: u16 = 8;
    pub const SHELL: u16 = 9;
    /// First id available to application-defined groups.
    pub const PERUSER: u16 = 64;
}

/// Human-readable name of a group id.
pub fn group_name(id: u16) -> &'static str {
    match id {
        group::OS => "os",
        group::IMAGE => "image",
        group::STAT => "stat",
        group::CONFIG => "config",
        group::LOG => "log",
        group::CRASH => "crash",
        group::SPLIT => "split",
        group::RUN => "run",
        group::FS => "fs",
        group::SHELL => "shell",
        id if id >= group::PERUSER => "user",
        _ => "reserved",
    }
}
