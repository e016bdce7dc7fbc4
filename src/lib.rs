//! Device management protocol runtime.
//!
//! SMP-style request/response management over any frame-oriented link:
//! an 8-byte header, CBOR bodies, handlers grouped by command group and
//! looked up per role, plus a blocking call engine for the originator.
//!
//! ```text
//!  originator                                   responder
//!  ┌────────────┐  command   ┌───────────┐  command  ┌────────────┐
//!  │ FsClient   │──────────▶│ Transport │─────────▶│ MgmtRuntime│
//!  │ OsClient   │            └───────────┘           │  registry  │
//!  │ CallEngine │◀─── rsp ── MgmtRuntime ◀── rsp ───│  FsServer  │
//!  └────────────┘           (client role)            │  OsServer  │
//!                                                    └────────────┘
//! ```
//!
//! Platform concerns sit behind the traits in [`ports`] and
//! [`mgmt::transport`]; [`adapters`] holds host implementations.

#![deny(unused_must_use)]

pub mod adapters;
pub mod cmd;
pub mod config;
pub mod error;
pub mod mgmt;
pub mod ports;

// Host critical-section implementation for the unit tests.
#[cfg(test)]
use critical_section as _;

pub use config::MgmtConfig;
pub use error::{MgmtError, Result, Status, TransportError};
pub use mgmt::dispatch::MgmtRuntime;
