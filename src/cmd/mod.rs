//! Command groups built on the management core.
//!
//! Each group has a responder side (handlers over a port trait) and an
//! originator side (typed client over the call engine).

pub mod fs;
pub mod os;
