//! File-system command group.
//!
//! One command (`file`, id 0) in group 8: a read op downloads a chunk,
//! a write op uploads one. Both sides move objects in offset-addressed
//! chunks sized to the link MTU.
//!
//! - [`client`]: originator-side transfer state machines
//! - [`server`]: responder-side handlers over a [`FileStore`](crate::ports::FileStore)
//! - [`codec`]: CBOR bodies

pub mod client;
pub mod codec;
pub mod server;

use crate::error::{MgmtError, Status};

/// Command id of the file upload/download command.
pub const ID_FILE: u8 = 0;

/// Object names must be non-empty and at most `max_len` bytes.
pub(crate) fn check_name(name: &str, max_len: usize) -> Status {
    if name.is_empty() || name.len() > max_len {
        return Err(MgmtError::InvalidArgument);
    }
    Ok(())
}
