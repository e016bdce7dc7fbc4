//! OS command group: echo, task statistics and reset.
//!
//! | Id | Command  | Read | Write |
//! |----|----------|------|-------|
//! | 0  | echo     | ✓    | ✓     |
//! | 2  | taskstat | ✓    |       |
//! | 5  | reset    |      | ✓     |

pub mod client;
pub mod codec;
pub mod server;

pub const ID_ECHO: u8 = 0;
pub const ID_TASKSTAT: u8 = 2;
pub const ID_RESET: u8 = 5;
