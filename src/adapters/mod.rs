//! Adapters: concrete implementations of the port traits and transports.
//!
//! | Adapter    | Implements  | Connects to                        |
//! |------------|-------------|------------------------------------|
//! | `loopback` | Transport   | A second in-process runtime        |
//! | `mem_fs`   | FileStore   | Heap-backed object map             |
//! | `sim_os`   | OsPort      | Fixed task table, recorded resets  |

pub mod loopback;
pub mod mem_fs;
pub mod sim_os;
