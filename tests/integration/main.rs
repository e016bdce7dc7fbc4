//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one subsystem through
//! the public API. Everything runs on the host; peers are either the
//! scripted mock in `mock_peer` or a second runtime behind the loopback
//! adapter.

mod call_engine_tests;
mod mock_peer;
mod os_tests;
mod transfer_tests;

use critical_section as _;
