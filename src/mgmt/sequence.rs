//! Correlation sequence allocator.
//!
//! Every outgoing command is tagged with the next 8-bit sequence number;
//! the responder echoes it so completions can be matched to the
//! conversation that sent them.

use core::sync::atomic::{AtomicU8, Ordering};

/// Monotonically increasing, wrapping (255 → 0) sequence counter.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    next: AtomicU8,
}

impl SequenceAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU8::new(0),
        }
    }

    /// Return the current value and advance. Lock-free; safe from any
    /// context.
    pub fn next(&self) -> u8 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
