// src/config.rs
//! Driver tunables.

/// Capacity of the event FIFO in the original firmware.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;
/// Inner poll slice used by `read_line` so the overall deadline stays
/// responsive at 1200 baud.
pub const DEFAULT_READ_POLL_SLICE_MS: u32 = 100;

#[derive(Clone, Debug)]
pub struct MinitelConfig {
    /// Bounded event FIFO size; overflow drops the oldest event.
    pub event_capacity: usize,
    /// Per-iteration wait used inside `read_line`'s editing loop.
    pub read_poll_slice_ms: u32,
}

impl Default for MinitelConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            read_poll_slice_ms: DEFAULT_READ_POLL_SLICE_MS,
        }
    }
}

impl MinitelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_read_poll_slice_ms(mut self, slice_ms: u32) -> Self {
        self.read_poll_slice_ms = slice_ms.max(1);
        self
    }
}
