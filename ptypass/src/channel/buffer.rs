//! Rolling window over the most recent raw output.
//!
//! Prompts can arrive split across several reads, so classification looks at
//! an accumulated window instead of the newest chunk alone. The window is
//! bounded: once it grows past its capacity the oldest bytes are dropped, so
//! a signature separated by more than that much noise is never recognized.

use bytes::{Buf, BytesMut};

/// Default window size in bytes.
pub const ROLLING_CAPACITY: usize = 4096;

/// Bounded buffer of the most recent raw (unfiltered) output bytes.
#[derive(Debug)]
pub struct RollingBuffer {
    /// Raw output, oldest first.
    buffer: BytesMut,

    /// Maximum number of bytes retained.
    capacity: usize,
}

impl RollingBuffer {
    /// Create a buffer retaining at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append raw output, evicting the oldest bytes beyond capacity.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        let excess = self.buffer.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.buffer.advance(excess);
        }
    }

    /// ASCII lower-cased copy of the window, used for classification.
    pub fn lowered(&self) -> Vec<u8> {
        self.buffer.to_ascii_lowercase()
    }

    /// Forget everything seen so far.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for RollingBuffer {
    fn default() -> Self {
        Self::new(ROLLING_CAPACITY)
    }
}
