use std::collections::VecDeque;

use super::types::DecodedFrame;

/// Maximum number of decoded frames retained at once.
pub const FRAME_RING_CAPACITY: usize = 30;

/// Bounded FIFO of owned frame references. Only the newest entry is ever read;
/// older ones are kept so the decoder can recycle their buffers lazily.
pub struct FrameRing {
    frames: VecDeque<DecodedFrame>,
    capacity: usize,
}

impl FrameRing {
    pub fn new() -> Self {
        Self::with_capacity(FRAME_RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    /// Take an owned reference to `frame` and append it, releasing the oldest
    /// entries once the ring is over capacity.
    pub fn push(&mut self, frame: &DecodedFrame) {
        self.frames.push_back(frame.clone());
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn peek_newest(&self) -> Option<&DecodedFrame> {
        self.frames.back()
    }

    /// Release every held reference. Returns how many were released.
    pub fn drain_all(&mut self) -> usize {
        let released = self.frames.len();
        self.frames.clear();
        released
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}
