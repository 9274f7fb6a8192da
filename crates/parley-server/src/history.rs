//! Replay History
//!
//! Bounded, append-only log of relayed frames in arrival order. New clients
//! receive the whole log right after their identity so they can catch up on
//! the conversation.

use std::collections::VecDeque;

/// Byte-bounded frame log with oldest-first eviction
#[derive(Debug, Clone)]
pub struct HistoryLog {
    frames: VecDeque<Vec<u8>>,
    size: usize,
    capacity: usize,
}

impl HistoryLog {
    /// Create an empty log holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            size: 0,
            capacity,
        }
    }

    /// Append a frame, evicting the oldest whole frames until it fits
    ///
    /// A frame bigger than the whole capacity is not kept, and nothing is
    /// evicted for it. Returns whether the frame was retained.
    pub fn push(&mut self, frame: Vec<u8>) -> bool {
        if frame.len() > self.capacity {
            return false;
        }

        while self.size + frame.len() > self.capacity {
            match self.frames.pop_front() {
                Some(old) => self.size -= old.len(),
                None => break,
            }
        }

        self.size += frame.len();
        self.frames.push_back(frame);
        true
    }

    /// Frames from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.frames.iter().map(Vec::as_slice)
    }

    /// All retained frames concatenated, ready to send
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size);
        for frame in &self.frames {
            out.extend_from_slice(frame);
        }
        out
    }

    /// Number of retained frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes currently retained
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.frames.clear();
        self.size = 0;
    }
}
