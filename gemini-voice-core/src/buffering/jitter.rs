//! Playback jitter buffer.
//!
//! ## Policy (one [`JitterBuffer::tick`])
//!
//! ```text
//! 1. Move every queued block into the contiguous buffer (FIFO).
//! 2. len >= high            → emit exactly `high` samples, keep the rest.
//! 3. len >= low && queue empty → emit everything (end-of-utterance tail).
//! 4. otherwise              → emit nothing, keep accumulating.
//! ```
//!
//! The queue lock is held only while blocks are moved out; the emitted block
//! is handed to the sink after the lock is released.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::chunk::SampleBlock;

#[derive(Debug, Default)]
struct QueueInner {
    blocks: VecDeque<SampleBlock>,
    /// Set by an interruption; the drain side drops its residual buffer.
    discard_buffered: bool,
}

/// Unbounded FIFO of received blocks, shared by the receive loop (producer)
/// and the drain loop (consumer).
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    inner: Mutex<QueueInner>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, block: SampleBlock) {
        self.inner.lock().blocks.push_back(block);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().blocks.is_empty()
    }

    /// Total samples still queued (not yet moved into a jitter buffer).
    pub fn queued_samples(&self) -> usize {
        self.inner.lock().blocks.iter().map(Vec::len).sum()
    }

    /// Drop everything not yet handed to the device (barge-in).
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.blocks.clear();
        inner.discard_buffered = true;
    }

    /// Append all queued blocks to `buffer` in arrival order.
    fn drain_into(&self, buffer: &mut Vec<i16>) {
        let mut inner = self.inner.lock();
        if inner.discard_buffered {
            buffer.clear();
            inner.discard_buffered = false;
        }
        while let Some(block) = inner.blocks.pop_front() {
            buffer.extend_from_slice(&block);
        }
    }
}

/// Drain-side state: the contiguous sample buffer and both watermarks.
#[derive(Debug)]
pub struct JitterBuffer {
    queue: Arc<PlaybackQueue>,
    buffer: Vec<i16>,
    high_watermark: usize,
    low_watermark: usize,
}

impl JitterBuffer {
    pub fn new(queue: Arc<PlaybackQueue>, high_watermark: usize, low_watermark: usize) -> Self {
        Self {
            queue,
            buffer: Vec::with_capacity(high_watermark * 2),
            high_watermark,
            low_watermark,
        }
    }

    /// Run one drain decision. Returns the block to play, if any.
    pub fn tick(&mut self) -> Option<SampleBlock> {
        self.queue.drain_into(&mut self.buffer);

        if self.buffer.len() >= self.high_watermark {
            let rest = self.buffer.split_off(self.high_watermark);
            return Some(std::mem::replace(&mut self.buffer, rest));
        }

        if !self.buffer.is_empty()
            && self.buffer.len() >= self.low_watermark
            && self.queue.is_empty()
        {
            return Some(std::mem::take(&mut self.buffer));
        }

        None
    }

    /// Samples held in the contiguous buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Upper bound on the size of any block `tick` releases.
    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    /// Nothing buffered and nothing queued.
    pub fn is_drained(&self) -> bool {
        self.buffer.is_empty() && self.queue.is_empty()
    }
}
