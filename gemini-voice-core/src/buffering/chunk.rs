//! Outbound chunk accumulation: gain, saturation, fixed-size flushing.

/// Ordered mono PCM samples. The rate is implied by the stream direction
/// (16 kHz captured, 24 kHz received) and is not carried with the block.
pub type SampleBlock = Vec<i16>;

/// Multiply by an integer gain, saturating to the `i16` range.
#[inline]
pub fn apply_gain(sample: i16, gain: i32) -> i16 {
    let amplified = i64::from(sample) * i64::from(gain);
    amplified.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

/// Accumulates captured samples until at least `chunk_size` are held.
///
/// A flush always takes the whole accumulator, so a flushed block can be
/// slightly longer than `chunk_size` when device frames do not divide it.
/// Nothing is carried over past a flush.
#[derive(Debug)]
pub struct ChunkAccumulator {
    chunk_size: usize,
    gain: i32,
    pending: SampleBlock,
}

impl ChunkAccumulator {
    pub fn new(chunk_size: usize, gain: i32) -> Self {
        Self {
            chunk_size,
            gain,
            pending: Vec::with_capacity(chunk_size),
        }
    }

    /// Apply gain to `frame`, append it, and return the flushed block once
    /// the threshold is reached.
    pub fn push(&mut self, frame: &[i16]) -> Option<SampleBlock> {
        self.pending
            .extend(frame.iter().map(|&s| apply_gain(s, self.gain)));

        if self.pending.len() >= self.chunk_size {
            let flushed = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
            Some(flushed)
        } else {
            None
        }
    }

    /// Samples waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
