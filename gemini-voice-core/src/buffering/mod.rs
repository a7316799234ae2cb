//! Buffers between the real-time device callbacks and the session loops.
//!
//! - [`chunk`]: outbound accumulator (capture side).
//! - [`jitter`]: inbound playback queue and its two-watermark drain policy.
//! - Lock-free SPSC rings (`ringbuf::HeapRb<f32>`) bridging the cpal
//!   callbacks and the loop threads; `push_slice` / `try_pop` are wait-free
//!   and safe inside an audio callback.

pub mod chunk;
pub mod jitter;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half of a device ring.
pub type SampleProducer = ringbuf::HeapProd<f32>;

/// Consumer half of a device ring.
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^20 f32 samples ≈ 21.8 s at 48 kHz.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_sample_ring() -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
