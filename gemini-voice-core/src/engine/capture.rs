//! Capture pipeline: device frames → gain → chunk → outbound message.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::CaptureDevice;
use crate::buffering::chunk::ChunkAccumulator;
use crate::error::{Result, VoiceError};
use crate::protocol::{build_audio_input, input_audio_mime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// Counters the capture side updates.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    pub samples_captured: AtomicUsize,
    pub chunks_flushed: AtomicUsize,
}

/// Owns the capture device and turns its frames into `realtimeInput`
/// messages. The accumulator lives inside the device callback, so it is only
/// ever touched from the capture context.
pub struct CapturePipeline {
    device: Box<dyn CaptureDevice>,
    state: CaptureState,
    chunk_size: usize,
    gain: i32,
    /// Tag for every outbound chunk; carries the wire input rate.
    mime_type: String,
    counters: Arc<CaptureCounters>,
}

impl CapturePipeline {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        chunk_size: usize,
        gain: i32,
        input_sample_rate: u32,
    ) -> Self {
        Self {
            device,
            state: CaptureState::Idle,
            chunk_size,
            gain,
            mime_type: input_audio_mime(input_sample_rate),
            counters: Arc::new(CaptureCounters::default()),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn counters(&self) -> Arc<CaptureCounters> {
        Arc::clone(&self.counters)
    }

    /// `Idle → Capturing`. Every flushed chunk is handed to `on_flush` as a
    /// ready-to-send message.
    ///
    /// # Errors
    /// `AlreadyRunning` when capturing, or the device's open error.
    pub fn start<F>(&mut self, mut on_flush: F) -> Result<()>
    where
        F: FnMut(String) + Send + 'static,
    {
        if self.state == CaptureState::Capturing {
            return Err(VoiceError::AlreadyRunning);
        }

        let mut accumulator = ChunkAccumulator::new(self.chunk_size, self.gain);
        let counters = Arc::clone(&self.counters);
        let mime_type = self.mime_type.clone();

        self.device.start_capture(Box::new(move |frame: &[i16]| {
            counters
                .samples_captured
                .fetch_add(frame.len(), Ordering::Relaxed);
            let Some(chunk) = accumulator.push(frame) else {
                return;
            };
            match build_audio_input(&chunk, &mime_type) {
                Ok(message) => {
                    counters.chunks_flushed.fetch_add(1, Ordering::Relaxed);
                    debug!(samples = chunk.len(), "audio chunk ready");
                    on_flush(message);
                }
                Err(e) => warn!(error = %e, "dropping chunk that failed to serialize"),
            }
        }))?;

        self.state = CaptureState::Capturing;
        info!(
            chunk_size = self.chunk_size,
            gain = self.gain,
            mime_type = %self.mime_type,
            "capture pipeline started"
        );
        Ok(())
    }

    /// `Capturing → Idle`. Idempotent.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Idle {
            return;
        }
        self.device.stop_capture();
        self.state = CaptureState::Idle;
        info!("capture pipeline stopped");
    }
}
