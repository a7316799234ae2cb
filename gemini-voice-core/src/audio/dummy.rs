//! Device stand-ins for headless runs (`--dummy-audio`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{CaptureDevice, FrameCallback, PlaybackDevice, PlaybackSink};
use crate::buffering::chunk::SampleBlock;
use crate::error::{Result, VoiceError};

/// Granularity of the stop check while waiting between chunks.
const STOP_POLL: Duration = Duration::from_millis(20);

/// Emits `chunk_size` zero samples immediately and then once per `interval`,
/// keeping the session's input stream alive without a microphone.
pub struct SilenceCapture {
    chunk_size: usize,
    interval: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SilenceCapture {
    pub fn new(chunk_size: usize, interval: Duration) -> Self {
        Self {
            chunk_size,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl CaptureDevice for SilenceCapture {
    fn start_capture(&mut self, mut on_frame: FrameCallback) -> Result<()> {
        if self.worker.is_some() {
            return Err(VoiceError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let silence = vec![0i16; self.chunk_size];
        let interval = self.interval;

        let worker = thread::Builder::new()
            .name("gemini-voice-silence".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    debug!(samples = silence.len(), "sending silence");
                    on_frame(&silence);

                    let deadline = Instant::now() + interval;
                    while running.load(Ordering::Acquire) && Instant::now() < deadline {
                        thread::sleep(STOP_POLL.min(deadline.saturating_duration_since(Instant::now())));
                    }
                }
            })?;

        info!(chunk_size = self.chunk_size, interval_ms = interval.as_millis() as u64, "dummy capture started");
        self.worker = Some(worker);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("silence thread panicked");
            }
        }
    }
}

impl Drop for SilenceCapture {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

/// Playback device that accepts every block and drops it.
pub struct DiscardPlayback;

impl PlaybackDevice for DiscardPlayback {
    fn start_playback(&mut self, sample_rate: u32, _channels: u16) -> Result<Box<dyn PlaybackSink>> {
        info!(sample_rate, "playback disabled, inbound audio is discarded");
        Ok(Box::new(DiscardSink))
    }
}

pub struct DiscardSink;

impl PlaybackSink for DiscardSink {
    fn play(&mut self, block: SampleBlock) {
        drop(block);
    }

    fn is_discarding(&self) -> bool {
        true
    }
}
