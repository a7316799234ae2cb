//! Microphone capture via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It only mixes to mono and pushes into an SPSC ring (`push_slice` is
//! lock-free). The capture worker thread pops the ring, resamples to the wire
//! input rate, converts to 16-bit PCM and calls the frame callback; gain and
//! chunking happen downstream of that callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
#[cfg(feature = "audio-cpal")]
use std::time::Duration;

use tracing::{info, warn};

use super::{CaptureDevice, FrameCallback};
use crate::error::{Result, VoiceError};

/// Input samples per resampler call on the capture thread.
#[cfg(feature = "audio-cpal")]
const RESAMPLE_CHUNK: usize = 480;
/// Sleep while the ring is empty.
#[cfg(feature = "audio-cpal")]
const IDLE_POLL: Duration = Duration::from_millis(5);

pub struct CpalCapture {
    preferred_device: Option<String>,
    target_rate: u32,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CpalCapture {
    pub fn new(preferred_device: Option<String>, target_rate: u32) -> Self {
        Self {
            preferred_device,
            target_rate,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl CaptureDevice for CpalCapture {
    fn start_capture(&mut self, on_frame: FrameCallback) -> Result<()> {
        if self.worker.is_some() {
            return Err(VoiceError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let preferred = self.preferred_device.clone();
        let target_rate = self.target_rate;

        // The stream is !Send: open it on the worker and report back.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        let worker = thread::Builder::new()
            .name("gemini-voice-capture".into())
            .spawn(move || capture_worker(preferred, target_rate, running, on_frame, open_tx))?;

        match open_rx.recv() {
            Ok(Ok(device_rate)) => {
                info!(device_rate, target_rate, "capture started");
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(VoiceError::Other(anyhow::anyhow!(
                    "capture thread died before opening the device"
                )))
            }
        }
    }

    fn stop_capture(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("capture thread panicked");
            }
            info!("capture stopped");
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

#[cfg(feature = "audio-cpal")]
fn capture_worker(
    preferred: Option<String>,
    target_rate: u32,
    running: Arc<AtomicBool>,
    mut on_frame: FrameCallback,
    open_tx: std::sync::mpsc::Sender<Result<u32>>,
) {
    use super::f32_to_i16;
    use super::resample::RateConverter;
    use crate::buffering::{create_sample_ring, Consumer};

    let (producer, mut consumer) = create_sample_ring();

    let opened = stream::InputStream::open(producer, Arc::clone(&running), preferred.as_deref(), target_rate)
        .and_then(|input| {
            let converter = RateConverter::new(input.sample_rate, target_rate, RESAMPLE_CHUNK)?;
            Ok((input, converter))
        });
    let (input, mut converter) = match opened {
        Ok(pair) => {
            let _ = open_tx.send(Ok(pair.0.sample_rate));
            pair
        }
        Err(e) => {
            let _ = open_tx.send(Err(e));
            return;
        }
    };

    let mut raw = vec![0f32; 4096];
    let mut frame: Vec<i16> = Vec::with_capacity(4096);

    while running.load(Ordering::Acquire) {
        let popped = consumer.pop_slice(&mut raw);
        if popped == 0 {
            thread::sleep(IDLE_POLL);
            continue;
        }

        let converted = converter.process(&raw[..popped]);
        if converted.is_empty() {
            continue;
        }
        frame.clear();
        frame.extend(converted.iter().map(|&s| f32_to_i16(s)));
        on_frame(&frame);
    }

    // Stream drops here, releasing the device on the thread that opened it.
    drop(input);
}

#[cfg(not(feature = "audio-cpal"))]
fn capture_worker(
    _preferred: Option<String>,
    _target_rate: u32,
    _running: Arc<AtomicBool>,
    _on_frame: FrameCallback,
    open_tx: std::sync::mpsc::Sender<Result<u32>>,
) {
    let _ = open_tx.send(Err(VoiceError::AudioStream(
        "compiled without audio-cpal feature".into(),
    )));
}

#[cfg(feature = "audio-cpal")]
mod stream {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use cpal::traits::{DeviceTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
    use tracing::{error, info, warn};

    use crate::audio::device::{choose_stream_config, select_input};
    use crate::buffering::{Producer, SampleProducer};
    use crate::error::{Result, VoiceError};

    /// A playing input stream. Not `Send`: drop it on the thread that opened it.
    pub(super) struct InputStream {
        _stream: Stream,
        /// Rate the device actually delivers (Hz).
        pub sample_rate: u32,
    }

    impl InputStream {
        pub fn open(
            producer: SampleProducer,
            running: Arc<AtomicBool>,
            preferred: Option<&str>,
            wanted_rate: u32,
        ) -> Result<Self> {
            let host = cpal::default_host();
            let device = select_input(&host, preferred)?;
            info!(
                device = device.name().unwrap_or_default().as_str(),
                "opening input device"
            );

            let default = device
                .default_input_config()
                .map_err(|e| VoiceError::AudioDevice(e.to_string()))?;
            let supported = match device.supported_input_configs() {
                Ok(ranges) => choose_stream_config(ranges, default, wanted_rate),
                Err(e) => {
                    warn!("cannot query input configs ({e}), using device default");
                    default
                }
            };

            let config: StreamConfig = supported.config();
            let sample_rate = config.sample_rate.0;
            info!(sample_rate, channels = config.channels, "input config selected");

            let stream = match supported.sample_format() {
                SampleFormat::F32 => build::<f32>(&device, &config, producer, running),
                SampleFormat::I16 => build::<i16>(&device, &config, producer, running),
                SampleFormat::U8 => build::<u8>(&device, &config, producer, running),
                fmt => {
                    return Err(VoiceError::AudioStream(format!(
                        "unsupported sample format: {fmt:?}"
                    )))
                }
            }
            .map_err(|e| VoiceError::AudioStream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| VoiceError::AudioStream(e.to_string()))?;

            Ok(Self {
                _stream: stream,
                sample_rate,
            })
        }
    }

    /// Mix interleaved frames to mono f32 and push them into the ring.
    fn build<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut producer: SampleProducer,
        running: Arc<AtomicBool>,
    ) -> std::result::Result<Stream, cpal::BuildStreamError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = usize::from(config.channels.max(1));
        let mut mixed: Vec<f32> = Vec::new();

        device.build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                mixed.clear();
                mixed.extend(data.chunks_exact(channels).map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
                }));
                let written = producer.push_slice(&mixed);
                if written < mixed.len() {
                    warn!(dropped = mixed.len() - written, "capture ring full");
                }
            },
            |err| error!("input stream error: {err}"),
            None,
        )
    }
}
