//! Speaker output via cpal.
//!
//! The drain thread calls [`CpalPlayback::start_playback`] and keeps the
//! returned sink. `play` resamples a block to the device rate and pushes it
//! into an SPSC ring; the output callback pops one sample per frame, copies
//! it to every device channel and pads any shortfall with silence, so the
//! device buffer is always filled completely.
//!
//! Nothing is dropped when the ring is full: the overflow waits in a
//! backlog, and `has_room_for` reports `false` until the device has caught
//! up, which paces the drain loop to real time.

use super::{PlaybackDevice, PlaybackSink};
use crate::error::Result;

pub struct CpalPlayback {
    preferred_device: Option<String>,
}

impl CpalPlayback {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self { preferred_device }
    }
}

#[cfg(feature = "audio-cpal")]
impl PlaybackDevice for CpalPlayback {
    fn start_playback(&mut self, sample_rate: u32, channels: u16) -> Result<Box<dyn PlaybackSink>> {
        let sink = output::DeviceSink::open(self.preferred_device.as_deref(), sample_rate, channels)?;
        Ok(Box::new(sink))
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl PlaybackDevice for CpalPlayback {
    fn start_playback(&mut self, _sample_rate: u32, _channels: u16) -> Result<Box<dyn PlaybackSink>> {
        let _ = &self.preferred_device;
        Err(crate::error::VoiceError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(feature = "audio-cpal")]
mod output {
    use cpal::traits::{DeviceTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
    use tracing::{debug, error, info, warn};

    use crate::audio::device::{choose_stream_config, select_output};
    use crate::audio::resample::RateConverter;
    use crate::audio::{i16_to_f32, PlaybackSink};
    use crate::buffering::chunk::SampleBlock;
    use crate::buffering::{
        create_sample_ring, Consumer, Observer, Producer, SampleConsumer, SampleProducer,
        RING_CAPACITY,
    };
    use crate::error::{Result, VoiceError};

    /// Source samples per resampler call (10 ms at 24 kHz).
    const RESAMPLE_CHUNK: usize = 240;

    pub(super) struct DeviceSink {
        _stream: Stream,
        producer: SampleProducer,
        converter: RateConverter,
        /// Device samples produced per source sample.
        ratio: f64,
        scratch: Vec<f32>,
        /// Converted samples that did not fit in the ring yet.
        backlog: Vec<f32>,
    }

    impl DeviceSink {
        pub fn open(preferred: Option<&str>, source_rate: u32, source_channels: u16) -> Result<Self> {
            if source_channels != 1 {
                return Err(VoiceError::AudioStream(format!(
                    "only mono playback sources are supported, got {source_channels} channels"
                )));
            }

            let host = cpal::default_host();
            let device = select_output(&host, preferred)?;
            info!(
                device = device.name().unwrap_or_default().as_str(),
                "opening output device"
            );

            let default = device
                .default_output_config()
                .map_err(|e| VoiceError::AudioDevice(e.to_string()))?;
            let supported = match device.supported_output_configs() {
                Ok(ranges) => choose_stream_config(ranges, default, source_rate),
                Err(e) => {
                    warn!("cannot query output configs ({e}), using device default");
                    default
                }
            };

            let config: StreamConfig = supported.config();
            let device_rate = config.sample_rate.0;
            info!(device_rate, channels = config.channels, "output config selected");

            let (producer, consumer) = create_sample_ring();
            let stream = match supported.sample_format() {
                SampleFormat::F32 => build::<f32>(&device, &config, consumer),
                SampleFormat::I16 => build::<i16>(&device, &config, consumer),
                SampleFormat::U8 => build::<u8>(&device, &config, consumer),
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
                producer,
                converter: RateConverter::new(source_rate, device_rate, RESAMPLE_CHUNK)?,
                ratio: f64::from(device_rate) / f64::from(source_rate),
                scratch: Vec::new(),
                backlog: Vec::new(),
            })
        }

        fn flush_backlog(&mut self) {
            if self.backlog.is_empty() {
                return;
            }
            let written = self.producer.push_slice(&self.backlog);
            self.backlog.drain(..written);
        }
    }

    impl PlaybackSink for DeviceSink {
        fn play(&mut self, block: SampleBlock) {
            self.scratch.clear();
            self.scratch.extend(block.iter().map(|&s| i16_to_f32(s)));
            let converted = self.converter.process(&self.scratch);
            self.backlog.extend_from_slice(&converted);
            self.flush_backlog();
            if !self.backlog.is_empty() {
                debug!(waiting = self.backlog.len(), "playback ring full, holding backlog");
            }
        }

        fn has_room_for(&mut self, samples: usize) -> bool {
            self.flush_backlog();
            // The converter may release up to one held-back chunk on top.
            let needed = ((samples + RESAMPLE_CHUNK) as f64 * self.ratio).ceil() as usize;
            self.backlog.is_empty() && self.producer.vacant_len() >= needed.min(RING_CAPACITY)
        }

        fn finish_tail(&mut self) {
            let tail = self.converter.flush();
            self.backlog.extend_from_slice(&tail);
            self.flush_backlog();
        }
    }

    fn build<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut consumer: SampleConsumer,
    ) -> std::result::Result<Stream, cpal::BuildStreamError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = usize::from(config.channels.max(1));

        device.build_output_stream(
            config,
            move |data: &mut [T], _info| {
                for frame in data.chunks_mut(channels) {
                    let value = T::from_sample(consumer.try_pop().unwrap_or(0.0));
                    frame.fill(value);
                }
            },
            |err| error!("output stream error: {err}"),
            None,
        )
    }
}
