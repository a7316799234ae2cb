//! Audio device collaborators.
//!
//! The session never touches cpal directly. It drives a [`CaptureDevice`]
//! (frames in) and a [`PlaybackDevice`] (blocks out), bundled as an
//! [`AudioBackend`]:
//!
//! | Backend | Capture | Playback |
//! |---------|---------|----------|
//! | `AudioBackend::cpal` | [`capture::CpalCapture`] | [`playback::CpalPlayback`] |
//! | `AudioBackend::dummy` | [`dummy::SilenceCapture`] | [`dummy::DiscardPlayback`] |
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). Capture streams are therefore opened on the capture worker thread,
//! and playback streams on the drain thread through
//! [`PlaybackDevice::start_playback`], which returns a sink that never leaves
//! that thread.

pub mod capture;
pub mod device;
pub mod dummy;
pub mod playback;
pub mod resample;

use std::time::Duration;

use crate::buffering::chunk::SampleBlock;
use crate::config::Config;
use crate::error::Result;

pub use capture::CpalCapture;
pub use dummy::{DiscardPlayback, SilenceCapture};
pub use playback::CpalPlayback;

/// Invoked once per captured frame block (mono, wire input rate).
pub type FrameCallback = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// Interval between silent chunks in dummy mode.
pub const DUMMY_CHUNK_INTERVAL: Duration = Duration::from_secs(2);

pub trait CaptureDevice: Send {
    /// Begin delivering frames to `on_frame` from the device's own thread.
    ///
    /// # Errors
    /// A device error when no input can be opened. Reported once.
    fn start_capture(&mut self, on_frame: FrameCallback) -> Result<()>;

    /// Stop delivering frames. Once this returns `on_frame` is never called
    /// again. Idempotent.
    fn stop_capture(&mut self);
}

pub trait PlaybackDevice: Send {
    /// Open the output for mono audio at `sample_rate`. Called on the thread
    /// that will use and drop the returned sink.
    fn start_playback(&mut self, sample_rate: u32, channels: u16) -> Result<Box<dyn PlaybackSink>>;
}

pub trait PlaybackSink {
    /// Hand one block to the device.
    fn play(&mut self, block: SampleBlock);

    /// Whether blocks are dropped instead of being played.
    fn is_discarding(&self) -> bool {
        false
    }

    /// Whether a block of up to `samples` source samples can be taken now
    /// without outrunning the device. The drain loop holds blocks back
    /// while this is `false`.
    fn has_room_for(&mut self, samples: usize) -> bool {
        let _ = samples;
        true
    }

    /// The jitter buffer has nothing left to release. Sinks that hold back a
    /// partial tail push it out now.
    fn finish_tail(&mut self) {}
}

/// The pair of device collaborators a session runs with.
pub struct AudioBackend {
    pub capture: Box<dyn CaptureDevice>,
    pub playback: Box<dyn PlaybackDevice>,
}

impl AudioBackend {
    pub fn new(capture: Box<dyn CaptureDevice>, playback: Box<dyn PlaybackDevice>) -> Self {
        Self { capture, playback }
    }

    /// System audio devices, by preferred name or the host defaults.
    pub fn cpal(
        input_device: Option<String>,
        output_device: Option<String>,
        config: &Config,
    ) -> Self {
        Self::new(
            Box::new(CpalCapture::new(input_device, config.input_sample_rate)),
            Box::new(CpalPlayback::new(output_device)),
        )
    }

    /// No devices: one silent chunk every two seconds, playback discarded.
    pub fn dummy(config: &Config) -> Self {
        Self::new(
            Box::new(SilenceCapture::new(config.chunk_size, DUMMY_CHUNK_INTERVAL)),
            Box::new(DiscardPlayback),
        )
    }
}

/// Map a float sample in [-1, 1] to 16-bit PCM, saturating outside that range.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_conversion_saturates() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert_eq!(f32_to_i16(3.5), i16::MAX);
        assert_eq!(f32_to_i16(-7.0), i16::MIN);
    }

    #[test]
    fn int_float_int_is_lossless() {
        for s in [i16::MIN, -12_345, -1, 0, 1, 12_345, i16::MAX] {
            assert_eq!(f32_to_i16(i16_to_f32(s)), s);
        }
    }
}
