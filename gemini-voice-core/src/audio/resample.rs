//! Fixed-ratio mono resampling with rubato's `FastFixedIn`.
//!
//! Devices run at whatever rate they like (often 44.1 or 48 kHz); the wire
//! runs at 16 kHz up and 24 kHz down. `RateConverter` bridges the two on the
//! loop threads, never inside a device callback. Equal rates bypass rubato
//! entirely.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{Result, VoiceError};

pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Input held back until a whole rubato chunk is available.
    pending: Vec<f32>,
    chunk_size: usize,
    output: Vec<Vec<f32>>,
}

impl RateConverter {
    /// `chunk_size` is the number of input samples per rubato call.
    ///
    /// # Errors
    /// `VoiceError::AudioDevice` if rubato rejects the ratio.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                chunk_size,
                output: Vec::new(),
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            chunk_size,
            1,
        )
        .map_err(|e| VoiceError::AudioDevice(format!("resampler init: {e}")))?;
        let output = vec![vec![0f32; resampler.output_frames_max()]; 1];

        info!(from_rate, to_rate, chunk_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output,
        })
    }

    /// Feed samples, get back whatever whole chunks produced (possibly nothing).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut converted = Vec::new();

        let mut offset = 0;
        while self.pending.len() - offset >= self.chunk_size {
            let chunk = &self.pending[offset..offset + self.chunk_size];
            match resampler.process_into_buffer(&[chunk], &mut self.output, None) {
                Ok((_, produced)) => converted.extend_from_slice(&self.output[0][..produced]),
                Err(e) => error!("resampler process error: {e}"),
            }
            offset += self.chunk_size;
        }
        self.pending.drain(..offset);

        converted
    }

    /// Pad held-back input with silence to one whole chunk and convert it,
    /// so the end of an utterance is not left waiting for the next one.
    pub fn flush(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.pending.is_empty() {
            return Vec::new();
        }
        self.pending.resize(self.chunk_size, 0.0);
        self.process(&[])
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
