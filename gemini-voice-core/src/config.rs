//! Session configuration.
//!
//! `Config` is built once at startup (defaults, then an optional JSON file,
//! then CLI overrides) and is read-only afterwards. Every component receives
//! it behind an `Arc`.
//!
//! ## File layout
//!
//! ```json
//! {
//!   "model": { "name": "...", "temperature": 1.0, "topP": 0.95, "topK": 40,
//!              "responseModalities": ["AUDIO"] },
//!   "features": { "enableSearch": false },
//!   "systemInstruction": { "text": "..." },
//!   "audio": { "inputSampleRate": 16000, "outputSampleRate": 24000,
//!              "chunkSize": 16000, "bufferSize": 24000, "minBufferSize": 7200,
//!              "gainFactor": 5 },
//!   "session": { "setupWaitMs": 2000 }
//! }
//! ```
//!
//! Every key is optional. `bufferSize` / `minBufferSize` are the playback
//! high / low watermarks.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VoiceError};

pub const DEFAULT_MODEL_NAME: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Immutable snapshot of every tunable the session reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Model name without the `models/` prefix.
    pub model_name: String,
    /// Default: 1.0.
    pub temperature: f64,
    /// Default: 0.95.
    pub top_p: f64,
    /// Default: 40.
    pub top_k: u32,
    /// Default: `["AUDIO"]`.
    pub response_modalities: Vec<String>,
    /// Declare the search tool in the setup message.
    pub enable_search: bool,
    /// Sent as `systemInstruction` only when non-empty.
    pub system_instruction: String,
    /// Microphone rate on the wire (Hz). Default: 16000.
    pub input_sample_rate: u32,
    /// Speaker rate of inbound audio (Hz). Default: 24000.
    pub output_sample_rate: u32,
    /// Captured samples accumulated before one outbound message. Default: 16000 (1 s).
    pub chunk_size: usize,
    /// Fixed playback block size under sustained input. Default: 24000 (1 s).
    pub playback_high_watermark: usize,
    /// Minimum tail flushed once inbound audio stops. Default: 7200 (0.3 s).
    pub playback_low_watermark: usize,
    /// Integer software gain applied to captured samples. Default: 5.
    pub gain_factor: i32,
    /// Upper bound on the wait for `setupComplete`. Default: 2 s.
    pub setup_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.into(),
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
            response_modalities: vec!["AUDIO".into()],
            enable_search: false,
            system_instruction: String::new(),
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            chunk_size: 16_000,
            playback_high_watermark: 24_000,
            playback_low_watermark: 7_200,
            gain_factor: 5,
            setup_wait: Duration::from_millis(2_000),
        }
    }
}

impl Config {
    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    /// `VoiceError::Config` when the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let config = Self::from_file(path)?;
        info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| VoiceError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(raw)
            .map_err(|e| VoiceError::Config(format!("JSON parse error: {e}")))?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(VoiceError::Config(msg.to_string()));

        if self.model_name.trim().is_empty() {
            return fail("model name must not be empty");
        }
        if self.temperature.is_nan() || self.temperature < 0.0 {
            return fail("temperature must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return fail("topP must be within [0, 1]");
        }
        if self.top_k == 0 {
            return fail("topK must be >= 1");
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return fail("sample rates must be non-zero");
        }
        if self.chunk_size == 0 {
            return fail("chunkSize must be >= 1");
        }
        if self.playback_high_watermark == 0 {
            return fail("bufferSize must be >= 1");
        }
        if self.playback_low_watermark > self.playback_high_watermark {
            return fail("minBufferSize must not exceed bufferSize");
        }
        if self.gain_factor < 0 {
            return fail("gainFactor must be >= 0");
        }
        Ok(())
    }

    /// Print a one-shot summary of the effective settings.
    pub fn log_summary(&self) {
        info!(
            model = %self.model_name,
            temperature = self.temperature,
            top_p = self.top_p,
            top_k = self.top_k,
            search = self.enable_search,
            "model settings"
        );
        info!(
            input_rate = self.input_sample_rate,
            output_rate = self.output_sample_rate,
            chunk_size = self.chunk_size,
            high_watermark = self.playback_high_watermark,
            low_watermark = self.playback_low_watermark,
            gain = self.gain_factor,
            "audio settings"
        );
        if !self.system_instruction.is_empty() {
            info!(text = %self.system_instruction, "system instruction");
        }
    }
}

// ── On-disk representation ───────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    model: ModelSection,
    features: FeatureSection,
    system_instruction: SystemInstructionSection,
    audio: AudioSection,
    session: SessionSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ModelSection {
    name: Option<String>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    top_k: Option<u32>,
    response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FeatureSection {
    enable_search: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SystemInstructionSection {
    text: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AudioSection {
    input_sample_rate: Option<u32>,
    output_sample_rate: Option<u32>,
    chunk_size: Option<usize>,
    buffer_size: Option<usize>,
    min_buffer_size: Option<usize>,
    gain_factor: Option<i32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SessionSection {
    setup_wait_ms: Option<u64>,
}

impl ConfigFile {
    fn into_config(self) -> Config {
        let d = Config::default();
        Config {
            model_name: self.model.name.unwrap_or(d.model_name),
            temperature: self.model.temperature.unwrap_or(d.temperature),
            top_p: self.model.top_p.unwrap_or(d.top_p),
            top_k: self.model.top_k.unwrap_or(d.top_k),
            response_modalities: self
                .model
                .response_modalities
                .unwrap_or(d.response_modalities),
            enable_search: self.features.enable_search.unwrap_or(d.enable_search),
            system_instruction: self
                .system_instruction
                .text
                .unwrap_or(d.system_instruction),
            input_sample_rate: self.audio.input_sample_rate.unwrap_or(d.input_sample_rate),
            output_sample_rate: self
                .audio
                .output_sample_rate
                .unwrap_or(d.output_sample_rate),
            chunk_size: self.audio.chunk_size.unwrap_or(d.chunk_size),
            playback_high_watermark: self
                .audio
                .buffer_size
                .unwrap_or(d.playback_high_watermark),
            playback_low_watermark: self
                .audio
                .min_buffer_size
                .unwrap_or(d.playback_low_watermark),
            gain_factor: self.audio.gain_factor.unwrap_or(d.gain_factor),
            setup_wait: self
                .session
                .setup_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(d.setup_wait),
        }
    }
}
