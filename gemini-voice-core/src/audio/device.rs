//! Device enumeration and selection.

use serde::{Deserialize, Serialize};

#[cfg(feature = "audio-cpal")]
use crate::error::{Result, VoiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// Metadata about one audio endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub direction: Direction,
    /// Whether this is the host's default device for its direction.
    pub is_default: bool,
    /// Heuristic flag for inputs that likely capture system output.
    pub is_loopback_like: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
    "wave out",
];

/// Best-effort guess for inputs that record the speakers rather than a mic.
/// Capturing one of these feeds the assistant's own voice back to it.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// List input and output devices of the default host, inputs first.
///
/// Returns an empty `Vec` when built without the `audio-cpal` feature.
#[cfg(feature = "audio-cpal")]
pub fn list_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let mut list = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    match host.input_devices() {
        Ok(devices) => list.extend(devices.enumerate().map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
            DeviceInfo {
                is_default: default_input.as_deref() == Some(name.as_str()),
                is_loopback_like: is_loopback_like_name(&name),
                direction: Direction::Input,
                name,
            }
        })),
        Err(e) => tracing::warn!("failed to enumerate input devices: {e}"),
    }

    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    match host.output_devices() {
        Ok(devices) => list.extend(devices.enumerate().map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
            DeviceInfo {
                is_default: default_output.as_deref() == Some(name.as_str()),
                is_loopback_like: false,
                direction: Direction::Output,
                name,
            }
        })),
        Err(e) => tracing::warn!("failed to enumerate output devices: {e}"),
    }

    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_devices() -> Vec<DeviceInfo> {
    vec![]
}

/// Resolve an input device: preferred name, then host default, then the
/// first device listed.
#[cfg(feature = "audio-cpal")]
pub(crate) fn select_input(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    use cpal::traits::HostTrait;

    if let Some(name) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) = devices.find(|d| has_name(d, name)) {
                    return Ok(device);
                }
                tracing::warn!("preferred input device '{name}' not found, falling back");
            }
            Err(e) => tracing::warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    if let Some(device) = host.default_input_device() {
        return Ok(device);
    }
    let mut devices = host
        .input_devices()
        .map_err(|e| VoiceError::AudioDevice(e.to_string()))?;
    tracing::warn!("no default input device, falling back to first available input");
    devices.next().ok_or(VoiceError::NoDefaultInputDevice)
}

/// Resolve an output device: preferred name, then host default, then the
/// first device listed.
#[cfg(feature = "audio-cpal")]
pub(crate) fn select_output(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    use cpal::traits::HostTrait;

    if let Some(name) = preferred {
        match host.output_devices() {
            Ok(mut devices) => {
                if let Some(device) = devices.find(|d| has_name(d, name)) {
                    return Ok(device);
                }
                tracing::warn!("preferred output device '{name}' not found, falling back");
            }
            Err(e) => tracing::warn!("failed to list output devices while resolving preference: {e}"),
        }
    }

    if let Some(device) = host.default_output_device() {
        return Ok(device);
    }
    let mut devices = host
        .output_devices()
        .map_err(|e| VoiceError::AudioDevice(e.to_string()))?;
    tracing::warn!("no default output device, falling back to first available output");
    devices.next().ok_or(VoiceError::NoDefaultOutputDevice)
}

#[cfg(feature = "audio-cpal")]
fn has_name(device: &cpal::Device, wanted: &str) -> bool {
    use cpal::traits::DeviceTrait;
    device.name().map(|name| name == wanted).unwrap_or(false)
}

/// Pick a stream config running at `wanted_rate` when the device supports one
/// in a usable sample format, otherwise the device default.
#[cfg(feature = "audio-cpal")]
pub(crate) fn choose_stream_config(
    ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    default: cpal::SupportedStreamConfig,
    wanted_rate: u32,
) -> cpal::SupportedStreamConfig {
    use cpal::SampleFormat;

    if default.sample_rate().0 == wanted_rate {
        return default;
    }
    ranges
        .filter(|r| {
            matches!(
                r.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U8
            )
        })
        .find(|r| r.min_sample_rate().0 <= wanted_rate && wanted_rate <= r.max_sample_rate().0)
        .map(|r| r.with_sample_rate(cpal::SampleRate(wanted_rate)))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_loopback_names() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("What U Hear (Sound Blaster)"));
        assert!(is_loopback_like_name("Monitor of Built-in Audio Analog Stereo"));
        assert!(!is_loopback_like_name("Microphone Array (USB PnP Audio Device)"));
    }

    #[cfg(feature = "audio-cpal")]
    #[test]
    fn prefers_range_covering_wanted_rate() {
        use cpal::{SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfig, SupportedStreamConfigRange};

        let default = SupportedStreamConfig::new(
            2,
            SampleRate(48_000),
            SupportedBufferSize::Unknown,
            SampleFormat::F32,
        );
        let ranges = vec![
            SupportedStreamConfigRange::new(
                2,
                SampleRate(44_100),
                SampleRate(48_000),
                SupportedBufferSize::Unknown,
                SampleFormat::F32,
            ),
            SupportedStreamConfigRange::new(
                1,
                SampleRate(8_000),
                SampleRate(48_000),
                SupportedBufferSize::Unknown,
                SampleFormat::I16,
            ),
        ];

        let chosen = choose_stream_config(ranges.clone().into_iter(), default.clone(), 16_000);
        assert_eq!(chosen.sample_rate().0, 16_000);
        assert_eq!(chosen.channels(), 1);

        let fallback = choose_stream_config(ranges.into_iter(), default, 96_000);
        assert_eq!(fallback.sample_rate().0, 48_000);
    }
}
