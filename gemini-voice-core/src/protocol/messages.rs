//! Outbound message builders.

use serde::Serialize;

use crate::codec;
use crate::config::Config;
use crate::error::Result;

/// MIME tag for captured mono PCM at `sample_rate` Hz.
pub fn input_audio_mime(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

#[derive(Debug, Serialize)]
struct SetupMessage {
    setup: SetupPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupPayload {
    model: String,
    generation_config: GenerationConfig,
    input_audio_transcription: EmptyObject,
    output_audio_transcription: EmptyObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    temperature: f64,
    top_p: f64,
    top_k: u32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: EmptyObject,
}

/// Serializes as `{}`.
#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    data: String,
    mime_type: String,
}

/// Build the session `setup` message.
///
/// Both transcription streams are always requested. `systemInstruction` is
/// present only for non-empty text, `tools` only when search is enabled.
pub fn build_setup(config: &Config) -> Result<String> {
    let model = if config.model_name.starts_with("models/") {
        config.model_name.clone()
    } else {
        format!("models/{}", config.model_name)
    };

    let system_instruction = (!config.system_instruction.is_empty()).then(|| SystemInstruction {
        parts: vec![TextPart {
            text: config.system_instruction.clone(),
        }],
    });

    let tools = config.enable_search.then(|| {
        vec![Tool {
            google_search: EmptyObject {},
        }]
    });

    let message = SetupMessage {
        setup: SetupPayload {
            model,
            generation_config: GenerationConfig {
                response_modalities: config.response_modalities.clone(),
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
            },
            input_audio_transcription: EmptyObject {},
            output_audio_transcription: EmptyObject {},
            system_instruction,
            tools,
        },
    };

    Ok(serde_json::to_string(&message)?)
}

/// Wrap captured samples in a `realtimeInput` message.
pub fn build_audio_input(samples: &[i16], mime_type: &str) -> Result<String> {
    let message = RealtimeInputMessage {
        realtime_input: RealtimeInput {
            media_chunks: vec![MediaChunk {
                data: codec::encode(samples),
                mime_type: mime_type.to_string(),
            }],
        },
    };
    Ok(serde_json::to_string(&message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).expect("builder output is JSON")
    }

    #[test]
    fn setup_carries_model_and_generation_parameters() {
        let config = Config {
            model_name: "test-model".into(),
            temperature: 0.5,
            top_p: 0.9,
            top_k: 12,
            ..Config::default()
        };
        let msg = parse(&build_setup(&config).unwrap());

        assert_eq!(msg["setup"]["model"], "models/test-model");
        assert_eq!(
            msg["setup"]["generationConfig"],
            json!({
                "responseModalities": ["AUDIO"],
                "temperature": 0.5,
                "topP": 0.9,
                "topK": 12
            })
        );
        assert_eq!(msg["setup"]["inputAudioTranscription"], json!({}));
        assert_eq!(msg["setup"]["outputAudioTranscription"], json!({}));
    }

    #[test]
    fn setup_omits_optional_sections_by_default() {
        let msg = parse(&build_setup(&Config::default()).unwrap());
        let setup = msg["setup"].as_object().unwrap();
        assert!(!setup.contains_key("systemInstruction"));
        assert!(!setup.contains_key("tools"));
    }

    #[test]
    fn setup_includes_instruction_and_search_tool_when_configured() {
        let config = Config {
            system_instruction: "answer in haiku".into(),
            enable_search: true,
            ..Config::default()
        };
        let msg = parse(&build_setup(&config).unwrap());
        assert_eq!(
            msg["setup"]["systemInstruction"],
            json!({ "parts": [{ "text": "answer in haiku" }] })
        );
        assert_eq!(msg["setup"]["tools"], json!([{ "googleSearch": {} }]));
    }

    #[test]
    fn setup_does_not_double_prefix_model() {
        let config = Config {
            model_name: "models/already".into(),
            ..Config::default()
        };
        let msg = parse(&build_setup(&config).unwrap());
        assert_eq!(msg["setup"]["model"], "models/already");
    }

    #[test]
    fn audio_input_wraps_encoded_payload() {
        let msg = parse(&build_audio_input(&[1, 2], &input_audio_mime(16_000)).unwrap());
        assert_eq!(
            msg,
            json!({
                "realtimeInput": {
                    "mediaChunks": [{ "data": "AQACAA==", "mimeType": "audio/pcm;rate=16000" }]
                }
            })
        );
    }

    #[test]
    fn input_mime_follows_the_capture_rate() {
        assert_eq!(input_audio_mime(16_000), "audio/pcm;rate=16000");
        assert_eq!(input_audio_mime(8_000), "audio/pcm;rate=8000");
    }
}
