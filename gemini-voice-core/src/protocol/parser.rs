//! Inbound message inspection.
//!
//! Every extractor is total: a frame that is not JSON, not an object, or
//! shaped unexpectedly simply yields "no match". A single bad frame from the
//! service never stops the receive loop.

use serde_json::Value;

use crate::buffering::chunk::SampleBlock;
use crate::codec;
use crate::error::{Result, VoiceError};

/// One parsed inbound frame. Parse once, then query every signal from it.
#[derive(Debug, Clone)]
pub struct ServerMessage {
    value: Value,
}

impl ServerMessage {
    /// # Errors
    /// `VoiceError::ProtocolDecode` if `text` is not JSON.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map(|value| Self { value })
            .map_err(|e| VoiceError::ProtocolDecode(e.to_string()))
    }

    fn server_content(&self) -> Option<&Value> {
        self.value.get("serverContent")
    }

    fn model_parts(&self) -> impl Iterator<Item = &Value> {
        self.value
            .pointer("/serverContent/modelTurn/parts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
    }

    /// Samples from the first inline part whose MIME type mentions `audio`.
    pub fn audio(&self) -> Option<SampleBlock> {
        self.model_parts().find_map(|part| {
            let inline = part.get("inlineData")?;
            let mime = inline.get("mimeType")?.as_str()?;
            let data = inline.get("data")?.as_str()?;
            mime.contains("audio")
                .then(|| codec::bytes_to_samples(&codec::decode(data)))
        })
    }

    /// Transcript text, by priority: tool-call transcription, input
    /// transcription, output transcription, then a plain model text part.
    pub fn transcript(&self) -> Option<&str> {
        fn text_of(v: Option<&Value>) -> Option<&str> {
            v?.get("text")?.as_str()
        }

        text_of(self.value.get("toolCallTranscription"))
            .or_else(|| text_of(self.server_content()?.get("inputTranscription")))
            .or_else(|| text_of(self.server_content()?.get("outputTranscription")))
            .or_else(|| {
                self.model_parts()
                    .find_map(|part| part.get("text").and_then(Value::as_str))
            })
    }

    /// Whether the frame carries the user's speech transcription.
    pub fn is_user_transcript(&self) -> bool {
        self.server_content()
            .and_then(|c| c.get("inputTranscription"))
            .is_some()
    }

    pub fn is_turn_complete(&self) -> bool {
        self.flag("turnComplete")
    }

    /// The model stopped speaking because the user talked over it.
    pub fn is_interrupted(&self) -> bool {
        self.flag("interrupted")
    }

    pub fn is_setup_complete(&self) -> bool {
        self.value.get("setupComplete").is_some()
    }

    fn flag(&self, name: &str) -> bool {
        self.server_content()
            .and_then(|c| c.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

pub fn extract_audio(msg: &str) -> Option<SampleBlock> {
    ServerMessage::parse(msg).ok()?.audio()
}

pub fn extract_transcript(msg: &str) -> Option<String> {
    ServerMessage::parse(msg).ok()?.transcript().map(str::to_owned)
}

pub fn is_user_transcript(msg: &str) -> bool {
    ServerMessage::parse(msg).is_ok_and(|m| m.is_user_transcript())
}

pub fn is_turn_complete(msg: &str) -> bool {
    ServerMessage::parse(msg).is_ok_and(|m| m.is_turn_complete())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_audio_from_model_turn() {
        let msg = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AQACAA=="}}
        ]}}}"#;
        assert_eq!(extract_audio(msg), Some(vec![1, 2]));
    }

    #[test]
    fn ignores_non_audio_inline_data() {
        let msg = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"image/png","data":"AQACAA=="}}
        ]}}}"#;
        assert_eq!(extract_audio(msg), None);
    }

    #[test]
    fn first_audio_part_wins() {
        let msg = r#"{"serverContent":{"modelTurn":{"parts":[
            {"text":"hi"},
            {"inlineData":{"mimeType":"audio/pcm","data":"AQA="}},
            {"inlineData":{"mimeType":"audio/pcm","data":"AgA="}}
        ]}}}"#;
        assert_eq!(extract_audio(msg), Some(vec![1]));
    }

    #[test]
    fn truncated_audio_payload_decodes_valid_prefix() {
        // "AQACAA" then garbage: prefix decodes to [1, 2].
        let msg = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm","data":"AQACAA!!!!"}}
        ]}}}"#;
        assert_eq!(extract_audio(msg), Some(vec![1, 2]));
    }

    #[test]
    fn tool_call_transcription_has_priority() {
        let msg = r#"{"toolCallTranscription":{"text":"A"},
                      "serverContent":{"outputTranscription":{"text":"B"}}}"#;
        assert_eq!(extract_transcript(msg).as_deref(), Some("A"));
    }

    #[test]
    fn input_transcription_beats_output_and_marks_user() {
        let msg = r#"{"serverContent":{"inputTranscription":{"text":"me"},
                                       "outputTranscription":{"text":"model"}}}"#;
        assert_eq!(extract_transcript(msg).as_deref(), Some("me"));
        assert!(is_user_transcript(msg));
    }

    #[test]
    fn output_transcription_is_not_user() {
        let msg = r#"{"serverContent":{"outputTranscription":{"text":"Hello"}}}"#;
        assert_eq!(extract_transcript(msg).as_deref(), Some("Hello"));
        assert!(!is_user_transcript(msg));
    }

    #[test]
    fn input_transcription_without_text_falls_through_but_still_marks_user() {
        let msg = r#"{"serverContent":{"inputTranscription":{},
                                       "outputTranscription":{"text":"x"}}}"#;
        assert_eq!(extract_transcript(msg).as_deref(), Some("x"));
        assert!(is_user_transcript(msg));
    }

    #[test]
    fn model_text_part_is_last_resort() {
        let msg = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm","data":""}},
            {"text":"plain"}
        ]}}}"#;
        assert_eq!(extract_transcript(msg).as_deref(), Some("plain"));
    }

    #[test]
    fn turn_complete_detection() {
        assert!(is_turn_complete(r#"{"serverContent":{"turnComplete":true}}"#));
        assert!(!is_turn_complete(r#"{"serverContent":{"turnComplete":false}}"#));
        assert!(!is_turn_complete(r#"{"serverContent":{}}"#));
        assert!(!is_turn_complete(r#"{}"#));
    }

    #[test]
    fn setup_complete_and_interrupted_signals() {
        assert!(ServerMessage::parse(r#"{"setupComplete":{}}"#)
            .unwrap()
            .is_setup_complete());
        assert!(ServerMessage::parse(r#"{"serverContent":{"interrupted":true}}"#)
            .unwrap()
            .is_interrupted());
    }

    #[test]
    fn malformed_input_matches_nothing() {
        for msg in ["", "not json", "{\"serverContent\":", "[1,2,3]", "42", "null"] {
            assert_eq!(extract_audio(msg), None, "{msg}");
            assert_eq!(extract_transcript(msg), None, "{msg}");
            assert!(!is_user_transcript(msg), "{msg}");
            assert!(!is_turn_complete(msg), "{msg}");
        }
        assert!(ServerMessage::parse("not json").is_err());
    }

    #[test]
    fn wrongly_typed_fields_match_nothing() {
        let msg = r#"{"toolCallTranscription":{"text":5},
                      "serverContent":{"turnComplete":"yes",
                                       "modelTurn":{"parts":"oops"}}}"#;
        assert_eq!(extract_transcript(msg), None);
        assert!(!is_turn_complete(msg));
        assert_eq!(extract_audio(msg), None);
    }
}
