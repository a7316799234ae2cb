//! Wire protocol of the Live API bidirectional stream.
//!
//! Outbound: one `setup` message per session, then `realtimeInput` audio
//! chunks. Inbound: any mix of model audio, transcriptions and turn signals
//! under `serverContent`, plus the top-level `setupComplete` and
//! `toolCallTranscription`.

pub mod messages;
pub mod parser;

pub use messages::{build_audio_input, build_setup, input_audio_mime};
pub use parser::{
    extract_audio, extract_transcript, is_turn_complete, is_user_transcript, ServerMessage,
};
