//! # gemini-voice-core
//!
//! Real-time bidirectional voice session engine for the Gemini Live API.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → CaptureDevice → CapturePipeline (gain, clamp, chunk)
//!                                     │ realtimeInput JSON
//!                                     ▼
//!                              Transport (WebSocket)
//!                                     │ serverContent JSON
//!                                     ▼
//!                           receive loop (ServerMessage)
//!                  ┌──────────────────┼──────────────────┐
//!            PlaybackQueue    TranscriptAggregator    turn events
//!                  │                  │
//!      JitterBuffer drain loop   broadcast::Sender<UtteranceEvent>
//!                  │
//!            PlaybackSink → Speaker
//! ```
//!
//! Device callbacks only touch lock-free rings. All encoding, parsing and
//! buffering happens on the session's own threads.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transcript;
pub mod transport;

// Convenience re-exports for downstream crates
pub use audio::AudioBackend;
pub use config::Config;
pub use engine::diagnostics::DiagnosticsSnapshot;
pub use engine::state::{SessionState, ShutdownSignal};
pub use engine::SessionController;
pub use error::{ErrorKind, VoiceError};
pub use events::{SessionStatusEvent, TurnEvent, TurnEventKind, UtteranceEvent};
pub use transcript::Role;
pub use transport::{Transport, TransportEvent, WebSocketTransport};
