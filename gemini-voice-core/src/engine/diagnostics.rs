//! Session counters, logged once at shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::capture::CaptureCounters;
use super::playback::PlaybackCounters;

#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub capture: Arc<CaptureCounters>,
    pub playback: Arc<PlaybackCounters>,
    pub chunks_sent: AtomicUsize,
    pub messages_received: AtomicUsize,
    pub malformed_messages: AtomicUsize,
    pub audio_blocks_enqueued: AtomicUsize,
    pub utterances_emitted: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn with_capture(capture: Arc<CaptureCounters>) -> Self {
        Self {
            capture,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            samples_captured: self.capture.samples_captured.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            audio_blocks_enqueued: self.audio_blocks_enqueued.load(Ordering::Relaxed),
            samples_played: self.playback.samples_played.load(Ordering::Relaxed),
            samples_discarded: self.playback.samples_discarded.load(Ordering::Relaxed),
            utterances_emitted: self.utterances_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_sent: usize,
    pub samples_captured: usize,
    pub messages_received: usize,
    pub malformed_messages: usize,
    pub audio_blocks_enqueued: usize,
    pub samples_played: usize,
    pub samples_discarded: usize,
    pub utterances_emitted: usize,
}

impl DiagnosticsSnapshot {
    pub fn log(&self) {
        tracing::info!(
            chunks_sent = self.chunks_sent,
            samples_captured = self.samples_captured,
            messages_received = self.messages_received,
            malformed_messages = self.malformed_messages,
            audio_blocks_enqueued = self.audio_blocks_enqueued,
            samples_played = self.samples_played,
            samples_discarded = self.samples_discarded,
            utterances_emitted = self.utterances_emitted,
            "session diagnostics"
        );
    }
}
