//! Transport receive loop.
//!
//! Each inbound frame is parsed once and fanned out: audio to the playback
//! queue, transcript fragments to the aggregator, turn and interruption
//! signals to the turn channel. A frame that fails to parse is counted and
//! skipped. Any transport error or closure is session-fatal.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use super::SessionShared;
use crate::buffering::jitter::PlaybackQueue;
use crate::events::TurnEventKind;
use crate::protocol::ServerMessage;
use crate::transcript::{Role, TranscriptAggregator};
use crate::transport::TransportEvent;

/// Bound on one blocking receive so the shutdown flag is rechecked.
const RECV_POLL: Duration = Duration::from_millis(100);

pub(crate) fn run_receive_loop(
    events: Receiver<TransportEvent>,
    queue: Arc<PlaybackQueue>,
    shared: Arc<SessionShared>,
) {
    let mut transcripts = TranscriptAggregator::new();

    while !shared.shutdown.is_triggered() {
        let event = match events.recv_timeout(RECV_POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                shared.fail("transport event stream ended".into());
                break;
            }
        };

        match event {
            TransportEvent::Message(text) => {
                handle_message(&text, &queue, &mut transcripts, &shared);
            }
            TransportEvent::Error(reason) => {
                shared.fail(format!("transport error: {reason}"));
                break;
            }
            TransportEvent::Closed(reason) => {
                let reason = reason.unwrap_or_else(|| "no reason given".into());
                shared.fail(format!("connection closed by server: {reason}"));
                break;
            }
        }
    }

    debug!("receive loop finished");
}

fn handle_message(
    text: &str,
    queue: &PlaybackQueue,
    transcripts: &mut TranscriptAggregator,
    shared: &SessionShared,
) {
    let diagnostics = &shared.diagnostics;
    diagnostics.messages_received.fetch_add(1, Ordering::Relaxed);

    let message = match ServerMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            diagnostics.malformed_messages.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, len = text.len(), "skipping malformed message");
            return;
        }
    };

    if message.is_setup_complete() && !shared.setup_acked.swap(true, Ordering::SeqCst) {
        info!("setup acknowledged by server");
    }

    if message.is_interrupted() {
        queue.interrupt();
        shared.emit_turn(TurnEventKind::Interrupted);
        debug!("model interrupted, pending playback dropped");
    }

    if let Some(block) = message.audio() {
        if !block.is_empty() {
            diagnostics
                .audio_blocks_enqueued
                .fetch_add(1, Ordering::Relaxed);
            queue.push(block);
        }
    }

    if let Some(fragment) = message.transcript() {
        let role = if message.is_user_transcript() {
            Role::User
        } else {
            Role::Assistant
        };
        if let Some(utterance) = transcripts.push(role, fragment) {
            shared.emit_utterance(utterance);
        }
    }

    if message.is_turn_complete() {
        shared.emit_turn(TurnEventKind::Complete);
    }
}
