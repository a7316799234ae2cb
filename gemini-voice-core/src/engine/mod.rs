//! `SessionController`: lifecycle of one live voice session.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionController::new()
//!     └─► start()   connect → receive thread → setup sent (AwaitingSetupAck)
//!                   → setupComplete or setup wait elapsed (Active)
//!                   → playback thread → capture started
//!         └─► wait()   blocks until shutdown is signalled, then tears down:
//!                      stop capture → close transport → join playback → join receive
//! ```
//!
//! ## Threading
//!
//! Three independently scheduled loops share one [`ShutdownSignal`]:
//! the capture device thread (frames → chunks → `Transport::send`), the
//! receive thread (transport events → parser → queue / transcripts) and the
//! playback thread (jitter buffer → device). The playback device is opened
//! on its own thread because `cpal::Stream` is `!Send`.
//!
//! Any transport error is session-fatal: the first one observed moves the
//! state to `Closing`, is recorded, and is returned from `wait()`.

pub mod capture;
pub mod diagnostics;
pub mod playback;
mod receive;
pub mod state;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::audio::dummy::DiscardSink;
use crate::audio::{AudioBackend, PlaybackDevice, PlaybackSink};
use crate::buffering::jitter::{JitterBuffer, PlaybackQueue};
use crate::config::Config;
use crate::error::{Result, VoiceError};
use crate::events::{SessionStatusEvent, TurnEvent, TurnEventKind, UtteranceEvent};
use crate::protocol::build_setup;
use crate::transcript::Utterance;
use crate::transport::Transport;

use self::capture::CapturePipeline;
use self::diagnostics::{DiagnosticsSnapshot, SessionDiagnostics};
use self::state::{SessionState, SessionStateCell, ShutdownSignal};

/// Broadcast channel capacity per event kind.
const BROADCAST_CAP: usize = 256;

/// Poll step while waiting for the setup acknowledgement.
const SETUP_POLL: Duration = Duration::from_millis(20);

/// State shared between the controller and its loops.
pub(crate) struct SessionShared {
    pub state: SessionStateCell,
    pub shutdown: ShutdownSignal,
    pub setup_acked: AtomicBool,
    pub diagnostics: SessionDiagnostics,
    fatal_error: Mutex<Option<String>>,
    seq: AtomicU64,
    utterance_tx: broadcast::Sender<UtteranceEvent>,
    turn_tx: broadcast::Sender<TurnEvent>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
}

impl SessionShared {
    fn new(diagnostics: SessionDiagnostics) -> Self {
        let (utterance_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (turn_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            state: SessionStateCell::new(SessionState::Disconnected),
            shutdown: ShutdownSignal::new(),
            setup_acked: AtomicBool::new(false),
            diagnostics,
            fatal_error: Mutex::new(None),
            seq: AtomicU64::new(0),
            utterance_tx,
            turn_tx,
            status_tx,
        }
    }

    fn set_state(&self, state: SessionState, detail: Option<String>) {
        self.state.store(state);
        self.emit_status(state, detail);
    }

    fn advance(&self, from: SessionState, to: SessionState) -> bool {
        let moved = self.state.advance(from, to);
        if moved {
            self.emit_status(to, None);
        }
        moved
    }

    fn emit_status(&self, status: SessionState, detail: Option<String>) {
        info!(state = ?status, "session state changed");
        let _ = self.status_tx.send(SessionStatusEvent { status, detail });
    }

    /// Record a session-fatal condition and signal shutdown. Only the first
    /// failure before `Closing` is recorded.
    pub(crate) fn fail(&self, reason: String) {
        if self.state.begin_closing() {
            error!(reason = %reason, "session-fatal error");
            *self.fatal_error.lock() = Some(reason.clone());
            self.emit_status(SessionState::Closing, Some(reason));
        }
        self.shutdown.trigger();
    }

    fn fatal_error(&self) -> Option<String> {
        self.fatal_error.lock().clone()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn emit_utterance(&self, utterance: Utterance) {
        self.diagnostics
            .utterances_emitted
            .fetch_add(1, Ordering::Relaxed);
        info!(role = ?utterance.role, text = %utterance.text, "utterance");
        let _ = self.utterance_tx.send(UtteranceEvent {
            seq: self.next_seq(),
            role: utterance.role,
            text: utterance.text,
        });
    }

    pub(crate) fn emit_turn(&self, kind: TurnEventKind) {
        let _ = self.turn_tx.send(TurnEvent {
            seq: self.next_seq(),
            kind,
        });
    }
}

#[derive(Default)]
struct LoopHandles {
    receive: Option<JoinHandle<()>>,
    playback: Option<JoinHandle<()>>,
}

/// The top-level session handle.
///
/// `SessionController` is `Send + Sync`; every field uses interior
/// mutability. One controller runs one session: `start()` once, then `wait()`.
pub struct SessionController {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    capture: Mutex<CapturePipeline>,
    playback_device: Mutex<Option<Box<dyn PlaybackDevice>>>,
    queue: Arc<PlaybackQueue>,
    shared: Arc<SessionShared>,
    loops: Mutex<LoopHandles>,
    started: AtomicBool,
    torn_down: AtomicBool,
}

impl SessionController {
    pub fn new(config: Config, transport: Arc<dyn Transport>, audio: AudioBackend) -> Self {
        let capture = CapturePipeline::new(
            audio.capture,
            config.chunk_size,
            config.gain_factor,
            config.input_sample_rate,
        );
        let diagnostics = SessionDiagnostics::with_capture(capture.counters());

        Self {
            config: Arc::new(config),
            transport,
            capture: Mutex::new(capture),
            playback_device: Mutex::new(Some(audio.playback)),
            queue: Arc::new(PlaybackQueue::new()),
            shared: Arc::new(SessionShared::new(diagnostics)),
            loops: Mutex::new(LoopHandles::default()),
            started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Connect, send setup, wait for the acknowledgement, then start the
    /// playback and capture loops. Returns once the session is `Active`.
    ///
    /// # Errors
    /// - `AlreadyRunning` on a second call.
    /// - `Transport` when connecting, sending setup, or the setup phase fails.
    /// - The capture device's error if the microphone cannot be opened.
    /// - `ShutdownRequested` when the shutdown signal fires before `Active`.
    ///
    /// On error the session has already been torn down to `Closed`.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(VoiceError::AlreadyRunning);
        }
        let shared = &self.shared;

        if !shared.advance(SessionState::Disconnected, SessionState::Connecting) {
            return Err(self.abort(self.cancelled()));
        }
        let events = match self.transport.connect() {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "connect failed");
                return Err(self.abort(e));
            }
        };
        if shared.shutdown.is_triggered() {
            return Err(self.abort(self.cancelled()));
        }

        let receive = {
            let queue = Arc::clone(&self.queue);
            let shared = Arc::clone(shared);
            thread::Builder::new()
                .name("gemini-voice-receive".into())
                .spawn(move || receive::run_receive_loop(events, queue, shared))
        };
        match receive {
            Ok(handle) => self.loops.lock().receive = Some(handle),
            Err(e) => return Err(self.abort(e.into())),
        }

        let sent = build_setup(&self.config).and_then(|setup| self.transport.send(setup));
        if let Err(e) = sent {
            error!(error = %e, "failed to send setup");
            return Err(self.abort(e));
        }
        shared.advance(SessionState::Connecting, SessionState::AwaitingSetupAck);
        info!(model = %self.config.model_name, "setup sent, awaiting acknowledgement");

        let deadline = Instant::now() + self.config.setup_wait;
        while !shared.setup_acked.load(Ordering::SeqCst) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || shared.shutdown.wait_timeout(SETUP_POLL.min(remaining)) {
                break;
            }
        }

        if shared.shutdown.is_triggered()
            || !shared.advance(SessionState::AwaitingSetupAck, SessionState::Active)
        {
            return Err(self.abort(self.cancelled()));
        }
        if !shared.setup_acked.load(Ordering::SeqCst) {
            info!(
                waited_ms = self.config.setup_wait.as_millis() as u64,
                "no setup acknowledgement yet, proceeding"
            );
        }

        if let Err(e) = self.spawn_playback() {
            return Err(self.abort(e));
        }
        if shared.shutdown.is_triggered() {
            return Err(self.abort(self.cancelled()));
        }

        let transport = Arc::clone(&self.transport);
        let loop_shared = Arc::clone(shared);
        let started = self.capture.lock().start(move |message| {
            if loop_shared.shutdown.is_triggered() {
                return;
            }
            match transport.send(message) {
                Ok(()) => {
                    loop_shared
                        .diagnostics
                        .chunks_sent
                        .fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => loop_shared.fail(format!("audio send failed: {e}")),
            }
        });
        if let Err(e) = started {
            error!(error = %e, "capture failed to start");
            return Err(self.abort(e));
        }
        if shared.shutdown.is_triggered() {
            return Err(self.abort(self.cancelled()));
        }

        info!("session active");
        Ok(())
    }

    fn spawn_playback(&self) -> Result<()> {
        let mut device = self
            .playback_device
            .lock()
            .take()
            .ok_or(VoiceError::AlreadyRunning)?;
        let jitter = JitterBuffer::new(
            Arc::clone(&self.queue),
            self.config.playback_high_watermark,
            self.config.playback_low_watermark,
        );
        let output_rate = self.config.output_sample_rate;
        let shared = Arc::clone(&self.shared);

        let handle = thread::Builder::new()
            .name("gemini-voice-playback".into())
            .spawn(move || {
                let mut sink: Box<dyn PlaybackSink> = match device.start_playback(output_rate, 1) {
                    Ok(sink) => sink,
                    Err(e) => {
                        warn!(error = %e, "playback unavailable, inbound audio will be discarded");
                        Box::new(DiscardSink)
                    }
                };
                playback::run_drain_loop(
                    jitter,
                    sink.as_mut(),
                    &shared.shutdown,
                    &shared.diagnostics.playback,
                );
                // Sink (and any device stream) drops on this thread.
                drop(sink);
            })?;

        self.loops.lock().playback = Some(handle);
        Ok(())
    }

    /// Block until shutdown is signalled (user request or fatal error), then
    /// tear the session down.
    ///
    /// # Errors
    /// `Transport` carrying the recorded fatal error, if one ended the session.
    pub fn wait(&self) -> Result<()> {
        self.shared.shutdown.wait();
        self.shutdown_now();
        match self.shared.fatal_error() {
            Some(reason) => Err(VoiceError::Transport(reason)),
            None => Ok(()),
        }
    }

    /// Ask the session to stop. Safe from any thread; `wait()` does the rest.
    pub fn request_shutdown(&self) {
        if self.shared.state.begin_closing() {
            self.shared
                .emit_status(SessionState::Closing, Some("shutdown requested".into()));
        }
        self.shared.shutdown.trigger();
    }

    /// Clone of the cancellation flag, for signal handlers.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shared.shutdown.clone()
    }

    /// Stop every loop in order and move to `Closed`. Idempotent.
    pub fn shutdown_now(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = &self.shared;
        if shared.state.begin_closing() {
            shared.emit_status(SessionState::Closing, None);
        }
        shared.shutdown.trigger();

        self.capture.lock().stop();
        self.transport.close();

        let LoopHandles { receive, playback } = std::mem::take(&mut *self.loops.lock());
        if let Some(handle) = playback {
            if handle.join().is_err() {
                warn!("playback thread panicked");
            }
        }
        if let Some(handle) = receive {
            if handle.join().is_err() {
                warn!("receive thread panicked");
            }
        }

        shared.diagnostics.snapshot().log();
        shared.set_state(SessionState::Closed, shared.fatal_error());
    }

    /// Move to `Closing` after a shutdown observed during `start()` and pick
    /// the error to report: the recorded fatal error, else `ShutdownRequested`.
    fn cancelled(&self) -> VoiceError {
        let shared = &self.shared;
        if shared.state.begin_closing() {
            shared.emit_status(SessionState::Closing, Some("shutdown requested".into()));
        }
        shared.shutdown.trigger();
        match shared.fatal_error() {
            Some(reason) => VoiceError::Transport(reason),
            None => {
                info!("shutdown requested during setup, not starting");
                VoiceError::ShutdownRequested
            }
        }
    }

    fn abort(&self, err: VoiceError) -> VoiceError {
        self.shutdown_now();
        err
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.load()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to finished utterances (both roles).
    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<UtteranceEvent> {
        self.shared.utterance_tx.subscribe()
    }

    /// Subscribe to turn-complete and interruption events.
    pub fn subscribe_turns(&self) -> broadcast::Receiver<TurnEvent> {
        self.shared.turn_tx.subscribe()
    }

    /// Subscribe to session state transitions.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// Samples received but not yet handed to the drain loop.
    pub fn queued_playback_samples(&self) -> usize {
        self.queue.queued_samples()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.started.load(Ordering::SeqCst) {
            self.shutdown_now();
        }
    }
}
