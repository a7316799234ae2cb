use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use gemini_voice_core::audio::{
    AudioBackend, CaptureDevice, FrameCallback, PlaybackDevice, PlaybackSink,
};
use gemini_voice_core::buffering::chunk::SampleBlock;
use gemini_voice_core::error::Result;
use gemini_voice_core::{
    codec, Config, ErrorKind, Role, SessionController, SessionState, Transport, TransportEvent,
    TurnEventKind, VoiceError,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

type EventLog = Arc<Mutex<Vec<&'static str>>>;

// ── Fakes ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeTransport {
    fail_connect: bool,
    /// Answer the setup message with `setupComplete`.
    auto_ack: bool,
    sent: Mutex<Vec<String>>,
    inbound: Mutex<Option<Sender<TransportEvent>>>,
    connected: AtomicBool,
    sends_after_close: AtomicUsize,
    log: EventLog,
}

impl FakeTransport {
    fn inject(&self, event: TransportEvent) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            tx.send(event).unwrap();
        }
    }

    fn inject_json(&self, value: Value) {
        self.inject(TransportEvent::Message(value.to_string()));
    }

    fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }
}

impl Transport for FakeTransport {
    fn connect(&self) -> Result<Receiver<TransportEvent>> {
        if self.fail_connect {
            return Err(VoiceError::Transport("connection refused".into()));
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        *self.inbound.lock() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            self.sends_after_close.fetch_add(1, Ordering::SeqCst);
            return Err(VoiceError::NotConnected);
        }
        let is_setup = text.starts_with("{\"setup\"");
        self.sent.lock().push(text);
        if is_setup && self.auto_ack {
            self.inject_json(serde_json::json!({ "setupComplete": {} }));
        }
        Ok(())
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.inbound.lock().take();
        self.log.lock().push("transport_close");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Capture device driven by the test through `feed`.
#[derive(Clone, Default)]
struct ScriptedCapture {
    callback: Arc<Mutex<Option<FrameCallback>>>,
    fail: bool,
    log: EventLog,
}

impl ScriptedCapture {
    fn feed(&self, frame: &[i16]) {
        if let Some(cb) = self.callback.lock().as_mut() {
            cb(frame);
        }
    }
}

impl CaptureDevice for ScriptedCapture {
    fn start_capture(&mut self, on_frame: FrameCallback) -> Result<()> {
        if self.fail {
            return Err(VoiceError::NoDefaultInputDevice);
        }
        *self.callback.lock() = Some(on_frame);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.callback.lock().take();
        self.log.lock().push("capture_stop");
    }
}

#[derive(Clone, Default)]
struct RecordingPlayback {
    played: Arc<Mutex<Vec<i16>>>,
}

struct RecordingSink(Arc<Mutex<Vec<i16>>>);

impl PlaybackSink for RecordingSink {
    fn play(&mut self, block: SampleBlock) {
        self.0.lock().extend(block);
    }
}

impl PlaybackDevice for RecordingPlayback {
    fn start_playback(&mut self, _sample_rate: u32, _channels: u16) -> Result<Box<dyn PlaybackSink>> {
        Ok(Box::new(RecordingSink(Arc::clone(&self.played))))
    }
}

/// Output that cannot be opened, as on a headless machine.
struct UnavailablePlayback;

impl PlaybackDevice for UnavailablePlayback {
    fn start_playback(&mut self, _sample_rate: u32, _channels: u16) -> Result<Box<dyn PlaybackSink>> {
        Err(VoiceError::NoDefaultOutputDevice)
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    transport: Arc<FakeTransport>,
    capture: ScriptedCapture,
    playback: RecordingPlayback,
    controller: SessionController,
    log: EventLog,
}

fn test_config() -> Config {
    Config {
        chunk_size: 4,
        gain_factor: 1,
        playback_high_watermark: 8,
        playback_low_watermark: 2,
        setup_wait: Duration::from_millis(50),
        ..Config::default()
    }
}

fn harness_with(config: Config, transport: FakeTransport, capture_fails: bool) -> Harness {
    let log: EventLog = Arc::default();
    let transport = Arc::new(FakeTransport {
        log: Arc::clone(&log),
        ..transport
    });
    let capture = ScriptedCapture {
        fail: capture_fails,
        log: Arc::clone(&log),
        ..ScriptedCapture::default()
    };
    let playback = RecordingPlayback::default();
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let controller = SessionController::new(
        config,
        dyn_transport,
        AudioBackend::new(Box::new(capture.clone()), Box::new(playback.clone())),
    );
    Harness {
        transport,
        capture,
        playback,
        controller,
        log,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), FakeTransport::default(), false)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn recv_with_timeout<T: Clone>(rx: &mut broadcast::Receiver<T>, timeout: Duration) -> T {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("event channel closed unexpectedly"),
        }
    }
}

const TIMEOUT: Duration = Duration::from_secs(2);

// ── Tests ────────────────────────────────────────────────────────────────

#[test]
fn setup_goes_out_first_then_audio_chunks() {
    let h = harness();
    h.controller.start().unwrap();
    assert_eq!(h.controller.state(), SessionState::Active);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0]["setup"]["model"],
        format!("models/{}", test_config().model_name)
    );

    h.capture.feed(&[1, 2, 3]);
    assert_eq!(h.transport.sent().len(), 1);
    h.capture.feed(&[4]);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    let data = sent[1]["realtimeInput"]["mediaChunks"][0]["data"]
        .as_str()
        .unwrap();
    assert_eq!(codec::bytes_to_samples(&codec::decode(data)), vec![1, 2, 3, 4]);

    h.controller.request_shutdown();
    h.controller.wait().unwrap();
    assert_eq!(h.controller.state(), SessionState::Closed);
    assert_eq!(h.controller.diagnostics_snapshot().chunks_sent, 1);
}

#[test]
fn setup_complete_ends_the_setup_wait_early() {
    let config = Config {
        setup_wait: Duration::from_secs(30),
        ..test_config()
    };
    let h = harness_with(
        config,
        FakeTransport {
            auto_ack: true,
            ..FakeTransport::default()
        },
        false,
    );

    let start = Instant::now();
    h.controller.start().unwrap();
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(h.controller.state(), SessionState::Active);
}

#[test]
fn inbound_audio_is_played_in_order() {
    let h = harness();
    h.controller.start().unwrap();

    let samples: Vec<i16> = (1..=10).collect();
    h.transport.inject_json(serde_json::json!({
        "serverContent": { "modelTurn": { "parts": [
            { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": codec::encode(&samples) } }
        ]}}
    }));

    assert!(wait_until(TIMEOUT, || h.playback.played.lock().len() == 10));
    assert_eq!(*h.playback.played.lock(), samples);

    h.controller.request_shutdown();
    h.controller.wait().unwrap();
    let snapshot = h.controller.diagnostics_snapshot();
    assert_eq!(snapshot.audio_blocks_enqueued, 1);
    assert_eq!(snapshot.samples_played, 10);
}

#[test]
fn utterances_are_broadcast_per_role() {
    let h = harness();
    let mut utterances = h.controller.subscribe_transcripts();
    h.controller.start().unwrap();

    for fragment in ["Hi", " there."] {
        h.transport.inject_json(serde_json::json!({
            "serverContent": { "inputTranscription": { "text": fragment } }
        }));
    }
    h.transport.inject_json(serde_json::json!({
        "serverContent": { "outputTranscription": { "text": "Hello!" } }
    }));

    let user = recv_with_timeout(&mut utterances, TIMEOUT);
    assert_eq!(user.role, Role::User);
    assert_eq!(user.text, "Hi there.");

    let assistant = recv_with_timeout(&mut utterances, TIMEOUT);
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.text, "Hello!");
    assert!(assistant.seq > user.seq);
}

#[test]
fn malformed_frames_are_skipped_and_the_session_continues() {
    let h = harness();
    let mut turns = h.controller.subscribe_turns();
    h.controller.start().unwrap();

    h.transport
        .inject(TransportEvent::Message("{\"serverContent\":".into()));
    h.transport.inject_json(serde_json::json!({ "serverContent": { "interrupted": true } }));
    h.transport.inject_json(serde_json::json!({ "serverContent": { "turnComplete": true } }));

    assert_eq!(
        recv_with_timeout(&mut turns, TIMEOUT).kind,
        TurnEventKind::Interrupted
    );
    assert_eq!(
        recv_with_timeout(&mut turns, TIMEOUT).kind,
        TurnEventKind::Complete
    );
    assert_eq!(h.controller.state(), SessionState::Active);
    assert_eq!(h.controller.diagnostics_snapshot().malformed_messages, 1);
}

#[test]
fn transport_error_while_active_closes_everything() {
    let h = harness();
    let mut status = h.controller.subscribe_status();
    h.controller.start().unwrap();

    h.transport
        .inject(TransportEvent::Error("connection reset".into()));
    let err = h.controller.wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(h.controller.state(), SessionState::Closed);

    // stop capture → close transport
    assert_eq!(*h.log.lock(), vec!["capture_stop", "transport_close"]);

    let sent_before = h.transport.sent().len();
    h.capture.feed(&[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(h.transport.sent().len(), sent_before);
    assert_eq!(h.transport.sends_after_close.load(Ordering::SeqCst), 0);

    let mut seen = Vec::new();
    while let Ok(event) = status.try_recv() {
        seen.push(event.status);
    }
    let closing = seen.iter().position(|s| *s == SessionState::Closing).unwrap();
    assert_eq!(seen.last(), Some(&SessionState::Closed));
    assert!(closing < seen.len() - 1);
}

#[test]
fn server_close_is_session_fatal() {
    let h = harness();
    h.controller.start().unwrap();
    h.transport
        .inject(TransportEvent::Closed(Some("1011 internal error".into())));
    assert!(h.controller.wait().is_err());
    assert_eq!(h.controller.state(), SessionState::Closed);
}

#[test]
fn connect_failure_leaves_the_session_closed() {
    let h = harness_with(
        test_config(),
        FakeTransport {
            fail_connect: true,
            ..FakeTransport::default()
        },
        false,
    );
    let err = h.controller.start().unwrap_err();
    assert!(matches!(err, VoiceError::Transport(_)));
    assert_eq!(h.controller.state(), SessionState::Closed);
    assert!(h.transport.sent().is_empty());
}

#[test]
fn capture_device_failure_aborts_start() {
    let h = harness_with(test_config(), FakeTransport::default(), true);
    let err = h.controller.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
    assert_eq!(h.controller.state(), SessionState::Closed);
    assert!(!h.transport.is_connected());
}

#[test]
fn second_start_is_rejected() {
    let h = harness();
    h.controller.start().unwrap();
    assert!(matches!(
        h.controller.start(),
        Err(VoiceError::AlreadyRunning)
    ));
    h.controller.request_shutdown();
    h.controller.wait().unwrap();
}

#[test]
fn shutdown_during_setup_wait_stops_start() {
    let config = Config {
        setup_wait: Duration::from_secs(5),
        ..test_config()
    };
    let h = harness_with(config, FakeTransport::default(), false);
    let mut status = h.controller.subscribe_status();
    let signal = h.controller.shutdown_signal();
    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        signal.trigger();
    });

    let started = Instant::now();
    let err = h.controller.start().unwrap_err();
    interrupter.join().unwrap();

    assert!(matches!(err, VoiceError::ShutdownRequested));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(h.controller.state(), SessionState::Closed);
    assert!(h.capture.callback.lock().is_none());
    assert_eq!(*h.log.lock(), vec!["transport_close"]);

    let mut seen = Vec::new();
    while let Ok(event) = status.try_recv() {
        seen.push(event.status);
    }
    assert!(!seen.contains(&SessionState::Active));
    assert!(seen.contains(&SessionState::Closing));
    assert_eq!(seen.last(), Some(&SessionState::Closed));
}

#[test]
fn shutdown_before_start_never_sends_setup() {
    let h = harness();
    h.controller.shutdown_signal().trigger();
    assert!(matches!(
        h.controller.start(),
        Err(VoiceError::ShutdownRequested)
    ));
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.controller.state(), SessionState::Closed);
}

#[test]
fn unavailable_playback_device_falls_back_to_discarding() {
    let transport = Arc::new(FakeTransport::default());
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let controller = SessionController::new(
        test_config(),
        dyn_transport,
        AudioBackend::new(
            Box::new(ScriptedCapture::default()),
            Box::new(UnavailablePlayback),
        ),
    );
    controller.start().unwrap();
    assert_eq!(controller.state(), SessionState::Active);

    let samples: Vec<i16> = (1..=10).collect();
    transport.inject_json(serde_json::json!({
        "serverContent": { "modelTurn": { "parts": [
            { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": codec::encode(&samples) } }
        ]}}
    }));

    assert!(wait_until(TIMEOUT, || {
        controller.diagnostics_snapshot().samples_discarded == 10
    }));
    assert_eq!(controller.queued_playback_samples(), 0);
    assert_eq!(controller.state(), SessionState::Active);

    controller.request_shutdown();
    controller.wait().unwrap();
    assert_eq!(controller.diagnostics_snapshot().samples_played, 0);
}
