//! `tokio-tungstenite` transport running on a private runtime.
//!
//! ```text
//!  send(text) ──► unbounded mpsc ──► writer task ──► WebSocket sink
//!                                                        │
//!  Receiver<TransportEvent> ◄── crossbeam ◄── reader task ◄┘
//! ```
//!
//! The runtime has a single worker so both tasks stay off the caller's
//! threads. `close()` sends a normal Close frame, waits up to
//! [`CLOSE_GRACE`] for it to be written, then shuts the runtime down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Transport, TransportEvent};
use crate::error::{Result, VoiceError};

/// Bidirectional streaming endpoint of the Live API.
pub const LIVE_API_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const CLIENT_USER_AGENT: &str = concat!("gemini-voice/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Close(oneshot::Sender<()>),
}

pub struct WebSocketTransport {
    url: String,
    runtime: Mutex<Option<Runtime>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    connected: Arc<AtomicBool>,
}

impl WebSocketTransport {
    /// Transport for the public Live API endpoint, authenticated by `api_key`.
    pub fn live_api(api_key: &str) -> Self {
        Self::new(format!("{LIVE_API_ENDPOINT}?key={api_key}"))
    }

    /// Transport for an arbitrary `ws://` or `wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            runtime: Mutex::new(None),
            outbound: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// URL without its query string, safe to log.
    fn redacted_url(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) -> Result<Receiver<TransportEvent>> {
        let mut runtime_slot = self.runtime.lock();
        if runtime_slot.is_some() {
            return Err(VoiceError::AlreadyRunning);
        }

        // rustls needs a process-wide crypto provider; a second install is a no-op error.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("gemini-voice-ws")
            .enable_all()
            .build()?;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| VoiceError::Transport(format!("invalid endpoint: {e}")))?;
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        info!(endpoint = self.redacted_url(), "connecting");
        let (stream, response) = runtime
            .block_on(async {
                tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
                    .await
            })
            .map_err(|_| VoiceError::Transport("connect timed out".into()))?
            .map_err(|e| VoiceError::Transport(format!("connect failed: {e}")))?;
        info!(status = %response.status(), "websocket connected");

        let (sink, source) = stream.split();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        self.connected.store(true, Ordering::SeqCst);
        runtime.spawn(write_loop(
            sink,
            outbound_rx,
            events_tx.clone(),
            Arc::clone(&self.connected),
        ));
        runtime.spawn(read_loop(source, events_tx, Arc::clone(&self.connected)));

        *self.outbound.lock() = Some(outbound_tx);
        *runtime_slot = Some(runtime);
        Ok(events_rx)
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(VoiceError::NotConnected);
        }
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(VoiceError::NotConnected)?;
        tx.send(Outbound::Text(text))
            .map_err(|_| VoiceError::NotConnected)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let outbound = self.outbound.lock().take();
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };

        if let Some(tx) = outbound {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Outbound::Close(ack_tx)).is_ok() {
                let acked = runtime.block_on(async { tokio::time::timeout(CLOSE_GRACE, ack_rx).await });
                if acked.is_err() {
                    warn!("close frame not flushed within grace period");
                }
            }
        }

        runtime.shutdown_timeout(Duration::from_millis(200));
        info!("websocket closed");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    if connected.swap(false, Ordering::SeqCst) {
                        let _ = events.send(TransportEvent::Error(format!("send failed: {e}")));
                    }
                    break;
                }
            }
            Outbound::Close(ack) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client shutdown".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "close frame not sent");
                }
                let _ = ack.send(());
                break;
            }
        }
    }
    debug!("writer task finished");
}

async fn read_loop(
    mut source: SplitStream<WsStream>,
    events: Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = source.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => TransportEvent::Message(text),
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => TransportEvent::Message(text),
                Err(e) => {
                    warn!(len = e.as_bytes().len(), "skipping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                if connected.swap(false, Ordering::SeqCst) {
                    let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                    info!(reason = ?reason, "server closed the connection");
                    let _ = events.send(TransportEvent::Closed(reason));
                }
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                }
                return;
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }

    if connected.swap(false, Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Closed(None));
    }
}
