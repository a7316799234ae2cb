//! Message transport to the Live API.
//!
//! The session controller only sees the [`Transport`] trait. Inbound frames,
//! errors and closure arrive on a `crossbeam_channel::Receiver` handed out by
//! [`Transport::connect`], delivered from the transport's own context.
//! `send` may be called from any thread.

pub mod websocket;

use crossbeam_channel::Receiver;

use crate::error::Result;

pub use websocket::WebSocketTransport;

/// Something observed on the inbound side of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame (or UTF-8 binary frame).
    Message(String),
    /// A fatal transport failure. No further events follow.
    Error(String),
    /// The remote end closed the connection, with its reason if it sent one.
    Closed(Option<String>),
}

pub trait Transport: Send + Sync + 'static {
    /// Open the connection and return the inbound event stream.
    ///
    /// # Errors
    /// `VoiceError::Transport` when the handshake fails or times out.
    fn connect(&self) -> Result<Receiver<TransportEvent>>;

    /// Queue one text frame for sending.
    ///
    /// # Errors
    /// `VoiceError::NotConnected` when the connection is not open.
    fn send(&self, text: String) -> Result<()>;

    /// Close the connection. Idempotent. Errors raised after this call are
    /// not reported on the event stream.
    fn close(&self);

    fn is_connected(&self) -> bool;
}
