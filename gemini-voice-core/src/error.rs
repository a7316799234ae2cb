use thiserror::Error;

/// All errors produced by gemini-voice-core.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport is not connected")]
    NotConnected,

    #[error("malformed server message: {0}")]
    ProtocolDecode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("already running")]
    AlreadyRunning,

    #[error("shutdown requested before the session became active")]
    ShutdownRequested,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used to decide how far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Capture or playback device failure. Fatal to that half only.
    Device,
    /// Connect/handshake/send/receive failure. Always session-fatal.
    Transport,
    /// Malformed inbound frame. Absorbed where detected.
    ProtocolDecode,
    /// Bad configuration. Fatal at startup.
    Config,
    Internal,
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::AudioDevice(_)
            | VoiceError::AudioStream(_)
            | VoiceError::NoDefaultInputDevice
            | VoiceError::NoDefaultOutputDevice => ErrorKind::Device,
            VoiceError::Transport(_) | VoiceError::NotConnected => ErrorKind::Transport,
            VoiceError::ProtocolDecode(_) | VoiceError::Json(_) => ErrorKind::ProtocolDecode,
            VoiceError::Config(_) => ErrorKind::Config,
            VoiceError::AlreadyRunning
            | VoiceError::ShutdownRequested
            | VoiceError::Io(_)
            | VoiceError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error must tear the whole session down.
    pub fn is_session_fatal(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_session_fatal() {
        assert!(VoiceError::Transport("reset".into()).is_session_fatal());
        assert!(VoiceError::NotConnected.is_session_fatal());
        assert!(!VoiceError::AudioDevice("busy".into()).is_session_fatal());
        assert!(!VoiceError::ProtocolDecode("bad".into()).is_session_fatal());
        assert!(!VoiceError::Config("chunk".into()).is_session_fatal());
        assert!(!VoiceError::ShutdownRequested.is_session_fatal());
    }

    #[test]
    fn json_errors_classify_as_protocol_decode() {
        let err: VoiceError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::ProtocolDecode);
    }
}
