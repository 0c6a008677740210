//! Error types for the Chorus gateway

use thiserror::Error;

/// Result type alias for Chorus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Chorus gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (the only class that is fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Connector error (transient or terminal, always per-connector)
    #[error("connector error: {0}")]
    Connector(String),

    /// Authentication/credential error
    #[error("auth error: {0}")]
    Auth(String),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Live-status check error
    #[error("live check error: {0}")]
    LiveCheck(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
