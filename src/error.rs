//! Error types for the streaming client

use thiserror::Error;

/// Streaming client errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Parse error at byte {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("Protocol failure{}: {}",
        .error_code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default(),
        .error_message.as_deref().unwrap_or("server reported FAILURE"))]
    Protocol {
        status_code: Option<String>,
        error_code: Option<String>,
        error_message: Option<String>,
        connection_closed: bool,
    },

    #[error("Invalid market id: {0}")]
    InvalidMarketId(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
