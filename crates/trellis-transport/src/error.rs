use thiserror::Error;

/// Connection-level failures. These are surfaced to the caller and never
/// auto-retried inside the engine.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("connection handshake failed: {0}")]
    Handshake(String),
    #[error("failed to send frame: {0}")]
    SendFailed(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
