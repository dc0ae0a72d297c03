use thiserror::Error;

use trellis_transport::TransportError;

/// Failures a load cycle can end in. Cancellation is deliberately not
/// here: an aborted load resolves as a clean `LoadOutcome::Cancelled`
/// and is never surfaced as an error.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Transport unavailable or send failed. Surfaced to the caller,
    /// never auto-retried inside the engine.
    #[error(transparent)]
    Connection(#[from] TransportError),
    /// The server responded with an explicit failure indicator.
    #[error("query failed: {message}")]
    Query {
        status: Option<u16>,
        message: String,
    },
    /// The data payload as a whole could not be decoded. Individually
    /// malformed rows are skipped during the build instead.
    #[error("undecodable data payload: {0}")]
    MalformedResponse(String),
    /// A page was requested before any query was submitted.
    #[error("no query has been submitted")]
    NoQuery,
}
