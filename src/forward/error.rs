//! Error definitions for the forwarding engine.

use thiserror::Error;

/// Type-erased error used at collaborator seams (origin stream, client sink).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that end an in-flight response transfer.
///
/// Every variant is fatal to the response: the client sink and the inbound
/// request have been reset by the time `send` returns one.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Reading the origin stream failed.
    #[error("origin stream failed: {0}")]
    Source(#[source] BoxError),

    /// Writing to or closing the client sink failed (includes disconnects).
    #[error("client sink failed: {0}")]
    Sink(#[source] BoxError),

    /// The origin produced a different byte count than it declared.
    #[error("body length mismatch: declared {declared} bytes, produced at least {produced}")]
    LengthMismatch { declared: u64, produced: u64 },

    /// The pipe already reached a terminal state.
    #[error("pipe already completed")]
    PipeClosed,
}

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;
