//! In-memory accumulator for the HTTP/1.0 fallback.
//!
//! HTTP/1.0 clients cannot receive chunked framing, so an unknown-length body
//! is collected here first and sent afterwards with an exact `Content-Length`.
//! Memory is unbounded unless a limit is configured; crossing the limit fails
//! the transfer explicitly.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Sink;
use thiserror::Error;

/// Errors raised by the buffering sink.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffered body exceeds the limit of {limit} bytes")]
    LimitExceeded { limit: usize },

    #[error("content requested before the source completed")]
    Incomplete,

    #[error("buffer already closed")]
    Closed,
}

/// Sink collecting every chunk in arrival order.
#[derive(Debug, Default)]
pub struct BufferingSink {
    buffer: BytesMut,
    limit: Option<usize>,
    closed: bool,
}

impl BufferingSink {
    /// Unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer failing once more than `limit` bytes arrive (`None` = unbounded).
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Bytes collected so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Concatenated content, available only once the sink was closed.
    pub fn into_content(self) -> Result<Bytes, BufferError> {
        if !self.closed {
            return Err(BufferError::Incomplete);
        }
        Ok(self.buffer.freeze())
    }
}

impl Sink<Bytes> for BufferingSink {
    type Error = BufferError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.closed {
            return Poll::Ready(Err(BufferError::Closed));
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, chunk: Bytes) -> Result<(), Self::Error> {
        let this = self.get_mut();
        if this.closed {
            return Err(BufferError::Closed);
        }
        if let Some(limit) = this.limit {
            if this.buffer.len() + chunk.len() > limit {
                return Err(BufferError::LimitExceeded { limit });
            }
        }
        this.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.get_mut().closed = true;
        Poll::Ready(Ok(()))
    }
}
