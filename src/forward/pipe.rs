//! Streaming pipeline from a body source to a sink.
//!
//! # Responsibilities
//! - Pull one chunk at a time, only after the sink accepted the previous one
//! - Close the sink exactly once when the source is exhausted
//! - Leave the sink open on failure so the caller can reset both ends
//! - Enforce a declared body length
//!
//! # State machine
//! ```text
//! Idle ──to()──▶ Streaming ──source exhausted──▶ Completed
//!                    │
//!                    └──source/sink error, length mismatch──▶ Failed
//! ```
//! `Completed` and `Failed` are terminal; a terminal pipe delivers nothing.

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};

use crate::forward::error::{BoxError, TransferError, TransferResult};

/// Lifecycle of a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

impl PipeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipeState::Completed | PipeState::Failed)
    }
}

/// Single-use pipe over a chunk source.
pub struct Pipe<St> {
    source: Option<St>,
    state: PipeState,
    expected_length: Option<u64>,
    transferred: u64,
}

impl<St, E> Pipe<St>
where
    St: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    pub fn new(source: St) -> Self {
        Self {
            source: Some(source),
            state: PipeState::Idle,
            expected_length: None,
            transferred: 0,
        }
    }

    /// Require the source to produce exactly `length` bytes.
    pub fn expect_length(mut self, length: Option<u64>) -> Self {
        self.expected_length = length;
        self
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    /// Bytes accepted by the sink so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Drive the source into `sink` until a terminal state.
    ///
    /// Returns the number of bytes transferred. The completion fires once:
    /// calling this again returns [`TransferError::PipeClosed`] without
    /// touching the sink.
    pub async fn to<Si>(&mut self, sink: &mut Si) -> TransferResult<u64>
    where
        Si: Sink<Bytes> + Unpin,
        Si::Error: Into<BoxError>,
    {
        let Some(mut source) = self.source.take() else {
            return Err(TransferError::PipeClosed);
        };
        self.state = PipeState::Streaming;

        let outcome = self.stream(&mut source, sink).await;
        // Dropping the source is what stops an aborted upstream read.
        drop(source);

        match outcome {
            Ok(()) => {
                self.state = PipeState::Completed;
                tracing::trace!(bytes = self.transferred, "Pipe completed");
                Ok(self.transferred)
            }
            Err(err) => {
                self.state = PipeState::Failed;
                tracing::debug!(bytes = self.transferred, error = %err, "Pipe failed");
                Err(err)
            }
        }
    }

    async fn stream<Si>(&mut self, source: &mut St, sink: &mut Si) -> TransferResult<()>
    where
        Si: Sink<Bytes> + Unpin,
        Si::Error: Into<BoxError>,
    {
        while let Some(next) = source.next().await {
            let chunk = next.map_err(|e| TransferError::Source(e.into()))?;
            if chunk.is_empty() {
                continue;
            }
            let produced = self.transferred + chunk.len() as u64;
            if let Some(declared) = self.expected_length {
                if produced > declared {
                    return Err(TransferError::LengthMismatch { declared, produced });
                }
            }
            sink.feed(chunk)
                .await
                .map_err(|e| TransferError::Sink(e.into()))?;
            self.transferred = produced;
        }

        if let Some(declared) = self.expected_length {
            if self.transferred != declared {
                return Err(TransferError::LengthMismatch {
                    declared,
                    produced: self.transferred,
                });
            }
        }

        sink.close().await.map_err(|e| TransferError::Sink(e.into()))
    }
}
