//! Origin response handle.
//!
//! # Responsibilities
//! - Carry the received origin status line, headers and body stream
//! - Keep an owned handle on the body stream after it was wrapped as a
//!   [`Body`](crate::forward::body::Body), so an unsent response can still
//!   give the upstream connection back
//!
//! # Design Decisions
//! - The body stream is shared between the handle and the [`OriginStream`]
//!   handed to the body; whichever side ends it takes it out
//! - `release` drains the remainder on the current tokio runtime so the
//!   upstream connection is never left paused; `abort` drops it unread
//! - Both are idempotent and must be called explicitly on every exit path

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};

use crate::forward::body::BodyStream;
use crate::forward::error::BoxError;
use crate::http::headers::Headers;
use crate::observability::metrics;

/// A response received from the origin server.
pub struct OriginResponse {
    status_code: u16,
    status_message: Option<String>,
    headers: Headers,
    stream: BodyStream,
}

impl OriginResponse {
    pub fn new<S, E>(
        status_code: u16,
        status_message: Option<String>,
        headers: Headers,
        stream: S,
    ) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            status_code,
            status_message,
            headers,
            stream: Box::pin(stream.map_err(Into::<BoxError>::into)),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub(crate) fn into_parts(self) -> (u16, Option<String>, Headers, BodyStream) {
        (self.status_code, self.status_message, self.headers, self.stream)
    }
}

type SharedStream = Arc<Mutex<Option<BodyStream>>>;

/// Owned handle on the origin body stream.
pub struct OriginHandle {
    shared: Option<SharedStream>,
    declared_length: bool,
}

impl OriginHandle {
    /// Split a body stream into the handle and the readable side.
    ///
    /// `declared_length` records whether the origin sent a `Content-Length`.
    pub fn attach(stream: BodyStream, declared_length: bool) -> (Self, OriginStream) {
        let shared = Arc::new(Mutex::new(Some(stream)));
        let handle = Self {
            shared: Some(shared.clone()),
            declared_length,
        };
        (handle, OriginStream { shared })
    }

    /// Whether the origin response declared a `Content-Length`.
    pub fn declared_length(&self) -> bool {
        self.declared_length
    }

    /// True while the handle still owns a stream that has not ended.
    pub fn is_live(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| lock(shared).is_some())
    }

    /// Give the connection back: drain whatever is left, then forget the
    /// stream. No-op once released or aborted.
    pub fn release(&mut self) {
        let Some(stream) = self.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(drain(stream));
                metrics::record_release("drained");
            }
            Err(_) => {
                tracing::debug!("No runtime to drain the origin stream, dropping it");
                metrics::record_release("dropped");
            }
        }
    }

    /// Drop the stream unread, tearing the upstream connection down.
    pub fn abort(&mut self) {
        if self.take().is_some() {
            tracing::debug!("Origin stream aborted");
            metrics::record_release("aborted");
        }
    }

    fn take(&mut self) -> Option<BodyStream> {
        let shared = self.shared.take()?;
        let stream = lock(&shared).take();
        stream
    }
}

async fn drain(mut stream: BodyStream) {
    let mut drained = 0u64;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => drained += chunk.len() as u64,
            Err(err) => {
                tracing::debug!(error = %err, drained, "Origin stream failed while draining");
                return;
            }
        }
    }
    tracing::trace!(drained, "Origin stream drained");
}

fn lock(shared: &SharedStream) -> std::sync::MutexGuard<'_, Option<BodyStream>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Readable side of the origin body. Ends early if the handle took the
/// stream away.
pub struct OriginStream {
    shared: SharedStream,
}

impl Stream for OriginStream {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut slot = lock(&self.shared);
        let Some(stream) = slot.as_mut() else {
            return Poll::Ready(None);
        };
        let next = stream.as_mut().poll_next(cx);
        if let Poll::Ready(None) = next {
            // Exhausted streams are not polled again, not even by a drain.
            *slot = None;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted(parts: usize, polled: Arc<AtomicUsize>) -> BodyStream {
        stream::iter(0..parts)
            .map(move |_| {
                polled.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(Bytes::from_static(b"x"))
            })
            .boxed()
    }

    #[tokio::test]
    async fn body_side_reads_the_stream() {
        let polled = Arc::new(AtomicUsize::new(0));
        let (handle, stream) = OriginHandle::attach(counted(3, polled.clone()), true);
        assert!(handle.declared_length());

        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(!handle.is_live());
    }

    #[tokio::test]
    async fn release_drains_the_remainder() {
        let polled = Arc::new(AtomicUsize::new(0));
        let (mut handle, mut stream) = OriginHandle::attach(counted(5, polled.clone()), false);
        stream.next().await.unwrap().unwrap();

        handle.release();
        assert!(!handle.is_live());
        assert!(stream.next().await.is_none());

        for _ in 0..50 {
            if polled.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(polled.load(Ordering::SeqCst), 5);

        // Second release is a no-op.
        handle.release();
    }

    #[tokio::test]
    async fn abort_drops_without_reading() {
        let polled = Arc::new(AtomicUsize::new(0));
        let (mut handle, mut stream) = OriginHandle::attach(counted(5, polled.clone()), false);

        handle.abort();
        handle.release();
        tokio::task::yield_now().await;
        assert_eq!(polled.load(Ordering::SeqCst), 0);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn release_without_runtime_drops_the_stream() {
        let polled = Arc::new(AtomicUsize::new(0));
        let (mut handle, _stream) = OriginHandle::attach(counted(2, polled.clone()), false);
        handle.release();
        assert!(!handle.is_live());
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wraps_foreign_error_types() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"x")),
            Err(std::io::Error::other("upstream reset")),
        ]);
        let origin = OriginResponse::new(200, None, Headers::new(), source);
        let (_, _, _, mut stream) = origin.into_parts();

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "upstream reset");
    }
}
