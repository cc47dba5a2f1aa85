//! Response model and send path.
//!
//! # Data Flow
//! ```text
//! OriginResponse
//!     → ProxyResponse::from_origin (copy headers, derive CacheMetadata,
//!       wrap the origin stream as Body)
//!     → [caller may change status, headers, body]
//!     → send(): rewrite headers → select TransferStrategy
//!         Empty    → close
//!         Fixed    → Pipe (length enforced)
//!         Chunked  → Pipe
//!         Buffered → Pipe into BufferingSink → one fixed-length write
//!     → success: release origin | failure: reset sink + request, abort origin
//! ```

use std::fmt;
use std::time::{Instant, SystemTime};

use futures::SinkExt;
use http::{header, HeaderName, HeaderValue, Version};

use crate::forward::body::Body;
use crate::forward::buffer::BufferingSink;
use crate::forward::error::{TransferError, TransferResult};
use crate::forward::exchange::{ClientSink, InboundRequest};
use crate::forward::metadata::CacheMetadata;
use crate::forward::origin::{OriginHandle, OriginResponse};
use crate::forward::pipe::Pipe;
use crate::forward::rewrite::rewrite;
use crate::http::headers::Headers;
use crate::observability::metrics;

/// How the body reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// No entity. `declare_zero_length` echoes `Content-Length: 0`.
    Empty { declare_zero_length: bool },
    /// Known length, streamed with `Content-Length`.
    Fixed(u64),
    /// Unknown length toward an HTTP/1.0 client: buffer, then send.
    Buffered,
    /// Unknown length, chunked framing.
    Chunked,
}

impl TransferStrategy {
    pub fn select(body: Option<&Body>, client: Version, origin_declared_length: bool) -> Self {
        let Some(body) = body else {
            return TransferStrategy::Empty {
                declare_zero_length: origin_declared_length,
            };
        };
        match body.length() {
            Some(length) => TransferStrategy::Fixed(length),
            None if client == Version::HTTP_10 => TransferStrategy::Buffered,
            None => TransferStrategy::Chunked,
        }
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStrategy::Empty { .. } => "empty",
            TransferStrategy::Fixed(_) => "fixed",
            TransferStrategy::Buffered => "buffered",
            TransferStrategy::Chunked => "chunked",
        }
    }
}

/// A response on its way to the client.
pub struct ProxyResponse {
    request: Box<dyn InboundRequest>,
    sink: Box<dyn ClientSink>,
    status_code: u16,
    status_message: Option<String>,
    headers: Headers,
    body: Option<Body>,
    metadata: CacheMetadata,
    origin: Option<OriginHandle>,
    buffer_limit: Option<usize>,
    entity_suppressed: bool,
}

impl ProxyResponse {
    /// Empty, locally generated response (status 200, no headers, no body).
    pub fn new(request: Box<dyn InboundRequest>, sink: Box<dyn ClientSink>) -> Self {
        Self {
            request,
            sink,
            status_code: 200,
            status_message: None,
            headers: Headers::new(),
            body: None,
            metadata: CacheMetadata::default(),
            origin: None,
            buffer_limit: None,
            entity_suppressed: false,
        }
    }

    /// Response mirroring what the origin sent.
    ///
    /// A malformed `Content-Length` leaves the body length unknown but still
    /// counts as declared.
    pub fn from_origin(
        request: Box<dyn InboundRequest>,
        sink: Box<dyn ClientSink>,
        origin: OriginResponse,
    ) -> Self {
        let (status_code, status_message, headers, stream) = origin.into_parts();

        let declared_length = headers.contains("content-length");
        let length = headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        if declared_length && length.is_none() {
            tracing::debug!("Ignoring malformed Content-Length from origin");
        }
        let media_type = headers.get("content-type").map(str::to_string);
        let metadata = CacheMetadata::from_headers(&headers);

        let (handle, stream) = OriginHandle::attach(stream, declared_length);
        let body = Body::new(stream, length, media_type);

        Self {
            status_code,
            status_message,
            headers,
            body: Some(body),
            metadata,
            origin: Some(handle),
            ..Self::new(request, sink)
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn set_status_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Set a header, replacing any existing values.
    pub fn put_header<N, V>(&mut self, name: N, value: V) -> &mut Self
    where
        N: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        self.headers.set(name, value);
        self
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Replace the body. The origin stream stays owned by the response and is
    /// drained once the response is sent or released.
    pub fn set_body(&mut self, body: Option<Body>) -> &mut Self {
        self.body = body;
        self
    }

    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Send the head as if the body were transferred, but no entity bytes.
    ///
    /// For exchanges that never carry an entity (HEAD, 304): the framing
    /// headers still describe the body, so a declared length is kept.
    pub fn suppress_entity(&mut self) -> &mut Self {
        self.entity_suppressed = true;
        self
    }

    /// Cap the memory used to buffer bodies for HTTP/1.0 clients.
    pub fn set_buffer_limit(&mut self, limit: Option<usize>) -> &mut Self {
        self.buffer_limit = limit;
        self
    }

    pub fn public_cache_control(&self) -> bool {
        self.metadata.public_cache_control
    }

    /// Freshness lifetime in milliseconds.
    pub fn max_age(&self) -> Option<i64> {
        self.metadata.max_age
    }

    pub fn etag(&self) -> Option<&str> {
        self.metadata.etag.as_deref()
    }

    pub fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    /// Protocol version of the client this response answers.
    pub fn client_version(&self) -> Version {
        self.request.version()
    }

    /// Whether an origin stream is still attached and unfinished.
    pub fn has_live_origin(&self) -> bool {
        self.origin.as_ref().is_some_and(OriginHandle::is_live)
    }

    /// Discard without sending.
    ///
    /// Drains the origin stream so its connection is not left paused, then
    /// clears headers, body and cache metadata. Calling it again clears
    /// whatever was set since and leaves the drained origin alone.
    pub fn release(&mut self) -> &mut Self {
        if let Some(mut origin) = self.origin.take() {
            origin.release();
        }
        self.body = None;
        self.headers.clear();
        self.metadata = CacheMetadata::default();
        self
    }

    /// Send the response to the client.
    ///
    /// On failure both the client sink and the inbound request have been reset
    /// before the error is returned.
    pub async fn send(mut self) -> TransferResult<()> {
        let started = Instant::now();
        let body = self.body.take();
        let origin_declared_length = self.origin.as_ref().is_some_and(OriginHandle::declared_length);
        let strategy =
            TransferStrategy::select(body.as_ref(), self.request.version(), origin_declared_length);

        self.sink.set_status_code(self.status_code);
        if let Some(message) = &self.status_message {
            self.sink.set_status_message(message);
        }
        let outbound = rewrite(&self.headers, body.is_some(), SystemTime::now());
        self.sink.headers_mut().extend(outbound);

        tracing::debug!(
            status = self.status_code,
            strategy = strategy.as_str(),
            "Sending response"
        );

        let outcome = match body {
            None => self.send_empty(strategy).await,
            Some(body) if self.entity_suppressed => self.send_head_only(strategy, body).await,
            Some(body) => self.send_body(strategy, body).await,
        };

        match outcome {
            Ok(bytes) => {
                if let Some(mut origin) = self.origin.take() {
                    origin.release();
                }
                metrics::record_transfer(strategy.as_str(), "success", bytes, started);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    status = self.status_code,
                    strategy = strategy.as_str(),
                    error = %err,
                    "Response transfer failed, resetting both ends"
                );
                self.sink.reset();
                self.request.reset();
                if let Some(mut origin) = self.origin.take() {
                    origin.abort();
                }
                metrics::record_transfer(strategy.as_str(), "failure", 0, started);
                Err(err)
            }
        }
    }

    async fn send_empty(&mut self, strategy: TransferStrategy) -> TransferResult<u64> {
        let headers = self.sink.headers_mut();
        match strategy {
            TransferStrategy::Empty {
                declare_zero_length: true,
            } => {
                headers.set("content-length", "0");
            }
            _ => {
                headers.remove("content-length");
            }
        }
        self.sink
            .close()
            .await
            .map_err(TransferError::Sink)?;
        Ok(0)
    }

    async fn send_head_only(&mut self, strategy: TransferStrategy, body: Body) -> TransferResult<u64> {
        let headers = self.sink.headers_mut();
        if let Some(media_type) = body.media_type() {
            headers.set(header::CONTENT_TYPE, media_type);
        }
        match strategy {
            TransferStrategy::Fixed(size) => {
                headers.set(header::CONTENT_LENGTH, HeaderValue::from(size));
            }
            _ => {
                headers.remove("content-length");
            }
        }
        // The origin handle still owns the stream; it is drained on success.
        drop(body);
        self.sink.close().await.map_err(TransferError::Sink)?;
        Ok(0)
    }

    async fn send_body(&mut self, strategy: TransferStrategy, body: Body) -> TransferResult<u64> {
        if let Some(media_type) = body.media_type() {
            self.sink.headers_mut().set("content-type", media_type);
        }
        let length = body.length();
        let stream = body.into_stream();

        match strategy {
            TransferStrategy::Buffered => {
                self.sink.headers_mut().remove("content-length");
                let mut buffer = BufferingSink::with_limit(self.buffer_limit);
                Pipe::new(stream).to(&mut buffer).await?;
                let content = buffer
                    .into_content()
                    .map_err(|e| TransferError::Sink(e.into()))?;

                let size = content.len() as u64;
                self.sink
                    .headers_mut()
                    .set("content-length", size.to_string());
                if !content.is_empty() {
                    self.sink.feed(content).await.map_err(TransferError::Sink)?;
                }
                self.sink.close().await.map_err(TransferError::Sink)?;
                Ok(size)
            }
            TransferStrategy::Chunked => {
                self.sink.headers_mut().remove("content-length");
                self.sink.set_chunked(true);
                Pipe::new(stream).to(&mut self.sink).await
            }
            TransferStrategy::Fixed(size) => {
                self.sink
                    .headers_mut()
                    .set("content-length", size.to_string());
                Pipe::new(stream)
                    .expect_length(length)
                    .to(&mut self.sink)
                    .await
            }
            TransferStrategy::Empty { .. } => self.send_empty(strategy).await,
        }
    }
}

impl fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status_code", &self.status_code)
            .field("status_message", &self.status_message)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("metadata", &self.metadata)
            .field("entity_suppressed", &self.entity_suppressed)
            .finish_non_exhaustive()
    }
}
