//! Bridges between hyper/axum and the forwarding engine.
//!
//! # Responsibilities
//! - Wrap a hyper client response as an [`OriginResponse`]
//! - Provide a [`ClientSink`] backed by a bounded channel whose receiving side
//!   becomes the axum response body
//! - Provide the [`InboundRequest`] for a proxied exchange, able to cancel
//!   the request body still being uploaded
//!
//! # Design Decisions
//! - The head is handed over through a oneshot on the first write or on close,
//!   so the handler answers as soon as the engine committed it
//! - Channel capacity is the backpressure window toward the client
//! - A reset after the head ends the body stream with an error: hyper then
//!   aborts the client connection instead of terminating the body cleanly

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use ::http::{header, StatusCode, Version};
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::AbortHandle;
use futures::stream::{self, StreamExt};
use futures::{Sink, Stream};
use hyper::body::Body as _;
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use tokio::sync::oneshot;

use crate::forward::error::BoxError;
use crate::forward::exchange::{ClientSink, InboundRequest};
use crate::forward::origin::OriginResponse;
use crate::http::headers::Headers;
use crate::observability::metrics;

/// Wrap a response received by the hyper client.
pub fn origin_from_hyper(response: ::http::Response<Incoming>) -> OriginResponse {
    let (parts, body) = response.into_parts();
    let message = parts
        .extensions
        .get::<ReasonPhrase>()
        .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
        .or_else(|| parts.status.canonical_reason())
        .map(str::to_string);
    let headers = Headers::from_header_map(&parts.headers);
    OriginResponse::new(
        parts.status.as_u16(),
        message,
        headers,
        Body::new(body).into_data_stream(),
    )
}

/// Status line and headers committed by a [`ChannelSink`].
#[derive(Debug, Default)]
pub struct ResponseHead {
    pub status: u16,
    pub message: Option<String>,
    pub headers: Headers,
    pub chunked: bool,
}

impl ResponseHead {
    /// Build the axum response carrying `body`.
    pub fn into_response(self, body: ForwardedBody) -> Response {
        let Ok(status) = StatusCode::from_u16(self.status) else {
            tracing::warn!(status = self.status, "Upstream status is not representable");
            return (StatusCode::BAD_GATEWAY, "Invalid upstream status").into_response();
        };

        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = status;
        let map = response.headers_mut();
        for (name, value) in self.headers {
            if self.chunked && name == header::CONTENT_LENGTH {
                continue;
            }
            map.append(name, value);
        }

        if let Some(message) = self
            .message
            .filter(|message| status.canonical_reason() != Some(message.as_str()))
        {
            match ReasonPhrase::try_from(message.into_bytes()) {
                Ok(reason) => {
                    response.extensions_mut().insert(reason);
                }
                Err(_) => tracing::debug!("Dropping invalid reason phrase"),
            }
        }
        response
    }
}

/// Client sink writing into a bounded channel.
pub struct ChannelSink {
    head: ResponseHead,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: Option<mpsc::Sender<Bytes>>,
    aborted: Arc<AtomicBool>,
}

/// Create a sink, the receiver of its head, and its body stream.
pub fn channel_sink(
    capacity: usize,
) -> (ChannelSink, oneshot::Receiver<ResponseHead>, ForwardedBody) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity);
    let aborted = Arc::new(AtomicBool::new(false));
    let sink = ChannelSink {
        head: ResponseHead {
            status: 200,
            ..ResponseHead::default()
        },
        head_tx: Some(head_tx),
        body_tx: Some(body_tx),
        aborted: aborted.clone(),
    };
    let body = ForwardedBody {
        rx: body_rx,
        aborted,
        done: false,
    };
    (sink, head_rx, body)
}

impl ChannelSink {
    fn commit_head(&mut self) {
        if let Some(tx) = self.head_tx.take() {
            let head = std::mem::take(&mut self.head);
            if tx.send(head).is_err() {
                tracing::debug!("Client went away before the response head was sent");
            }
        }
    }
}

fn client_gone() -> BoxError {
    io::Error::new(io::ErrorKind::BrokenPipe, "client connection closed").into()
}

impl Sink<Bytes> for ChannelSink {
    type Error = BoxError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.get_mut().body_tx.as_mut() {
            Some(tx) => tx.poll_ready(cx).map_err(|_| client_gone()),
            None => Poll::Ready(Err(client_gone())),
        }
    }

    fn start_send(self: Pin<&mut Self>, chunk: Bytes) -> Result<(), Self::Error> {
        let this = self.get_mut();
        this.commit_head();
        match this.body_tx.as_mut() {
            Some(tx) => tx.start_send(chunk).map_err(|_| client_gone()),
            None => Err(client_gone()),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.get_mut().body_tx.as_mut() {
            Some(tx) => Pin::new(tx).poll_flush(cx).map_err(|_| client_gone()),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        this.commit_head();
        if let Some(tx) = this.body_tx.as_mut() {
            ready!(Pin::new(tx).poll_close(cx)).map_err(|_| client_gone())?;
        }
        this.body_tx = None;
        Poll::Ready(Ok(()))
    }
}

impl ClientSink for ChannelSink {
    fn set_status_code(&mut self, code: u16) {
        self.head.status = code;
    }

    fn set_status_message(&mut self, message: &str) {
        self.head.message = Some(message.to_string());
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.head.headers
    }

    fn set_chunked(&mut self, chunked: bool) {
        self.head.chunked = chunked;
    }

    fn reset(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
        // Without a head the handler answers 502 itself.
        self.head_tx = None;
        self.body_tx = None;
    }
}

/// Body stream of a forwarded response.
pub struct ForwardedBody {
    rx: mpsc::Receiver<Bytes>,
    aborted: Arc<AtomicBool>,
    done: bool,
}

impl Stream for ForwardedBody {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match ready!(Pin::new(&mut this.rx).poll_next(cx)) {
            Some(chunk) => Poll::Ready(Some(Ok(chunk))),
            None => {
                this.done = true;
                if this.aborted.load(Ordering::SeqCst) {
                    Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "response transfer was reset",
                    ))))
                } else {
                    Poll::Ready(None)
                }
            }
        }
    }
}

/// Wrap a request body for the upstream so it can be cancelled.
///
/// After an abort the upload ends with an error, so the upstream never takes
/// a truncated body for a complete one. Bodies that are already finished are
/// sent as-is.
pub fn abortable_upload(body: Body) -> (Body, AbortHandle) {
    if body.is_end_stream() {
        let (handle, _registration) = AbortHandle::new_pair();
        return (Body::empty(), handle);
    }
    let (upload, handle) = stream::abortable(body.into_data_stream());
    let watcher = handle.clone();
    let tail = stream::once(async move { watcher.is_aborted() }).filter_map(|aborted| async move {
        aborted.then(|| {
            Err::<Bytes, _>(axum::Error::new(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "upstream exchange was reset",
            )))
        })
    });
    (Body::from_stream(upload.chain(tail)), handle)
}

/// The client request a forwarded response answers.
///
/// Resetting it cancels the request body upload; the upstream response side
/// is torn down when the engine aborts the origin stream.
#[derive(Debug)]
pub struct ClientExchange {
    version: Version,
    upstream: String,
    upload: AbortHandle,
}

impl ClientExchange {
    pub fn new(version: Version, upstream: impl Into<String>, upload: AbortHandle) -> Self {
        Self {
            version,
            upstream: upstream.into(),
            upload,
        }
    }
}

impl InboundRequest for ClientExchange {
    fn version(&self) -> Version {
        self.version
    }

    fn reset(&mut self) {
        self.upload.abort();
        tracing::debug!(upstream = %self.upstream, version = ?self.version, "Upstream exchange reset");
        metrics::record_exchange_reset();
    }
}
