//! Seams to the surrounding proxy: the client-facing sink and the inbound
//! request.
//!
//! The engine never talks to sockets. The connection layer implements these
//! traits, `http::adapter` provides the hyper/axum implementation.

use bytes::Bytes;
use futures::Sink;
use http::Version;

use crate::forward::error::BoxError;
use crate::http::headers::Headers;

/// Response sink toward the original client.
///
/// Status, message, chunking and headers must be set before the first chunk is
/// written; implementations commit the head on the first `start_send` or on
/// `poll_close`. Closing the sink is the graceful end of the response.
/// Backpressure is expressed through `poll_ready`.
pub trait ClientSink: Sink<Bytes, Error = BoxError> + Send + Unpin {
    fn set_status_code(&mut self, code: u16);

    fn set_status_message(&mut self, message: &str);

    /// Outbound headers, appended to by the engine.
    fn headers_mut(&mut self) -> &mut Headers;

    /// Use chunked framing for a body of unknown length.
    fn set_chunked(&mut self, chunked: bool);

    /// Abort the response: the client must not see it as complete.
    fn reset(&mut self);
}

/// The request being answered.
pub trait InboundRequest: Send {
    /// Protocol version negotiated with the client.
    fn version(&self) -> Version;

    /// Abort the upstream fetch serving this request.
    fn reset(&mut self);
}
