//! Response body model.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};

use crate::forward::error::BoxError;

/// Lazy, single-pass stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// A response body: a byte stream, its length when known, and an advisory
/// media type.
///
/// When the length is known the stream must produce exactly that many bytes;
/// the pipeline fails the transfer otherwise.
pub struct Body {
    stream: BodyStream,
    length: Option<u64>,
    media_type: Option<String>,
}

impl Body {
    /// Wrap any fallible chunk stream.
    pub fn new<S, E>(stream: S, length: Option<u64>, media_type: Option<String>) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            stream: Box::pin(stream.map_err(Into::<BoxError>::into)),
            length,
            media_type,
        }
    }

    /// Body with fully known content.
    pub fn from_bytes(content: impl Into<Bytes>, media_type: Option<String>) -> Self {
        let content = content.into();
        let length = Some(content.len() as u64);
        let chunks = stream::iter((!content.is_empty()).then_some(Ok::<_, BoxError>(content)));
        Self {
            stream: chunks.boxed(),
            length,
            media_type,
        }
    }

    /// Zero-length body (distinct from having no body at all).
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new(), None)
    }

    /// Exact byte count, `None` when unknown.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// Consume the body, yielding its stream.
    pub fn into_stream(self) -> BodyStream {
        self.stream
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("length", &self.length)
            .field("media_type", &self.media_type)
            .finish_non_exhaustive()
    }
}
