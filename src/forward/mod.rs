//! Response forwarding engine.
//!
//! # Data Flow
//! ```text
//! OriginResponse (status, headers, body stream)
//!     → response.rs (ProxyResponse: model + cache metadata from metadata.rs)
//!     → rewrite.rs (outbound headers, at send time)
//!     → response.rs (TransferStrategy)
//!         → pipe.rs (stream with backpressure)           fixed / chunked
//!         → buffer.rs then a single write                HTTP/1.0, unknown length
//!     → exchange.rs (ClientSink toward the client)
//!
//! On failure: ClientSink::reset + InboundRequest::reset + origin abort
//! On release: origin.rs drains the upstream stream
//! ```
//!
//! # Design Decisions
//! - The engine is transport agnostic; collaborators plug in through the
//!   traits in exchange.rs
//! - One response is owned by one task; nothing is shared between responses
//! - Transfer errors always reach the caller of `send`

pub mod body;
pub mod buffer;
pub mod error;
pub mod exchange;
pub mod metadata;
pub mod origin;
pub mod pipe;
pub mod response;
pub mod rewrite;

pub use body::{Body, BodyStream};
pub use buffer::{BufferError, BufferingSink};
pub use error::{BoxError, TransferError, TransferResult};
pub use exchange::{ClientSink, InboundRequest};
pub use metadata::CacheMetadata;
pub use origin::{OriginHandle, OriginResponse, OriginStream};
pub use pipe::{Pipe, PipeState};
pub use response::{ProxyResponse, TransferStrategy};
