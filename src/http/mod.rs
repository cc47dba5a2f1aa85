//! HTTP protocol pieces and the forwarding server.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum handler, hyper client toward the upstream)
//!     → adapter.rs (hyper response → OriginResponse)
//!     → [forward engine: rewrite, strategy, pipe]
//!     → adapter.rs (ChannelSink → axum response head + streamed body)
//!     → Send to client
//! ```
//!
//! headers.rs, date.rs and cache_control.rs are the protocol vocabulary the
//! engine works with; they do not depend on any HTTP stack.

pub mod adapter;
pub mod cache_control;
pub mod date;
pub mod headers;
pub mod server;

pub use cache_control::CacheControl;
pub use headers::Headers;
pub use server::ForwardServer;
