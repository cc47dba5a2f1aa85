//! Response forwarding for an HTTP reverse proxy.
//!
//! Turns one received origin response into one response toward the client:
//! header rewriting, caching metadata, and the choice between fixed-length,
//! chunked and fully buffered body transfer.

pub mod config;
pub mod forward;
pub mod http;
pub mod observability;

pub use crate::config::schema::ForwardConfig;
pub use crate::forward::{ProxyResponse, TransferError};
pub use crate::http::ForwardServer;
