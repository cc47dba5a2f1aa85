//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! forward::* and http::*
//!     → logging.rs (tracing events with structured fields)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
