//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ForwardConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use ::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::ForwardConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("upstream.address {0:?} is not a valid authority")]
    UpstreamAddress(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &ForwardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    let upstream = &config.upstream.address;
    if upstream.is_empty() || upstream.parse::<Authority>().is_err() {
        errors.push(ValidationError::UpstreamAddress(upstream.clone()));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "upstream.connect_timeout_secs",
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.request_secs",
        });
    }
    if config.forwarding.channel_capacity == 0 {
        errors.push(ValidationError::Zero {
            field: "forwarding.channel_capacity",
        });
    }
    if config.forwarding.http10_buffer_limit == Some(0) {
        errors.push(ValidationError::Zero {
            field: "forwarding.http10_buffer_limit",
        });
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ForwardConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ForwardConfig::default();
        config.listener.bind_address = "localhost".into();
        config.upstream.address = "".into();
        config.timeouts.request_secs = 0;
        config.forwarding.channel_capacity = 0;
        config.forwarding.http10_buffer_limit = Some(0);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::BindAddress("localhost".into())));
        assert!(errors.contains(&ValidationError::Zero {
            field: "timeouts.request_secs"
        }));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ForwardConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::MetricsAddress("nope".into())])
        );
    }
}
