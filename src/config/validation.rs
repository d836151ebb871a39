//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse, block size)
//! - Reject configurations that would serve nothing
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream.base_url: '{value}' is not an absolute http(s) URL")]
    InvalidUpstreamUrl { value: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("coap.block_size: {0} is not a power of two between 16 and 1024")]
    InvalidBlockSize(usize),

    #[error("at least one of http or coap must be enabled")]
    NothingEnabled,
}

/// Check every semantic constraint and collect all violations.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.http.enabled && !config.coap.enabled {
        errors.push(ValidationError::NothingEnabled);
    }

    check_address(&mut errors, "http.bind_address", &config.http.bind_address);
    check_address(&mut errors, "coap.bind_address", &config.coap.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => errors.push(ValidationError::InvalidUpstreamUrl {
            value: config.upstream.base_url.clone(),
        }),
    }

    let positive = [
        ("upstream.connect_timeout_secs", config.upstream.connect_timeout_secs),
        ("upstream.timeout_secs", config.upstream.timeout_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("coap.max_in_flight", config.coap.max_in_flight as u64),
        ("coap.exchange_lifetime_secs", config.coap.exchange_lifetime_secs),
        ("coap.dedup_capacity", config.coap.dedup_capacity as u64),
        ("coap.transfer_lifetime_secs", config.coap.transfer_lifetime_secs),
        ("coap.transfer_capacity", config.coap.transfer_capacity as u64),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::ZeroValue { field });
        }
    }

    let block = config.coap.block_size;
    if !block.is_power_of_two() || !(16..=1024).contains(&block) {
        errors.push(ValidationError::InvalidBlockSize(block));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
