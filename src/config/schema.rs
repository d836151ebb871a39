//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP front-end.
    pub http: HttpConfig,

    /// CoAP (UDP) front-end.
    pub coap: CoapConfig,

    /// Upstream element-set provider.
    pub upstream: UpstreamConfig,

    /// Inbound request deadlines.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Serve the HTTP front-end.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// CoAP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoapConfig {
    /// Serve the CoAP front-end.
    pub enabled: bool,

    /// UDP bind address (e.g., "0.0.0.0:5683").
    pub bind_address: String,

    /// Maximum datagrams handled concurrently (backpressure).
    pub max_in_flight: usize,

    /// Largest payload sent in a single response before switching to
    /// block-wise transfer. Power of two between 16 and 1024.
    pub block_size: usize,

    /// How long a request's message id is remembered for deduplication.
    pub exchange_lifetime_secs: u64,

    /// Maximum remembered message ids.
    pub dedup_capacity: usize,

    /// How long a block-wise response is kept for follow-up block requests.
    pub transfer_lifetime_secs: u64,

    /// Maximum block-wise responses kept at once.
    pub transfer_capacity: usize,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:5683".to_string(),
            max_in_flight: 1024,
            block_size: 1024,
            exchange_lifetime_secs: 247,
            dedup_capacity: 4096,
            transfer_lifetime_secs: 60,
            transfer_capacity: 64,
        }
    }
}

/// Upstream provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// GP query endpoint; query parameters are appended per request.
    pub base_url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time allowed for one upstream call in seconds.
    pub timeout_secs: u64,

    /// User-Agent sent upstream.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://celestrak.org/NORAD/elements/gp.php".to_string(),
            connect_timeout_secs: 5,
            timeout_secs: 30,
            user_agent: concat!("tle-forwarder/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 35 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
