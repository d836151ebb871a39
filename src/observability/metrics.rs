//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tle_lookups_total` (counter): lookups by transport and outcome
//! - `tle_lookup_duration_seconds` (histogram): pipeline latency by transport
//! - `tle_coap_dropped_total` (counter): datagrams answered with RST or ignored
//! - `tle_request_deadline_exceeded_total` (counter): responses abandoned at the deadline
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - The Prometheus listener is optional and off by default

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lookup::Outcome;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one completed lookup.
pub fn record_lookup(transport: &'static str, outcome: Outcome, start: Instant) {
    counter!("tle_lookups_total", "transport" => transport, "outcome" => outcome.as_str())
        .increment(1);
    histogram!("tle_lookup_duration_seconds", "transport" => transport)
        .record(start.elapsed().as_secs_f64());
}

/// Record a datagram that did not produce a lookup.
pub fn record_coap_dropped(reason: &'static str) {
    counter!("tle_coap_dropped_total", "reason" => reason).increment(1);
}

/// Record a request whose response was abandoned at the deadline.
pub fn record_deadline_exceeded(transport: &'static str) {
    counter!("tle_request_deadline_exceeded_total", "transport" => transport).increment(1);
}
