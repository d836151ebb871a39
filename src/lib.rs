//! TLE forwarding gateway library.
//!
//! Accepts orbital element-set lookups over CoAP and HTTP and answers each one
//! with a single call to an upstream GP data provider.

pub mod coap;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod lookup;
pub mod observability;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
pub use lookup::LookupService;
