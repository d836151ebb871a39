//! TLE Forwarder
//!
//! A dual-transport gateway for two-line element set lookups.
//!
//! # Architecture Overview
//!
//! ```text
//!     CoAP datagram ──▶ coap::server ──▶ coap::handler ─┐
//!                                                        │
//!                                                        ▼
//!                                              ┌──────────────────┐         ┌──────────┐
//!                                              │  lookup pipeline │────────▶│ upstream │
//!                                              │ query → fetch →  │◀────────│ GP query │
//!                                              │    translate     │         └──────────┘
//!                                              └──────────────────┘
//!                                                        ▲
//!                                                        │
//!     HTTP request  ──▶ http::server ──▶ http::handlers ─┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use tle_forwarder::config::{self, GatewayConfig};
use tle_forwarder::lifecycle::{wait_for_signal, Gateway};
use tle_forwarder::observability::logging;

#[derive(Parser)]
#[command(name = "tle-forwarder")]
#[command(about = "CoAP and HTTP gateway for TLE lookups", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override http.bind_address.
    #[arg(long)]
    http_addr: Option<String>,

    /// Override coap.bind_address.
    #[arg(long)]
    coap_addr: Option<String>,

    /// Override upstream.base_url.
    #[arg(long)]
    upstream_url: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<GatewayConfig, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => GatewayConfig::default(),
        };
        if let Some(addr) = &self.http_addr {
            config.http.bind_address = addr.clone();
        }
        if let Some(addr) = &self.coap_addr {
            config.coap.bind_address = addr.clone();
        }
        if let Some(url) = &self.upstream_url {
            config.upstream.base_url = url.clone();
        }
        config::validate_config(&config).map_err(config::ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tle-forwarder: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tle-forwarder starting");

    let gateway = match Gateway::bind(config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    if let Some(addr) = gateway.http_addr() {
        tracing::info!("Try: curl 'http://{addr}/tle?satellite_id=25544'");
    }
    if let Some(addr) = gateway.coap_addr() {
        tracing::info!("Try: coap://{addr}/tle?satellite_id=25544");
    }

    match gateway.run(wait_for_signal()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
