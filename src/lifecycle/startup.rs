//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared lookup pipeline from configuration
//! - Bind every enabled listener before serving anything
//! - Run the front-ends until shutdown, then drain them
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when ready)

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinSet;

use crate::coap::CoapServer;
use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::lookup::{FetcherBuildError, LookupService};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] FetcherBuildError),

    #[error("failed to bind {transport} listener on {address}: {source}")]
    Bind {
        transport: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("failed to start metrics endpoint: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// A gateway with every enabled listener bound and ready to serve.
pub struct Gateway {
    http: Option<(HttpServer, TcpListener)>,
    coap: Option<(CoapServer, UdpSocket)>,
    shutdown: Shutdown,
}

impl Gateway {
    /// Build subsystems and bind listeners.
    pub async fn bind(config: GatewayConfig) -> Result<Self, StartupError> {
        if config.observability.metrics_enabled {
            let addr: SocketAddr = config
                .observability
                .metrics_address
                .parse()
                .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
            metrics::init_metrics(addr)?;
        }

        let service = Arc::new(LookupService::new(&config.upstream)?);
        tracing::info!(upstream = %config.upstream.base_url, "Lookup pipeline ready");

        let http = if config.http.enabled {
            let listener = TcpListener::bind(&config.http.bind_address)
                .await
                .map_err(|source| StartupError::Bind {
                    transport: "http",
                    address: config.http.bind_address.clone(),
                    source,
                })?;
            Some((HttpServer::new(&config, service.clone()), listener))
        } else {
            None
        };

        let coap = if config.coap.enabled {
            let socket = UdpSocket::bind(&config.coap.bind_address)
                .await
                .map_err(|source| StartupError::Bind {
                    transport: "coap",
                    address: config.coap.bind_address.clone(),
                    source,
                })?;
            Some((CoapServer::new(&config, service), socket))
        } else {
            None
        };

        Ok(Self {
            http,
            coap,
            shutdown: Shutdown::new(),
        })
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|(_, l)| l.local_addr().ok())
    }

    pub fn coap_addr(&self) -> Option<SocketAddr> {
        self.coap.as_ref().and_then(|(_, s)| s.local_addr().ok())
    }

    /// Serve until `stop` resolves or a front-end fails, then drain both.
    pub async fn run(self, stop: impl Future<Output = ()>) -> Result<(), std::io::Error> {
        let mut servers = JoinSet::new();
        if let Some((server, listener)) = self.http {
            servers.spawn(server.run(listener, self.shutdown.subscribe()));
        }
        if let Some((server, socket)) = self.coap {
            servers.spawn(server.run(socket, self.shutdown.subscribe()));
        }

        let mut outcome = Ok(());
        tokio::select! {
            _ = stop => {}
            Some(joined) = servers.join_next() => {
                outcome = flatten(joined);
                tracing::error!("Front-end exited early, shutting down");
            }
        }

        let draining = self.shutdown.trigger();
        tracing::info!(front_ends = draining, "Draining front-ends");
        while let Some(joined) = servers.join_next().await {
            if let Err(e) = flatten(joined) {
                tracing::error!(error = %e, "Front-end failed during shutdown");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }
}

fn flatten(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), std::io::Error> {
    joined.map_err(std::io::Error::other)?
}
