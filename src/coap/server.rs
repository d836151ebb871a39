//! UDP receive loop with backpressure.
//!
//! # Responsibilities
//! - Receive datagrams on the bound socket
//! - Enforce `max_in_flight` via semaphore
//! - Run each datagram on its own task under the request deadline
//! - Answer duplicate requests from the exchange log instead of re-handling them
//! - Drain in-flight handlers on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

use crate::coap::dedup::{Admission, Deduplicator};
use crate::coap::handler::CoapHandler;
use crate::coap::message::{peek_header, MessageType};
use crate::config::GatewayConfig;
use crate::lookup::LookupService;
use crate::observability::metrics;

/// Largest datagram accepted.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// CoAP front-end.
pub struct CoapServer {
    handler: Arc<CoapHandler>,
    exchanges: Arc<Deduplicator>,
    in_flight: Arc<Semaphore>,
    max_in_flight: u32,
    request_timeout: Duration,
}

impl CoapServer {
    pub fn new(config: &GatewayConfig, service: Arc<LookupService>) -> Self {
        let max_in_flight = u32::try_from(config.coap.max_in_flight).unwrap_or(u32::MAX);
        Self {
            handler: Arc::new(CoapHandler::new(service, &config.coap)),
            exchanges: Arc::new(Deduplicator::new(
                config.coap.dedup_capacity,
                Duration::from_secs(config.coap.exchange_lifetime_secs),
            )),
            in_flight: Arc::new(Semaphore::new(max_in_flight as usize)),
            max_in_flight,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        }
    }

    /// Serve until the shutdown signal fires, then wait for in-flight handlers.
    pub async fn run(
        self,
        socket: UdpSocket,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let socket = Arc::new(socket);
        tracing::info!(address = %socket.local_addr()?, "CoAP server starting");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            // Acquire permit first (backpressure)
            let permit = tokio::select! {
                permit = self.in_flight.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.recv() => break,
            };

            let (len, peer) = tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!(error = %e, "UDP receive failed");
                        continue;
                    }
                },
                _ = shutdown.recv() => break,
            };

            let datagram = buf[..len].to_vec();
            let span = tracing::info_span!("coap_request", request_id = %Uuid::new_v4(), peer = %peer);
            let task = Exchange {
                handler: self.handler.clone(),
                exchanges: self.exchanges.clone(),
                socket: socket.clone(),
                peer,
                deadline: self.request_timeout,
            };
            tokio::spawn(
                async move {
                    let _permit = permit;
                    task.run(&datagram).await;
                }
                .instrument(span),
            );
        }

        tracing::info!("CoAP server draining");
        let drained = tokio::time::timeout(
            self.request_timeout,
            self.in_flight.acquire_many(self.max_in_flight),
        )
        .await;
        if drained.is_err() {
            tracing::warn!("CoAP handlers still running at shutdown deadline");
        }

        tracing::info!("CoAP server stopped");
        Ok(())
    }
}

/// One request/response exchange with a peer.
struct Exchange {
    handler: Arc<CoapHandler>,
    exchanges: Arc<Deduplicator>,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    deadline: Duration,
}

impl Exchange {
    async fn run(self, datagram: &[u8]) {
        let request = match peek_header(datagram) {
            Some((kind @ (MessageType::Confirmable | MessageType::NonConfirmable), id)) => {
                Some((kind, id))
            }
            _ => None,
        };

        if let Some((_, message_id)) = request {
            match self.exchanges.admit(self.peer, message_id) {
                Admission::Fresh => {}
                Admission::InProgress => {
                    tracing::debug!(message_id, "Duplicate of a request still in progress");
                    metrics::record_coap_dropped("duplicate");
                    return;
                }
                Admission::Replay(reply) => {
                    tracing::debug!(message_id, "Duplicate request, replaying response");
                    metrics::record_coap_dropped("duplicate");
                    if let Some(reply) = reply {
                        self.send(&reply).await;
                    }
                    return;
                }
            }
        }

        let reply: Option<Arc<[u8]>> =
            match tokio::time::timeout(self.deadline, self.handler.handle_datagram(datagram, self.peer)).await {
                Ok(reply) => reply.map(|message| message.encode().into()),
                Err(_) => {
                    // The requester has given up; a late answer would be stale.
                    tracing::warn!(timeout_secs = self.deadline.as_secs(), "Request deadline exceeded, dropping response");
                    metrics::record_deadline_exceeded("coap");
                    None
                }
            };

        if let Some((kind, message_id)) = request {
            // Duplicate NONs are dropped silently; only CONs get the reply again.
            let kept = reply.clone().filter(|_| kind == MessageType::Confirmable);
            self.exchanges.finish(self.peer, message_id, kept);
        }
        if let Some(reply) = reply {
            self.send(&reply).await;
        }
    }

    async fn send(&self, reply: &[u8]) {
        if let Err(e) = self.socket.send_to(reply, self.peer).await {
            tracing::warn!(error = %e, "Failed to send CoAP response");
        }
    }
}
