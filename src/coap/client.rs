//! Minimal CoAP client: confirmable GET with Block2 reassembly.
//!
//! Used by `tle-cli` and the integration tests.

use std::time::Duration;

use thiserror::Error;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::time::Instant;

use crate::coap::message::{option, BlockOption, Code, Message, MessageType};
use crate::coap::server::MAX_DATAGRAM_SIZE;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("server rejected message {0} with RST")]
    Reset(u16),

    #[error("block-wise transfer interrupted with {0}")]
    Interrupted(Code),

    #[error("representation changed during block-wise transfer")]
    RepresentationChanged,
}

/// Reassembled response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapResponse {
    pub code: Code,
    pub payload: Vec<u8>,
}

impl CoapResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

pub struct CoapClient {
    socket: UdpSocket,
    timeout: Duration,
    next_message_id: u16,
}

impl CoapClient {
    /// Bind an ephemeral local socket connected to `server`.
    pub async fn connect(server: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let server = tokio::net::lookup_host(server).await?.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "server address did not resolve")
        })?;
        let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;
        Ok(Self {
            socket,
            timeout: Duration::from_secs(30),
            next_message_id: rand::random(),
        })
    }

    /// Time allowed for each individual exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// GET `path` with the given `key=value` query tokens, following Block2
    /// until the whole payload has been received. A transfer whose later
    /// blocks change code or ETag is an error, never a stitched body.
    pub async fn get(&mut self, path: &str, queries: &[String]) -> Result<CoapResponse, ClientError> {
        let token: [u8; 4] = rand::random();
        let mut payload = Vec::new();
        let mut next_block: Option<BlockOption> = None;
        // Code and ETag of block 0; every later block must match them.
        let mut first: Option<(Code, Option<Vec<u8>>)> = None;

        loop {
            let mut request = Message::new(MessageType::Confirmable, Code::GET, self.message_id());
            request.token = token.to_vec();
            request.set_path(path);
            for query in queries {
                request.add_query(query);
            }
            if let Some(block) = next_block {
                request.add_uint_option(option::BLOCK2, block.value());
            }

            let response = self.exchange(&request).await?;
            let etag = response.option_values(option::ETAG).next().map(<[u8]>::to_vec);
            if let Some((code, first_etag)) = &first {
                let continues = response
                    .block2()
                    .zip(next_block)
                    .is_some_and(|(got, asked)| got.num == asked.num);
                if response.code != *code || !continues {
                    return Err(ClientError::Interrupted(response.code));
                }
                if etag != *first_etag {
                    return Err(ClientError::RepresentationChanged);
                }
            } else {
                first = Some((response.code, etag));
            }
            payload.extend_from_slice(&response.payload);

            match response.block2() {
                Some(block) if block.more => {
                    next_block = Some(BlockOption {
                        num: block.num + 1,
                        more: false,
                        szx: block.szx,
                    });
                }
                _ => {
                    return Ok(CoapResponse {
                        code: response.code,
                        payload,
                    })
                }
            }
        }
    }

    fn message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = id.wrapping_add(1);
        id
    }

    /// Send one CON and wait for the matching ACK or RST.
    async fn exchange(&self, request: &Message) -> Result<Message, ClientError> {
        self.socket.send(&request.encode()).await?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let len = tokio::time::timeout_at(deadline, self.socket.recv(&mut buf))
                .await
                .map_err(|_| ClientError::Timeout(self.timeout))??;

            let message = match Message::decode(&buf[..len]) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(error = %e, "Discarding malformed datagram");
                    continue;
                }
            };
            if message.message_id != request.message_id {
                continue;
            }
            match message.msg_type {
                MessageType::Reset => return Err(ClientError::Reset(message.message_id)),
                MessageType::Acknowledgement if message.token == request.token => return Ok(message),
                _ => continue,
            }
        }
    }
}
