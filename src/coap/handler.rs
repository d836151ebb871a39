//! Per-datagram request handling.
//!
//! # Responsibilities
//! - Decide whether a datagram gets a response, a RST, or nothing
//! - Route `tle` to the lookup pipeline, everything else to the usage text
//! - Match the reply to the request (piggybacked ACK or NON)
//! - Slice large payloads into Block2 blocks
//!
//! # Design Decisions
//! - A request without Block2, or for block 0, runs the pipeline once; when
//!   the body spans several blocks it is kept per peer and resource, tagged
//!   with an ETag, and every later block is cut from that same body
//! - A later block whose transfer is unknown or expired gets 4.08 instead of
//!   a fresh lookup, so a client never stitches two upstream answers together
//! - Message ids for NON responses come from a per-server counter

use std::net::SocketAddr;
use std::ops::Range;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::coap::cache::ExpiringCache;
use crate::coap::message::{
    option, peek_header, BlockOption, Code, Message, MessageType, TEXT_PLAIN_FORMAT,
};
use crate::coap::CoapStatus;
use crate::config::CoapConfig;
use crate::lookup::{LookupService, QueryIntent};
use crate::observability::metrics;

/// Uri-Path of the lookup resource.
pub const LOOKUP_PATH: &str = "tle";

/// Body returned for any path other than the lookup resource.
pub const USAGE: &str = "TLE Forwarder CoAP Service\n\
    Usage: coap://localhost:5683/tle?satellite_id=25544\n\
    Parameters: satellite_id, name, or group";

const OUT_OF_RANGE_MESSAGE: &str = "requested block is out of range";

/// Body for a follow-up block whose transfer is no longer held.
pub const TRANSFER_EXPIRED_MESSAGE: &str =
    "block-wise transfer unknown or expired, request block 0 again";

/// A block-wise transfer is scoped to one peer asking for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransferKey {
    peer: SocketAddr,
    path: String,
    queries: Vec<String>,
}

impl TransferKey {
    fn new(peer: SocketAddr, request: &Message) -> Self {
        Self {
            peer,
            path: request.path(),
            queries: request.queries(),
        }
    }
}

/// One resolved response, shared by every block cut from it.
#[derive(Debug, Clone)]
struct Transfer {
    code: Code,
    etag: [u8; 4],
    body: Arc<[u8]>,
}

/// Turns request datagrams into response messages.
pub struct CoapHandler {
    service: Arc<LookupService>,
    max_szx: u8,
    message_ids: AtomicU16,
    transfers: ExpiringCache<TransferKey, Transfer>,
}

impl CoapHandler {
    /// `config.block_size` is the largest payload sent without Block2.
    pub fn new(service: Arc<LookupService>, config: &CoapConfig) -> Self {
        Self {
            service,
            max_szx: BlockOption::szx_for(config.block_size),
            message_ids: AtomicU16::new(rand::random()),
            transfers: ExpiringCache::new(
                config.transfer_capacity,
                Duration::from_secs(config.transfer_lifetime_secs),
            ),
        }
    }

    /// Handle one datagram from `peer`. `None` means nothing is sent back.
    pub async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) -> Option<Message> {
        let request = match Message::decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed datagram");
                metrics::record_coap_dropped("malformed");
                return match peek_header(datagram) {
                    Some((MessageType::Confirmable, id)) => Some(Message::reset(id)),
                    _ => None,
                };
            }
        };

        match request.msg_type {
            MessageType::Acknowledgement | MessageType::Reset => {
                tracing::debug!(message_id = request.message_id, "Ignoring unsolicited ACK/RST");
                metrics::record_coap_dropped("unsolicited");
                return None;
            }
            MessageType::Confirmable | MessageType::NonConfirmable => {}
        }

        if !request.code.is_request() {
            // Empty CON is a ping; anything else that is not a request is rejected.
            if !request.code.is_empty() {
                tracing::debug!(code = %request.code, "Ignoring non-request message");
                metrics::record_coap_dropped("not_request");
            }
            return (request.msg_type == MessageType::Confirmable)
                .then(|| Message::reset(request.message_id));
        }

        tracing::debug!(
            code = %request.code,
            path = %request.path(),
            message_id = request.message_id,
            "CoAP request"
        );
        Some(self.respond(&request, peer).await)
    }

    async fn respond(&self, request: &Message, peer: SocketAddr) -> Message {
        let requested = request.block2();
        let key = TransferKey::new(peer, request);

        let (transfer, follow_up) = match requested {
            Some(block) if block.num > 0 => match self.transfers.get(&key) {
                Some(transfer) => (transfer, true),
                None => {
                    tracing::debug!(block = block.num, "Block requested outside a live transfer");
                    return self.plain_reply(
                        request,
                        Code::REQUEST_ENTITY_INCOMPLETE,
                        TRANSFER_EXPIRED_MESSAGE,
                    );
                }
            },
            _ => {
                let (code, body) = self.resolve(request).await;
                let transfer = Transfer {
                    code,
                    etag: rand::random(),
                    body: body.into(),
                };
                (transfer, false)
            }
        };

        let mut response = self.reply_to(request, transfer.code);
        response.add_uint_option(option::CONTENT_FORMAT, TEXT_PLAIN_FORMAT);

        match select_block(transfer.body.len(), requested, self.max_szx) {
            Ok(None) => response.payload = transfer.body.to_vec(),
            Ok(Some((block, range))) => {
                if !follow_up && block.more {
                    self.transfers.insert(key.clone(), transfer.clone());
                }
                if follow_up && !block.more {
                    self.transfers.remove(&key);
                }
                if follow_up || block.more {
                    response.add_option(option::ETAG, transfer.etag);
                }
                response.add_uint_option(option::BLOCK2, block.value());
                if block.num == 0 {
                    response.add_uint_option(option::SIZE2, transfer.body.len() as u32);
                }
                response.payload = transfer.body[range].to_vec();
            }
            Err(BlockOutOfRange) => {
                response.code = Code::BAD_OPTION;
                response.payload = OUT_OF_RANGE_MESSAGE.as_bytes().to_vec();
            }
        }
        response
    }

    async fn resolve(&self, request: &Message) -> (Code, Vec<u8>) {
        if request.path() != LOOKUP_PATH {
            return (Code::CONTENT, USAGE.as_bytes().to_vec());
        }

        let intent = QueryIntent::from_tokens(request.queries());
        let translated = self.service.handle::<CoapStatus>(&intent).await;
        if !translated.status.is_success() {
            tracing::warn!(code = %translated.status, body = %translated.body, "Lookup failed");
        }
        (translated.status, translated.body.into_bytes())
    }

    fn plain_reply(&self, request: &Message, code: Code, body: &str) -> Message {
        let mut response = self.reply_to(request, code);
        response.add_uint_option(option::CONTENT_FORMAT, TEXT_PLAIN_FORMAT);
        response.payload = body.as_bytes().to_vec();
        response
    }

    fn reply_to(&self, request: &Message, code: Code) -> Message {
        let (msg_type, message_id) = match request.msg_type {
            MessageType::Confirmable => (MessageType::Acknowledgement, request.message_id),
            _ => (
                MessageType::NonConfirmable,
                self.message_ids.fetch_add(1, Ordering::Relaxed),
            ),
        };
        let mut response = Message::new(msg_type, code, message_id);
        response.token = request.token.clone();
        response
    }
}

#[derive(Debug, PartialEq, Eq)]
struct BlockOutOfRange;

/// Pick the slice of a `len`-byte payload to send. `Ok(None)` sends it whole.
fn select_block(
    len: usize,
    requested: Option<BlockOption>,
    max_szx: u8,
) -> Result<Option<(BlockOption, Range<usize>)>, BlockOutOfRange> {
    let (offset, szx) = match requested {
        Some(block) => (block.num as usize * block.size(), block.szx.min(max_szx)),
        None if len <= 1 << (max_szx + 4) => return Ok(None),
        None => (0, max_szx),
    };

    if offset > 0 && offset >= len {
        return Err(BlockOutOfRange);
    }

    let size = 1usize << (szx + 4);
    let end = (offset + size).min(len);
    let block = BlockOption {
        num: (offset / size) as u32,
        more: end < len,
        szx,
    };
    Ok(Some((block, offset..end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoapConfig, UpstreamConfig};

    fn handler() -> CoapHandler {
        // Nothing listens on port 1; lookups in these tests never reach it.
        let upstream = UpstreamConfig {
            base_url: "http://127.0.0.1:1/gp.php".into(),
            ..UpstreamConfig::default()
        };
        let coap = CoapConfig {
            block_size: 64,
            ..CoapConfig::default()
        };
        CoapHandler::new(Arc::new(LookupService::new(&upstream).unwrap()), &coap)
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn block_request(path: &str, num: u32) -> Message {
        let mut msg = get(MessageType::Confirmable, path, &[]);
        msg.add_uint_option(option::BLOCK2, BlockOption { num, more: false, szx: 2 }.value());
        msg
    }

    fn get(msg_type: MessageType, path: &str, queries: &[&str]) -> Message {
        let mut msg = Message::new(msg_type, Code::GET, 0x0102);
        msg.token = vec![0xCA, 0xFE];
        msg.set_path(path);
        for q in queries {
            msg.add_query(q);
        }
        msg
    }

    #[tokio::test]
    async fn confirmable_gets_piggybacked_ack() {
        let reply = handler()
            .handle_datagram(&get(MessageType::Confirmable, "/", &[]).encode(), peer())
            .await
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::Acknowledgement);
        assert_eq!(reply.message_id, 0x0102);
        assert_eq!(reply.token, vec![0xCA, 0xFE]);
        assert_eq!(reply.code, Code::CONTENT);
        assert_eq!(reply.uint_option(option::CONTENT_FORMAT), Some(TEXT_PLAIN_FORMAT));
    }

    #[tokio::test]
    async fn non_confirmable_gets_non_reply() {
        let reply = handler()
            .handle_datagram(&get(MessageType::NonConfirmable, "other", &[]).encode(), peer())
            .await
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::NonConfirmable);
        assert_eq!(reply.token, vec![0xCA, 0xFE]);
    }

    #[tokio::test]
    async fn usage_text_is_block_wise_when_large() {
        let handler = handler();
        let first = handler
            .handle_datagram(&get(MessageType::Confirmable, "/", &[]).encode(), peer())
            .await
            .unwrap();
        let block = first.block2().unwrap();
        assert_eq!(block, BlockOption { num: 0, more: true, szx: 2 });
        assert_eq!(first.uint_option(option::SIZE2), Some(USAGE.len() as u32));
        assert_eq!(first.payload, &USAGE.as_bytes()[..64]);

        let mut next = get(MessageType::Confirmable, "/", &[]);
        next.add_uint_option(option::BLOCK2, BlockOption { num: 1, more: false, szx: 2 }.value());
        let second = handler.handle_datagram(&next.encode(), peer()).await.unwrap();
        assert_eq!(second.block2().unwrap().num, 1);
        assert_eq!(second.payload, &USAGE.as_bytes()[64..USAGE.len().min(128)]);
    }

    #[tokio::test]
    async fn follow_up_blocks_share_one_etag_and_transfer_ends() {
        let handler = handler();
        let first = handler
            .handle_datagram(&get(MessageType::Confirmable, "/", &[]).encode(), peer())
            .await
            .unwrap();
        let etag = first.option_values(option::ETAG).next().unwrap().to_vec();
        assert_eq!(etag.len(), 4);

        let blocks = USAGE.len().div_ceil(64) as u32;
        let mut body = first.payload.clone();
        for num in 1..blocks {
            let reply = handler
                .handle_datagram(&block_request("/", num).encode(), peer())
                .await
                .unwrap();
            assert_eq!(reply.code, Code::CONTENT);
            assert_eq!(reply.option_values(option::ETAG).next(), Some(etag.as_slice()));
            body.extend_from_slice(&reply.payload);
        }
        assert_eq!(body, USAGE.as_bytes());

        // The last block closes the transfer.
        let late = handler
            .handle_datagram(&block_request("/", 1).encode(), peer())
            .await
            .unwrap();
        assert_eq!(late.code, Code::REQUEST_ENTITY_INCOMPLETE);
    }

    #[tokio::test]
    async fn follow_up_block_without_transfer_is_incomplete() {
        let handler = handler();
        let reply = handler
            .handle_datagram(&block_request("/tle", 2).encode(), peer())
            .await
            .unwrap();
        assert_eq!(reply.code, Code::REQUEST_ENTITY_INCOMPLETE);
        assert_eq!(reply.payload, TRANSFER_EXPIRED_MESSAGE.as_bytes());
        assert!(reply.block2().is_none());

        // Transfers are per peer.
        handler
            .handle_datagram(&get(MessageType::Confirmable, "/", &[]).encode(), peer())
            .await
            .unwrap();
        let other = SocketAddr::from(([127, 0, 0, 1], 40001));
        let reply = handler
            .handle_datagram(&block_request("/", 1).encode(), other)
            .await
            .unwrap();
        assert_eq!(reply.code, Code::REQUEST_ENTITY_INCOMPLETE);
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let reply = handler()
            .handle_datagram(&get(MessageType::Confirmable, "/tle", &["format=json"]).encode(), peer())
            .await
            .unwrap();
        assert_eq!(reply.code, Code::BAD_REQUEST);
        assert_eq!(
            String::from_utf8(reply.payload).unwrap(),
            crate::lookup::EMPTY_QUERY_MESSAGE
        );
    }

    #[tokio::test]
    async fn ping_and_malformed_confirmable_get_reset() {
        let handler = handler();
        let ping = Message::new(MessageType::Confirmable, Code::EMPTY, 9);
        assert_eq!(handler.handle_datagram(&ping.encode(), peer()).await, Some(Message::reset(9)));

        let malformed = [0x40, 0x01, 0x00, 0x0A, 0xF1];
        assert_eq!(handler.handle_datagram(&malformed, peer()).await, Some(Message::reset(10)));

        let malformed_non = [0x50, 0x01, 0x00, 0x0B, 0xF1];
        assert_eq!(handler.handle_datagram(&malformed_non, peer()).await, None);
    }

    #[tokio::test]
    async fn acks_and_responses_are_ignored() {
        let handler = handler();
        let ack = Message::new(MessageType::Acknowledgement, Code::EMPTY, 1);
        assert_eq!(handler.handle_datagram(&ack.encode(), peer()).await, None);

        let stray = Message::new(MessageType::NonConfirmable, Code::CONTENT, 2);
        assert_eq!(handler.handle_datagram(&stray.encode(), peer()).await, None);
    }

    #[test]
    fn block_selection() {
        assert_eq!(select_block(64, None, 2), Ok(None));
        assert_eq!(
            select_block(100, None, 2),
            Ok(Some((BlockOption { num: 0, more: true, szx: 2 }, 0..64)))
        );
        assert_eq!(
            select_block(100, Some(BlockOption { num: 1, more: false, szx: 2 }), 2),
            Ok(Some((BlockOption { num: 1, more: false, szx: 2 }, 64..100)))
        );
        assert_eq!(
            select_block(100, Some(BlockOption { num: 2, more: false, szx: 2 }), 2),
            Err(BlockOutOfRange)
        );
        // Requested size larger than ours: renumber at our size.
        assert_eq!(
            select_block(300, Some(BlockOption { num: 1, more: false, szx: 3 }), 2),
            Ok(Some((BlockOption { num: 2, more: true, szx: 2 }, 128..192)))
        );
        assert_eq!(
            select_block(0, Some(BlockOption { num: 0, more: false, szx: 6 }), 6),
            Ok(Some((BlockOption { num: 0, more: false, szx: 6 }, 0..0)))
        );
    }
}
