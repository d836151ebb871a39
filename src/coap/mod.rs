//! CoAP (RFC 7252) front-end over UDP.
//!
//! # Data Flow
//! ```text
//! UDP datagram
//!     → server.rs  (receive loop, in-flight limit, deadline)
//!     → dedup.rs   (duplicate (peer, message id)? replay the stored reply)
//!     → message.rs (decode header, token, options, payload)
//!     → handler.rs (path routing, Uri-Query → lookup pipeline)
//!     → message.rs (encode ACK/NON, Block2 slice)
//!     → UDP datagram back to the peer
//! ```
//!
//! `cache.rs` holds the bounded, expiring maps behind deduplication and
//! block-wise transfers.

pub mod cache;
pub mod client;
pub mod dedup;
pub mod handler;
pub mod message;
pub mod server;

pub use client::{CoapClient, CoapResponse};
pub use handler::CoapHandler;
pub use message::{Code, Message, MessageType};
pub use server::CoapServer;

use crate::lookup::{Outcome, StatusVocabulary};

/// CoAP response codes for lookup outcomes.
pub struct CoapStatus;

impl StatusVocabulary for CoapStatus {
    type Code = Code;
    const TRANSPORT: &'static str = "coap";

    fn code_for(outcome: Outcome) -> Code {
        match outcome {
            Outcome::EmptyQuery => Code::BAD_REQUEST,
            Outcome::Success => Code::CONTENT,
            Outcome::NotFound => Code::NOT_FOUND,
            Outcome::BadGateway => Code::BAD_GATEWAY,
            Outcome::ServiceUnavailable => Code::SERVICE_UNAVAILABLE,
            Outcome::InternalError => Code::INTERNAL_SERVER_ERROR,
        }
    }
}
