//! Message deduplication (RFC 7252 §4.5).
//!
//! A request is identified by its source endpoint and message id. The first
//! copy is handled; copies arriving while it runs are dropped, and copies
//! arriving after it finished get the stored reply again.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::coap::cache::ExpiringCache;

/// EXCHANGE_LIFETIME with the default transmission parameters.
pub const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    InFlight,
    /// Encoded reply, or `None` if nothing was sent.
    Done(Option<Arc<[u8]>>),
}

/// What to do with an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// First copy: handle it and call [`Deduplicator::finish`].
    Fresh,
    /// The original is still being handled.
    InProgress,
    /// The original finished; resend this reply, if any.
    Replay(Option<Arc<[u8]>>),
}

pub struct Deduplicator {
    seen: ExpiringCache<(SocketAddr, u16), State>,
}

impl Deduplicator {
    pub fn new(capacity: usize, lifetime: Duration) -> Self {
        Self {
            seen: ExpiringCache::new(capacity, lifetime),
        }
    }

    pub fn admit(&self, peer: SocketAddr, message_id: u16) -> Admission {
        match self.seen.insert_if_absent((peer, message_id), State::InFlight) {
            None => Admission::Fresh,
            Some(State::InFlight) => Admission::InProgress,
            Some(State::Done(reply)) => Admission::Replay(reply),
        }
    }

    /// Record the outcome of a fresh request.
    pub fn finish(&self, peer: SocketAddr, message_id: u16, reply: Option<Arc<[u8]>>) {
        self.seen.update(&(peer, message_id), State::Done(reply));
    }
}
