//! Lookup pipeline shared by every front-end.
//!
//! # Data Flow
//! ```text
//! front-end request (HTTP query string / CoAP Uri-Query)
//!     → query.rs      (key/value pairs → QueryIntent)
//!     → empty intent? → EmptyQuery, no upstream call
//!     → upstream.rs   (one GET, classify → UpstreamResult)
//!     → translate.rs  (Outcome → transport status code)
//!     → front-end writes TranslatedResponse
//! ```
//!
//! # Design Decisions
//! - Front-ends only parse requests and write responses; all decisions live here
//! - No state is shared between lookups besides the pooled HTTP client
//! - Every failure ends in a complete plain-text body

pub mod query;
pub mod translate;
pub mod upstream;

use std::time::Instant;

pub use query::{QueryIntent, Selector};
pub use translate::{translate, StatusVocabulary, TranslatedResponse, EMPTY_QUERY_MESSAGE, TEXT_PLAIN};
pub use upstream::{FetcherBuildError, Outcome, UpstreamError, UpstreamFetcher, UpstreamResult};

use crate::config::UpstreamConfig;
use crate::observability::metrics;

/// The lookup pipeline: intent → fetch → translate.
#[derive(Debug, Clone)]
pub struct LookupService {
    fetcher: UpstreamFetcher,
}

impl LookupService {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetcherBuildError> {
        Ok(Self::with_fetcher(UpstreamFetcher::new(config)?))
    }

    pub fn with_fetcher(fetcher: UpstreamFetcher) -> Self {
        Self { fetcher }
    }

    /// Run a lookup, short-circuiting empty intents before any upstream call.
    pub async fn lookup(&self, intent: &QueryIntent) -> UpstreamResult {
        if intent.is_empty() {
            tracing::debug!("Rejecting lookup without query parameters");
            return translate::empty_query();
        }
        self.fetcher.fetch(intent).await
    }

    /// Run a lookup and translate the result for transport `V`.
    pub async fn handle<V: StatusVocabulary>(&self, intent: &QueryIntent) -> TranslatedResponse<V::Code> {
        let start = Instant::now();
        let result = self.lookup(intent).await;
        metrics::record_lookup(V::TRANSPORT, result.outcome, start);
        translate::<V>(result)
    }
}
