//! Upstream fetcher.
//!
//! # Responsibilities
//! - Build the upstream GP query from a [`QueryIntent`]
//! - Perform exactly one GET per lookup (no retries)
//! - Classify the response into an [`Outcome`]
//!
//! # Design Decisions
//! - One pooled `reqwest::Client` per process, built from config
//! - Connect and total deadlines are enforced here, not by callers
//! - Failing before response headers arrive, or running out the total
//!   deadline at any point, means the upstream is unreachable; any other
//!   failure while reading the body is a local read error

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::lookup::query::QueryIntent;

/// Phrase the provider returns instead of element sets when nothing matches.
/// Matched as a substring of the body; the provider documents no stricter contract.
pub const NO_DATA_SENTINEL: &str = "No GP data found";

/// Abstract status class of a lookup, independent of any transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// No query parameter supplied; rejected before any upstream call.
    EmptyQuery,
    Success,
    NotFound,
    BadGateway,
    ServiceUnavailable,
    InternalError,
}

impl Outcome {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::EmptyQuery => "empty_query",
            Outcome::Success => "success",
            Outcome::NotFound => "not_found",
            Outcome::BadGateway => "bad_gateway",
            Outcome::ServiceUnavailable => "service_unavailable",
            Outcome::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one lookup: either the element sets or a complete error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResult {
    pub outcome: Outcome,
    pub body: String,
}

impl UpstreamResult {
    pub fn success(body: String) -> Self {
        Self {
            outcome: Outcome::Success,
            body,
        }
    }
}

impl From<UpstreamError> for UpstreamResult {
    fn from(err: UpstreamError) -> Self {
        Self {
            outcome: err.outcome(),
            body: err.to_string(),
        }
    }
}

/// Ways an upstream lookup can fail.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no TLE data found for the specified parameters")]
    NotFound,

    #[error("upstream returned status {0}")]
    BadStatus(u16),

    #[error("unable to reach upstream: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("error reading upstream response: {0}")]
    Read(#[source] reqwest::Error),
}

impl UpstreamError {
    pub fn outcome(&self) -> Outcome {
        match self {
            UpstreamError::NotFound => Outcome::NotFound,
            UpstreamError::BadStatus(_) => Outcome::BadGateway,
            UpstreamError::Unreachable(_) => Outcome::ServiceUnavailable,
            UpstreamError::Read(_) => Outcome::InternalError,
        }
    }
}

/// Failure to construct a fetcher from configuration.
#[derive(Debug, Error)]
pub enum FetcherBuildError {
    #[error("invalid upstream base URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Issues lookups against the configured GP endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamFetcher {
    client: Client,
    base_url: Url,
}

impl UpstreamFetcher {
    /// Create a fetcher with its own connection pool.
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetcherBuildError> {
        let base_url = Url::parse(&config.base_url).map_err(|source| FetcherBuildError::InvalidUrl {
            url: config.base_url.clone(),
            source,
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Fully resolved upstream URL for an intent. Callers are expected to have
    /// rejected empty intents; if they did not, only the format is sent.
    pub fn request_url(&self, intent: &QueryIntent) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(selector) = intent.selector() {
                query.append_pair(selector.param(), selector.value());
            }
            query.append_pair("FORMAT", "TLE");
        }
        url
    }

    /// Perform one lookup and fold any failure into an [`UpstreamResult`].
    pub async fn fetch(&self, intent: &QueryIntent) -> UpstreamResult {
        match self.try_fetch(intent).await {
            Ok(data) => UpstreamResult::success(data),
            Err(e) => {
                tracing::warn!(error = %e, outcome = %e.outcome(), "Upstream lookup failed");
                e.into()
            }
        }
    }

    /// Perform one lookup, returning the trimmed element-set text.
    pub async fn try_fetch(&self, intent: &QueryIntent) -> Result<String, UpstreamError> {
        let url = self.request_url(intent);
        tracing::info!(url = %url, "Fetching TLE data from upstream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(UpstreamError::Unreachable)?;

        let status = response.status().as_u16();
        // The total deadline can fire mid-body; that is still an unreachable upstream.
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Unreachable(e)
            } else {
                UpstreamError::Read(e)
            }
        })?;

        let data = classify(status, &body)?;
        tracing::info!(bytes = data.len(), "Fetched TLE data");
        Ok(data)
    }
}

/// Classify a fully read upstream response.
pub fn classify(status: u16, body: &str) -> Result<String, UpstreamError> {
    if status != 200 {
        return Err(UpstreamError::BadStatus(status));
    }

    let data = body.trim();
    if data.is_empty() || data.contains(NO_DATA_SENTINEL) {
        return Err(UpstreamError::NotFound);
    }

    Ok(data.to_string())
}
