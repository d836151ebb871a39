//! Request extraction.
//!
//! # Responsibilities
//! - Decode the query string into key/value pairs
//! - Hand the pairs to the query extractor
//!
//! # Design Decisions
//! - Extraction never fails; an unusable query yields an empty intent and the
//!   pipeline answers 400

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use url::form_urlencoded;

use crate::lookup::QueryIntent;

/// Extractor producing a [`QueryIntent`] from the request URI.
#[derive(Debug, Clone)]
pub struct LookupQuery(pub QueryIntent);

impl LookupQuery {
    pub fn from_query_string(query: &str) -> Self {
        Self(QueryIntent::from_pairs(form_urlencoded::parse(query.as_bytes())))
    }
}

impl<S> FromRequestParts<S> for LookupQuery
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_query_string(parts.uri.query().unwrap_or_default()))
    }
}
