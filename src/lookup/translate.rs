//! Status translation.
//!
//! Each front-end owns a concrete status vocabulary and implements
//! [`StatusVocabulary`] for it. The mapping must be total: a transport without
//! an exact equivalent for an [`Outcome`] maps it to its nearest stricter error
//! code, never to a success code.

use crate::lookup::upstream::{Outcome, UpstreamResult};

/// Content type of every lookup response.
pub const TEXT_PLAIN: &str = "text/plain";

/// Body returned when the request carries no usable query parameter.
pub const EMPTY_QUERY_MESSAGE: &str = "Please provide satellite_id, name, or group parameter";

/// A transport's native status codes.
pub trait StatusVocabulary {
    /// Concrete status code type of the transport.
    type Code: Copy + std::fmt::Debug;

    /// Label used in logs and metrics.
    const TRANSPORT: &'static str;

    /// Code for an abstract outcome.
    fn code_for(outcome: Outcome) -> Self::Code;
}

/// Response ready to be written on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedResponse<C> {
    pub status: C,
    pub content_type: &'static str,
    pub body: String,
}

/// Translate a lookup result into the vocabulary `V`.
pub fn translate<V: StatusVocabulary>(result: UpstreamResult) -> TranslatedResponse<V::Code> {
    TranslatedResponse {
        status: V::code_for(result.outcome),
        content_type: TEXT_PLAIN,
        body: result.body,
    }
}

/// The pre-fetch rejection for an intent with no usable field.
pub fn empty_query() -> UpstreamResult {
    UpstreamResult {
        outcome: Outcome::EmptyQuery,
        body: EMPTY_QUERY_MESSAGE.to_string(),
    }
}
