//! Response mapping.
//!
//! # Responsibilities
//! - Map lookup outcomes to HTTP status codes
//! - Write translated responses as `text/plain; charset=utf-8`

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::lookup::{Outcome, StatusVocabulary, TranslatedResponse};

/// HTTP status codes for lookup outcomes.
pub struct HttpStatus;

impl StatusVocabulary for HttpStatus {
    type Code = StatusCode;
    const TRANSPORT: &'static str = "http";

    fn code_for(outcome: Outcome) -> StatusCode {
        match outcome {
            Outcome::EmptyQuery => StatusCode::BAD_REQUEST,
            Outcome::Success => StatusCode::OK,
            Outcome::NotFound => StatusCode::NOT_FOUND,
            Outcome::BadGateway => StatusCode::BAD_GATEWAY,
            Outcome::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Outcome::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TranslatedResponse<StatusCode> {
    fn into_response(self) -> Response {
        let content_type = format!("{}; charset=utf-8", self.content_type);
        (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}
