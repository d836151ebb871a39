//! Route handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::http::request::LookupQuery;
use crate::http::response::HttpStatus;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceDescription {
    pub service: &'static str,
    pub description: &'static str,
    pub endpoints: BTreeMap<&'static str, EndpointDescription>,
    pub data_source: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EndpointDescription {
    pub method: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<&'static str, &'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// `GET /` and any unknown path.
pub async fn describe() -> Json<ServiceDescription> {
    let tle = EndpointDescription {
        method: "GET",
        parameters: BTreeMap::from([
            ("satellite_id", "NORAD catalog number (e.g., 25544 for ISS)"),
            ("name", "Satellite name search (e.g., ISS, STARLINK)"),
            ("group", "Satellite group (e.g., stations, visual, active)"),
        ]),
        examples: vec![
            "/tle?satellite_id=25544",
            "/tle?name=ISS",
            "/tle?group=stations",
        ],
    };
    let health = EndpointDescription {
        method: "GET",
        parameters: BTreeMap::new(),
        examples: Vec::new(),
    };

    Json(ServiceDescription {
        service: "TLE Forwarder",
        description: "Fetch TLE (Two-Line Element) data from CelesTrak",
        endpoints: BTreeMap::from([("/tle", tle), ("/health", health)]),
        data_source: "CelesTrak (https://celestrak.org)",
    })
}

/// `GET /tle`
pub async fn lookup(State(state): State<AppState>, LookupQuery(intent): LookupQuery) -> Response {
    let response = state.service.handle::<HttpStatus>(&intent).await;
    if !response.status.is_success() {
        tracing::warn!(status = %response.status, body = %response.body, "Lookup failed");
    }
    response.into_response()
}

/// `GET /health`
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus { status: "healthy" })
}
