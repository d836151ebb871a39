//! HTTP front-end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs   (Axum setup, request ID, timeout, trace)
//!     → request.rs  (query string → QueryIntent)
//!     → handlers.rs (/, /tle, /health)
//!     → [lookup pipeline]
//!     → response.rs (Outcome → status code, text/plain body)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::LookupQuery;
pub use response::HttpStatus;
pub use server::{AppState, HttpServer, X_REQUEST_ID};
