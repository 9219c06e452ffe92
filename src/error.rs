//! Error types for Waypost.
//!
//! The pure geofence core never fails. Errors only arise at the edges:
//! request validation, lookups of missing records, and outbound notification
//! delivery. Storage failures travel as `anyhow::Error` and map to `500`.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the adapter layer.
#[derive(Debug, Error)]
pub enum WaypostError {
    /// A request was missing required fields or carried unusable values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Delivering a notification to the webhook failed.
    #[error("notification delivery failed: {0}")]
    Notify(String),
}

impl WaypostError {
    /// The HTTP status an API handler should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WaypostError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WaypostError::NotFound(_) => StatusCode::NOT_FOUND,
            WaypostError::Notify(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Map an `anyhow` error from the adapter layer onto a status code.
///
/// Errors that wrap a [`WaypostError`] keep their specific status; anything
/// else is treated as an internal failure.
pub fn status_for(err: &anyhow::Error) -> StatusCode {
    err.downcast_ref::<WaypostError>()
        .map(WaypostError::status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
