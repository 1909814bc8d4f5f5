//! Mapping of relay failures onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::any::Any;
use tracing::{error, warn};

/// Everything that can go wrong between a dashboard poll and the resolver.
///
/// Each variant maps to one row of the relay's error table. Clients only ever
/// see `{"error": <client_message>}`; details stay in the log.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("connection to {url} failed: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("upstream {url} returned HTTP {status}")]
    UpstreamStatus { url: String, status: StatusCode },

    #[error("upstream body is not valid JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("upstream returned a JSON {found}, expected an object")]
    UnexpectedFormat { found: &'static str },

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<knotstats_common::Error> for RelayError {
    fn from(err: knotstats_common::Error) -> Self {
        match err {
            knotstats_common::Error::NotAnObject { found } => RelayError::UnexpectedFormat { found },
        }
    }
}

pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected server error occurred.";

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Unreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            // Upstream 5xx passes through; anything else is our failure to relay.
            RelayError::UpstreamStatus { status, .. } if status.as_u16() >= 500 => *status,
            RelayError::UpstreamStatus { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::MalformedBody(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UnexpectedFormat { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text placed in the `error` field of the response body.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Unreachable { url, .. } => format!(
                "Connection refused. Is the resolver statistics endpoint running at {}?",
                url
            ),
            RelayError::Timeout { .. } => {
                "Request timed out fetching stats from the resolver.".to_string()
            }
            RelayError::UpstreamStatus { status, .. } => match status.canonical_reason() {
                Some(reason) => format!(
                    "HTTP error {} from the resolver: {}",
                    status.as_u16(),
                    reason
                ),
                None => format!("HTTP error {} from the resolver", status.as_u16()),
            },
            RelayError::MalformedBody(_) => {
                "Failed to decode JSON response from the resolver.".to_string()
            }
            RelayError::UnexpectedFormat { .. } => "unexpected data format".to_string(),
            RelayError::InstanceNotFound(id) => format!("Instance '{}' not found", id),
            RelayError::Internal(_) => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::Unreachable { .. } | RelayError::UpstreamStatus { .. } => {
                error!("Upstream fetch failed: {}", self);
            }
            RelayError::Timeout { .. }
            | RelayError::MalformedBody(_)
            | RelayError::UnexpectedFormat { .. } => {
                warn!("Upstream fetch failed: {}", self);
            }
            RelayError::InstanceNotFound(_) => {}
            RelayError::Internal(detail) => {
                error!("Unexpected error while relaying stats: {}", detail);
            }
        }

        let body = serde_json::json!({ "error": self.client_message() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Turns a handler panic into the same JSON shape as every other failure.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    RelayError::Internal(format!("handler panicked: {}", detail)).into_response()
}
