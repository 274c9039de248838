//! Error types for the storefront REST client

use thiserror::Error;

/// Errors that can occur when talking to the storefront backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP request failed before a response arrived
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response body did not have the expected shape
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Missing or rejected bearer token
    #[error("Unauthorized - please sign in again")]
    Unauthorized,

    /// Backend returned a non-success status
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message reported by the backend
        message: String,
    },
}

impl ApiError {
    /// Build an [`ApiError::Api`] from a status and raw response body
    ///
    /// JSON bodies contribute their `message` (or `error`) field; anything else is
    /// surfaced verbatim.
    #[must_use]
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                ["message", "error"]
                    .iter()
                    .find_map(|field| json.get(field).and_then(|v| v.as_str()).map(str::to_owned))
            })
            .unwrap_or_else(|| body.trim().to_owned());

        let message = if message.is_empty() {
            format!("Request failed with status {status}")
        } else {
            message
        };

        Self::Api { status, message }
    }
}
