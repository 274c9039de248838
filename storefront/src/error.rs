//! Storefront error taxonomy

use crate::api::ApiError;
use thiserror::Error;

/// Result alias for storefront operations
pub type Result<T, E = StorefrontError> = std::result::Result<T, E>;

/// Everything that can go wrong while composing or paying for an order
///
/// None of these are fatal: every one of them leaves the flow in a state the
/// user can recover from by correcting input or retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorefrontError {
    /// Local input problem, caught before any network call
    #[error("{0}")]
    Validation(String),

    /// Business rule declined by the backend or a gate
    #[error("{0}")]
    Rejected(String),

    /// Payment provider could not start a payment
    #[error("{0}")]
    Provider(String),

    /// Transport or backend failure
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Client-local storage could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StorefrontError {
    /// Validation error helper
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Rejection helper
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// The single message shown to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Whether the problem was caught locally
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<std::io::Error> for StorefrontError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for StorefrontError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
