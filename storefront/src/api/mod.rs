//! REST transport for the storefront backend

pub mod client;
pub mod error;

pub use client::RestClient;
pub use error::ApiError;
