//! Configuration loaded from environment variables with development defaults.

use crate::error::{Result, StorefrontError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_STORAGE_PATH: &str = ".boxoffice/local-storage.json";
const DEFAULT_LOG_FILTER: &str = "info,boxoffice=debug";

/// Storefront configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// REST base URL
    pub api_url: String,
    /// Origin the storefront is served from; provider return URLs hang off it
    pub origin: String,
    /// Client-local storage file
    pub storage_path: PathBuf,
    /// Request timeout in seconds
    pub http_timeout_secs: u64,
    /// `tracing` filter directives
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            origin: DEFAULT_ORIGIN.to_owned(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            http_timeout_secs: 30,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Reads `BOXOFFICE_API_URL`, `BOXOFFICE_ORIGIN`, `BOXOFFICE_STORAGE_PATH`,
    /// `BOXOFFICE_HTTP_TIMEOUT_SECS` and `RUST_LOG`. Unset or unparsable values
    /// fall back to [`Config::default`]. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env::var("BOXOFFICE_API_URL").unwrap_or(defaults.api_url),
            origin: env::var("BOXOFFICE_ORIGIN").unwrap_or(defaults.origin),
            storage_path: env::var("BOXOFFICE_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            http_timeout_secs: env::var("BOXOFFICE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            log_filter: env::var("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Parsed origin
    ///
    /// # Errors
    ///
    /// Returns a validation error when `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| StorefrontError::validation(format!("Invalid BOXOFFICE_ORIGIN '{}': {e}", self.origin)))
    }
}
