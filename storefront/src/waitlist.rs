//! Waitlist sign-up for sold-out tiers.

use crate::error::{Result, StorefrontError};
use crate::gateway::StorefrontApi;
use crate::types::{EventId, TierId};
use std::sync::Arc;

/// Message shown once the backend acknowledges the sign-up
pub const JOINED_MESSAGE: &str = "You're on the waitlist! We'll email you if tickets become available.";

/// Joins waitlists; keeps no local record of what was joined
#[derive(Clone)]
pub struct WaitlistClient {
    api: Arc<dyn StorefrontApi>,
}

impl WaitlistClient {
    /// Client over `api`
    #[must_use]
    pub fn new(api: Arc<dyn StorefrontApi>) -> Self {
        Self { api }
    }

    /// Join the waitlist for `tier_id`
    ///
    /// Duplicate sign-ups are the backend's call.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank or malformed email, or the backend error.
    #[tracing::instrument(skip(self, email))]
    pub async fn join(&self, event_id: EventId, tier_id: TierId, email: &str) -> Result<String> {
        let email = email.trim();
        if email.is_empty() {
            return Err(StorefrontError::validation("Please enter your email address"));
        }
        if !email.contains('@') {
            return Err(StorefrontError::validation("Please enter a valid email address"));
        }

        self.api.join_waitlist(event_id, tier_id, email).await?;
        tracing::info!("Joined waitlist");
        Ok(JOINED_MESSAGE.to_owned())
    }
}
