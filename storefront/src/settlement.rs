//! Settlement poller for providers that settle while the buyer stays on the page.
//!
//! The poller owns its attempt counter. Each tick waits one interval, asks for
//! the payment status once and only then decides whether to tick again, so
//! status checks never overlap. Polling stops when the future is dropped; the
//! checkout registers it as a cancellable effect, so cancelling that effect or
//! disposing the store ends the poll between two checks.

use crate::gateway::StorefrontApi;
use crate::types::OrderId;
use std::sync::Arc;
use std::time::Duration;

/// Time between status checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Status checks before giving up
pub const MAX_POLL_ATTEMPTS: u32 = 30;

/// How a poll ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Backend reported the order paid
    Paid {
        /// Status checks made, including the one that saw it paid
        attempts: u32,
    },
    /// Every attempt came back unpaid or failed
    TimedOut {
        /// Status checks made
        attempts: u32,
    },
}

/// Polls `GET /payments/status/{orderId}`
#[derive(Clone)]
pub struct SettlementPoller {
    api: Arc<dyn StorefrontApi>,
    interval: Duration,
    max_attempts: u32,
}

impl SettlementPoller {
    /// Poller with the standard cadence
    #[must_use]
    pub fn new(api: Arc<dyn StorefrontApi>) -> Self {
        Self {
            api,
            interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }

    /// Override the cadence
    #[must_use]
    pub const fn with_cadence(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Attempt bound
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll until paid or out of attempts
    #[tracing::instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub async fn run(&self, order_id: OrderId) -> SettlementOutcome {
        let mut attempts = 0;

        loop {
            tokio::time::sleep(self.interval).await;

            attempts += 1;
            match self.api.payment_status(order_id).await {
                Ok(report) if report.paid => {
                    tracing::info!(attempts, "Payment settled");
                    return SettlementOutcome::Paid { attempts };
                },
                Ok(_) => tracing::trace!(attempts, "Payment not settled yet"),
                Err(error) => tracing::warn!(attempts, %error, "Payment status check failed"),
            }

            if attempts >= self.max_attempts {
                tracing::info!(attempts, "Payment settlement timed out");
                return SettlementOutcome::TimedOut { attempts };
            }
        }
    }
}
