//! Sale-window gate: is a tier purchasable right now?

use crate::catalog::TicketTier;
use crate::error::{Result, StorefrontError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability of one tier at one instant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    /// Inside the window with stock left
    Available,
    /// Window not open yet
    Upcoming,
    /// Window closed
    Ended,
    /// No stock left; the buyer is offered the waitlist
    SoldOut,
}

impl SaleStatus {
    /// Whether the tier may enter a cart
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }

    /// Reason shown when the gate blocks
    #[must_use]
    pub const fn reason(self) -> Option<&'static str> {
        match self {
            Self::Available => None,
            Self::Upcoming => Some("Sales for this ticket have not started yet"),
            Self::Ended => Some("Sales for this ticket have ended"),
            Self::SoldOut => Some("This ticket is sold out"),
        }
    }

    /// `Ok` when available, otherwise a rejection with [`SaleStatus::reason`]
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Rejected`] for every status but `Available`.
    pub fn admit(self) -> Result<()> {
        self.reason()
            .map_or(Ok(()), |reason| Err(StorefrontError::rejected(reason)))
    }
}

/// Classify `tier` at `now`
///
/// Missing bounds are open. The window is checked before stock, so a tier that
/// has not opened yet reads as upcoming even with zero stock.
#[must_use]
pub fn sale_status(tier: &TicketTier, now: DateTime<Utc>) -> SaleStatus {
    if tier.sales_start.is_some_and(|start| now < start) {
        SaleStatus::Upcoming
    } else if tier.sales_end.is_some_and(|end| now > end) {
        SaleStatus::Ended
    } else if tier.remaining_quantity == 0 {
        SaleStatus::SoldOut
    } else {
        SaleStatus::Available
    }
}
