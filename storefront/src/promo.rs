//! Promo engine.
//!
//! The backend validates codes and computes the discount that is charged. The
//! client only normalises input, keeps the one active application and re-derives
//! the discount for display when the cart changes after validation.

use crate::error::{Result, StorefrontError};
use crate::types::{EventId, Money, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a promo discounts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `value` percent of the subtotal
    Percentage,
    /// A flat `value`
    FixedAmount,
}

/// `POST /promo/validate` body
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoValidationRequest {
    /// Normalised code
    pub code: String,
    /// Event the order is for
    pub event_id: EventId,
    /// Cart subtotal at validation time
    pub subtotal: Money,
    /// Products in the cart
    pub product_ids: Vec<ProductId>,
}

/// `POST /promo/validate` reply
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoValidation {
    /// Whether the code applies
    pub valid: bool,
    /// Discount computed by the backend
    #[serde(default)]
    pub discount_amount: Option<Money>,
    /// Discount kind
    #[serde(default)]
    pub discount_type: Option<DiscountType>,
    /// Percentage or flat amount
    #[serde(default)]
    pub discount_value: Option<Decimal>,
    /// Percentage cap
    #[serde(default)]
    pub max_discount_amount: Option<Money>,
    /// Canonical code
    #[serde(default)]
    pub code: Option<String>,
    /// Human description
    #[serde(default)]
    pub description: Option<String>,
    /// Rejection reason
    #[serde(default)]
    pub error: Option<String>,
}

/// Trim and uppercase a code, rejecting blank input
///
/// # Errors
///
/// Returns a validation error for an empty code.
pub fn normalize_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(StorefrontError::validation("Please enter a promo code"));
    }
    Ok(code)
}

/// Client-side discount for redisplay
///
/// Percentage discounts are rounded to two places and capped at `cap`; every
/// result is bounded by `[0, subtotal]`.
#[must_use]
pub fn compute_discount(
    discount_type: DiscountType,
    value: Decimal,
    subtotal: Money,
    cap: Option<Money>,
) -> Money {
    let raw = match discount_type {
        DiscountType::Percentage => {
            let amount = Money::new((subtotal.amount() * value / Decimal::ONE_HUNDRED).round_dp(2));
            cap.map_or(amount, |cap| amount.min(cap))
        },
        DiscountType::FixedAmount => Money::new(value),
    };
    raw.clamp_to(subtotal)
}

/// `subtotal − discount`, floored at zero
#[must_use]
pub fn total(subtotal: Money, promo: Option<&PromoApplication>) -> Money {
    subtotal.saturating_sub(promo.map_or(Money::ZERO, |p| p.discount_for(subtotal)))
}

/// The single promo active on an order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromoApplication {
    /// Uppercased code
    pub code: String,
    /// Discount kind
    pub discount_type: DiscountType,
    /// Percentage or flat amount
    pub discount_value: Decimal,
    /// Discount reported by the backend for `validated_subtotal`
    pub discount_amount: Money,
    /// Percentage cap, if any
    pub max_discount_amount: Option<Money>,
    /// Human description
    pub description: Option<String>,
    /// Subtotal the backend validated against
    pub validated_subtotal: Money,
}

impl PromoApplication {
    /// Turn a backend reply into an application
    ///
    /// # Errors
    ///
    /// Returns a rejection carrying the backend's message when the code is not valid.
    pub fn from_validation(code: &str, validation: PromoValidation, subtotal: Money) -> Result<Self> {
        if !validation.valid {
            return Err(StorefrontError::rejected(
                validation
                    .error
                    .unwrap_or_else(|| "Invalid promo code".to_owned()),
            ));
        }

        let discount_type = validation.discount_type.unwrap_or(DiscountType::FixedAmount);
        let discount_value = validation.discount_value.unwrap_or_default();
        let discount_amount = validation.discount_amount.unwrap_or_else(|| {
            compute_discount(discount_type, discount_value, subtotal, validation.max_discount_amount)
        });

        Ok(Self {
            code: validation.code.unwrap_or_else(|| code.to_owned()),
            discount_type,
            discount_value,
            discount_amount: discount_amount.clamp_to(subtotal),
            max_discount_amount: validation.max_discount_amount,
            description: validation.description,
            validated_subtotal: subtotal,
        })
    }

    /// Discount to display against `subtotal`
    ///
    /// The backend amount is shown as-is while the subtotal is the one it was
    /// validated against; after the cart changes the amount is re-derived
    /// locally until checkout, where the backend recomputes it.
    #[must_use]
    pub fn discount_for(&self, subtotal: Money) -> Money {
        if subtotal == self.validated_subtotal {
            self.discount_amount
        } else {
            compute_discount(
                self.discount_type,
                self.discount_value,
                subtotal,
                self.max_discount_amount,
            )
        }
    }
}
