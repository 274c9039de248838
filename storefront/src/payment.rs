//! Payment dispatch: provider input, initiation payloads and replies, session status.

use crate::error::{Result, StorefrontError};
use crate::types::{OrderId, PaymentProvider};
use serde::{Deserialize, Serialize};
use url::Url;

/// Fewest digits an M-Pesa phone number may have
pub const MIN_PHONE_LENGTH: usize = 10;

fn digit_count(phone_number: &str) -> usize {
    phone_number.chars().filter(char::is_ascii_digit).count()
}

/// Local input collected for the chosen provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderInput {
    /// M-Pesa needs the phone that receives the STK push
    Mpesa {
        /// Phone number as typed
        phone_number: String,
    },
    /// Stripe needs nothing local
    Stripe,
    /// Paystack needs nothing local
    Paystack,
}

impl Default for ProviderInput {
    fn default() -> Self {
        Self::Mpesa {
            phone_number: String::new(),
        }
    }
}

impl ProviderInput {
    /// The provider this input is for
    #[must_use]
    pub const fn provider(&self) -> PaymentProvider {
        match self {
            Self::Mpesa { .. } => PaymentProvider::Mpesa,
            Self::Stripe => PaymentProvider::Stripe,
            Self::Paystack => PaymentProvider::Paystack,
        }
    }

    /// Check local input without building anything
    ///
    /// # Errors
    ///
    /// Returns a validation error for an M-Pesa phone shorter than [`MIN_PHONE_LENGTH`].
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Mpesa { phone_number } if digit_count(phone_number) < MIN_PHONE_LENGTH => {
                Err(StorefrontError::validation(
                    "Please enter a valid phone number (at least 10 digits)",
                ))
            },
            _ => Ok(()),
        }
    }

    /// Initiation body for `order_id`
    ///
    /// Redirect providers get success and cancel URLs on `origin`.
    ///
    /// # Errors
    ///
    /// Returns the [`ProviderInput::validate`] error, or a validation error if
    /// `origin` cannot carry paths.
    pub fn payload(&self, order_id: OrderId, origin: &Url) -> Result<PaymentPayload> {
        self.validate()?;

        match self {
            Self::Mpesa { phone_number } => Ok(PaymentPayload::Mpesa {
                phone_number: phone_number.trim().to_owned(),
            }),
            Self::Stripe | Self::Paystack => {
                let return_url = |path: &str| -> Result<Url> {
                    let mut url = origin
                        .join(path)
                        .map_err(|e| StorefrontError::validation(format!("Invalid origin: {e}")))?;
                    url.query_pairs_mut()
                        .append_pair("orderId", &order_id.to_string());
                    Ok(url)
                };

                Ok(PaymentPayload::Redirect {
                    success_url: return_url("/payment/success")?,
                    cancel_url: return_url("/payment/cancel")?,
                })
            },
        }
    }
}

/// `POST /payments/initiate/{orderId}` body
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PaymentPayload {
    /// `{phoneNumber}`
    #[serde(rename_all = "camelCase")]
    Mpesa {
        /// Phone receiving the STK push
        phone_number: String,
    },
    /// `{successUrl, cancelUrl}`
    #[serde(rename_all = "camelCase")]
    Redirect {
        /// Where the provider sends the browser after paying
        success_url: Url,
        /// Where the provider sends the browser on abandon
        cancel_url: Url,
    },
}

/// What an accepted initiation asks the client to do next
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Initiation {
    /// Stay on the page and poll for settlement
    AwaitSettlement,
    /// Leave for the provider's page
    Redirect(Url),
}

/// Interpret an initiation reply for `provider`
///
/// Stripe replies carry `url`; Paystack replies carry `data.authorization_url`.
///
/// # Errors
///
/// Returns a provider error when a redirect provider's reply has no usable URL.
pub fn parse_initiation(provider: PaymentProvider, reply: &serde_json::Value) -> Result<Initiation> {
    let (raw, missing) = match provider {
        PaymentProvider::Mpesa => return Ok(Initiation::AwaitSettlement),
        PaymentProvider::Stripe => (reply.get("url"), "Failed to get Stripe checkout URL"),
        PaymentProvider::Paystack => (
            reply.get("data").and_then(|data| data.get("authorization_url")),
            "Failed to get Paystack authorization URL",
        ),
    };

    raw.and_then(serde_json::Value::as_str)
        .and_then(|url| Url::parse(url).ok())
        .map(Initiation::Redirect)
        .ok_or_else(|| StorefrontError::Provider(missing.to_owned()))
}

/// `GET /payments/status/{orderId}` reply
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Whether the order has been paid
    pub paid: bool,
}

/// Where one payment attempt stands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PaymentStatus {
    /// Nothing in flight
    #[default]
    Idle,
    /// Order creation or initiation in flight
    Dispatching,
    /// Waiting for settlement
    Processing,
    /// Browser sent to the provider
    Redirected {
        /// Provider page
        url: Url,
    },
    /// Settled
    Succeeded,
    /// Attempt failed
    Failed {
        /// Message shown to the user
        message: String,
    },
    /// Settlement never confirmed
    TimedOut,
}

impl PaymentStatus {
    /// Whether another dispatch must be refused
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Dispatching | Self::Processing)
    }

    /// Whether the user may go back to idle and try again
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut)
    }

    /// Whether the order contents are frozen (submitted, paid or handed off)
    #[must_use]
    pub const fn locks_order(&self) -> bool {
        matches!(
            self,
            Self::Dispatching | Self::Processing | Self::Succeeded | Self::Redirected { .. }
        )
    }

    /// Short label for logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Dispatching => "DISPATCHING",
            Self::Processing => "PROCESSING",
            Self::Redirected { .. } => "REDIRECTED",
            Self::Succeeded => "SUCCESS",
            Self::Failed { .. } => "FAILED",
            Self::TimedOut => "TIMEOUT",
        }
    }
}

/// One checkout screen's payment session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentSession {
    /// Backend order, once created; reused by retries
    pub order_id: Option<OrderId>,
    /// Provider of the current attempt
    pub provider: Option<PaymentProvider>,
    /// Attempt status
    pub status: PaymentStatus,
}
