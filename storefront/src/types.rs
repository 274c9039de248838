//! Value types shared across the storefront: identifiers, money, providers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for a ticket tier
    TierId
);
uuid_id!(
    /// Unique identifier for an add-on product
    ProductId
);
uuid_id!(
    /// Unique identifier for a backend order
    OrderId
);

/// Key of a cart line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineItem {
    /// A ticket tier
    Tier(TierId),
    /// An add-on product
    Product(ProductId),
}

impl fmt::Display for LineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tier(id) => write!(f, "tier:{id}"),
            Self::Product(id) => write!(f, "product:{id}"),
        }
    }
}

// ============================================================================
// Money
// ============================================================================

/// A price or amount
///
/// Prices carry no fixed minor unit, so the amount is an exact decimal. Amounts
/// are serialised as JSON numbers and accepted as numbers or numeric strings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(serialize_with = "rust_decimal::serde::float::serialize")] Decimal);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole units (e.g. `Money::from_major(1000)`)
    #[must_use]
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// The decimal amount
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the amount is strictly positive
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Price of `quantity` units
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Subtract, flooring the result at zero
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self((self.0 - other.0).max(Decimal::ZERO))
    }

    /// Clamp into `[0, ceiling]`
    #[must_use]
    pub fn clamp_to(self, ceiling: Self) -> Self {
        Self(self.0.max(Decimal::ZERO).min(ceiling.0.max(Decimal::ZERO)))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ============================================================================
// Payment providers
// ============================================================================

/// Payment provider an order is settled through
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    /// Mobile money, settled by STK push while the page polls
    Mpesa,
    /// Hosted checkout page
    Stripe,
    /// Hosted authorization page
    Paystack,
}

impl PaymentProvider {
    /// Whether the provider settles by sending the browser elsewhere
    #[must_use]
    pub const fn redirects(self) -> bool {
        matches!(self, Self::Stripe | Self::Paystack)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mpesa => "MPESA",
            Self::Stripe => "STRIPE",
            Self::Paystack => "PAYSTACK",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
