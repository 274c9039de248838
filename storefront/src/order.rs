//! Order builder.
//!
//! Turns a cart (or an adoption or top-up intent) into the request that creates
//! a backend order. Every check here runs before any network call.

use crate::cart::Cart;
use crate::error::{Result, StorefrontError};
use crate::promo::PromoApplication;
use crate::types::{EventId, Money, OrderId, PaymentProvider, ProductId, TierId};
use serde::{Deserialize, Serialize};

/// `{tierId, quantity}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketLine {
    /// Tier
    pub tier_id: TierId,
    /// Units
    pub quantity: u32,
}

/// `{productId, quantity}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLine {
    /// Product
    pub product_id: ProductId,
    /// Units
    pub quantity: u32,
}

/// `POST /orders/checkout` body
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Event
    pub event_id: EventId,
    /// Ticket lines
    pub items: Vec<TicketLine>,
    /// Product lines
    pub products: Vec<ProductLine>,
    /// Provider
    pub payment_provider: PaymentProvider,
    /// Applied promo code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
}

/// `POST /orders/adopt` body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionRequest {
    /// Event
    pub event_id: EventId,
    /// Tier bought into the lottery pool
    pub tier_id: TierId,
    /// Units
    pub quantity: u32,
    /// Provider
    pub payment_provider: PaymentProvider,
}

/// `POST /orders/{orderId}/top-up` body (the order id travels in the path)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    /// Layaway order being paid down
    #[serde(skip)]
    pub order_id: OrderId,
    /// Instalment
    pub amount: Money,
    /// Provider
    pub payment_provider: PaymentProvider,
}

/// One checkout attempt's order request
///
/// Built once and never changed; a new attempt builds a new request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderRequest {
    /// Cart purchase
    Checkout(CheckoutRequest),
    /// Adopt-a-ticket purchase
    Adoption(AdoptionRequest),
    /// Layaway instalment
    TopUp(TopUpRequest),
}

impl OrderRequest {
    /// Provider the order will be paid with
    #[must_use]
    pub const fn provider(&self) -> PaymentProvider {
        match self {
            Self::Checkout(r) => r.payment_provider,
            Self::Adoption(r) => r.payment_provider,
            Self::TopUp(r) => r.payment_provider,
        }
    }

    /// Endpoint path, relative to the API base
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Checkout(_) => "/orders/checkout".to_owned(),
            Self::Adoption(_) => "/orders/adopt".to_owned(),
            Self::TopUp(r) => format!("/orders/{}/top-up", r.order_id),
        }
    }

    /// JSON body
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which only happens for non-finite amounts.
    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Checkout(r) => serde_json::to_value(r),
            Self::Adoption(r) => serde_json::to_value(r),
            Self::TopUp(r) => serde_json::to_value(r),
        }
    }
}

/// Created order, as found under `order` in the reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order id
    pub id: OrderId,
    /// Backend status label
    #[serde(default)]
    pub status: Option<String>,
    /// Amount to be charged, after any promo
    #[serde(default)]
    pub total_amount: Option<Money>,
}

/// `{order}` envelope
#[derive(Clone, Debug, Deserialize)]
pub struct OrderEnvelope {
    /// The order
    pub order: Order,
}

/// Builds order requests
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderBuilder;

impl OrderBuilder {
    /// Cart checkout
    ///
    /// Lines are taken from the cart as they stand; prices are never sent.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the cart holds no tickets and no products.
    pub fn checkout(
        event_id: EventId,
        cart: &Cart,
        promo: Option<&PromoApplication>,
        payment_provider: PaymentProvider,
    ) -> Result<OrderRequest> {
        if cart.is_empty() {
            return Err(StorefrontError::validation(
                "Please select at least one ticket or product",
            ));
        }

        Ok(OrderRequest::Checkout(CheckoutRequest {
            event_id,
            items: cart
                .tickets()
                .map(|(tier_id, quantity)| TicketLine { tier_id, quantity })
                .collect(),
            products: cart
                .products()
                .map(|(product_id, quantity)| ProductLine {
                    product_id,
                    quantity,
                })
                .collect(),
            payment_provider,
            promo_code: promo.map(|p| p.code.clone()),
        }))
    }

    /// Adopt-a-ticket purchase
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero quantity.
    pub fn adoption(
        event_id: EventId,
        tier_id: TierId,
        quantity: u32,
        payment_provider: PaymentProvider,
    ) -> Result<OrderRequest> {
        if quantity == 0 {
            return Err(StorefrontError::validation("Please adopt at least one ticket"));
        }

        Ok(OrderRequest::Adoption(AdoptionRequest {
            event_id,
            tier_id,
            quantity,
            payment_provider,
        }))
    }

    /// Layaway instalment
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `amount` is positive.
    pub fn top_up(
        order_id: OrderId,
        amount: Money,
        payment_provider: PaymentProvider,
    ) -> Result<OrderRequest> {
        if !amount.is_positive() {
            return Err(StorefrontError::validation("Please enter an amount greater than zero"));
        }

        Ok(OrderRequest::TopUp(TopUpRequest {
            order_id,
            amount,
            payment_provider,
        }))
    }
}
