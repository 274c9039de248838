//! The backend as seen by the storefront.
//!
//! Reducers and services only ever talk to `dyn StorefrontApi`. Production wires
//! in [`RestClient`](crate::api::RestClient); tests use
//! [`MockStorefrontApi`](crate::mock::MockStorefrontApi).

use crate::api::ApiError;
use crate::catalog::{EventDetails, Product, TicketTier};
use crate::gates::lottery::LotteryStats;
use crate::order::{Order, OrderRequest};
use crate::payment::{PaymentPayload, SettlementReport};
use crate::promo::{PromoValidation, PromoValidationRequest};
use crate::types::{EventId, OrderId, TierId};
use async_trait::async_trait;

/// Result type for backend calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Backend operations consumed by the storefront core
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// `GET /events/{id}`
    async fn event(&self, event_id: EventId) -> ApiResult<EventDetails>;

    /// `GET /events/{id}/tiers`
    async fn tiers(&self, event_id: EventId) -> ApiResult<Vec<TicketTier>>;

    /// `GET /products?eventId=`
    async fn products(&self, event_id: EventId) -> ApiResult<Vec<Product>>;

    /// `POST /orders/checkout`, `POST /orders/adopt` or `POST /orders/{id}/top-up`
    async fn create_order(&self, request: &OrderRequest) -> ApiResult<Order>;

    /// `POST /promo/validate`
    async fn validate_promo(&self, request: &PromoValidationRequest) -> ApiResult<PromoValidation>;

    /// `POST /payments/initiate/{orderId}`
    ///
    /// The response shape depends on the provider, so it is returned untyped.
    async fn initiate_payment(
        &self,
        order_id: OrderId,
        payload: &PaymentPayload,
    ) -> ApiResult<serde_json::Value>;

    /// `GET /payments/status/{orderId}`
    async fn payment_status(&self, order_id: OrderId) -> ApiResult<SettlementReport>;

    /// `GET /payments/paystack/verify/{reference}`, returns `success`
    async fn verify_paystack(&self, reference: &str) -> ApiResult<bool>;

    /// `GET /lottery/eligible/{eventId}`
    async fn lottery_eligibility(&self, event_id: EventId) -> ApiResult<bool>;

    /// `POST /lottery/enter/{eventId}`
    async fn enter_lottery(&self, event_id: EventId) -> ApiResult<()>;

    /// `GET /lottery/event/{id}/stats`
    async fn lottery_stats(&self, event_id: EventId) -> ApiResult<LotteryStats>;

    /// `POST /waitlist`
    async fn join_waitlist(&self, event_id: EventId, tier_id: TierId, email: &str) -> ApiResult<()>;

    /// `POST /events/{id}/verify-access`, returns `valid`
    async fn verify_access(&self, event_id: EventId, code: &str) -> ApiResult<bool>;
}
