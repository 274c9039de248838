//! In-memory backend for development and tests.
//!
//! Every call is recorded so tests can assert on exactly what reached the
//! backend (for example, that a double submit produced a single order).

use crate::api::ApiError;
use crate::catalog::{EventDetails, Product, TicketTier};
use crate::gateway::{ApiResult, StorefrontApi};
use crate::gates::lottery::LotteryStats;
use crate::order::{Order, OrderRequest};
use crate::payment::{PaymentPayload, SettlementReport};
use crate::promo::{PromoValidation, PromoValidationRequest};
use crate::types::{EventId, OrderId, TierId};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A call that reached the mock backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    /// `GET /events/{id}`
    Event(EventId),
    /// `GET /events/{id}/tiers`
    Tiers(EventId),
    /// `GET /products`
    Products(EventId),
    /// Order creation
    CreateOrder(OrderRequest),
    /// `POST /promo/validate`
    ValidatePromo(PromoValidationRequest),
    /// `POST /payments/initiate/{orderId}`
    InitiatePayment {
        /// Order
        order_id: OrderId,
        /// Body
        payload: PaymentPayload,
    },
    /// `GET /payments/status/{orderId}`
    PaymentStatus(OrderId),
    /// `GET /payments/paystack/verify/{reference}`
    VerifyPaystack(String),
    /// `GET /lottery/eligible/{eventId}`
    LotteryEligibility(EventId),
    /// `POST /lottery/enter/{eventId}`
    EnterLottery(EventId),
    /// `GET /lottery/event/{id}/stats`
    LotteryStats(EventId),
    /// `POST /waitlist`
    JoinWaitlist {
        /// Event
        event_id: EventId,
        /// Tier
        tier_id: TierId,
        /// Email
        email: String,
    },
    /// `POST /events/{id}/verify-access`
    VerifyAccess {
        /// Event
        event_id: EventId,
        /// Submitted code
        code: String,
    },
}

#[derive(Debug)]
struct MockState {
    event: Option<EventDetails>,
    tiers: Vec<TicketTier>,
    products: Vec<Product>,
    order_id: OrderId,
    create_order_error: Option<ApiError>,
    promo: PromoValidation,
    initiation: Option<serde_json::Value>,
    initiation_error: Option<ApiError>,
    paid_on_status_check: Option<u32>,
    failing_status_checks: HashSet<u32>,
    paystack_verified: bool,
    lottery_eligible: bool,
    lottery_stats: LotteryStats,
    access_code: Option<String>,
    calls: Vec<ApiCall>,
}

/// Scriptable in-memory [`StorefrontApi`]
#[derive(Debug)]
pub struct MockStorefrontApi {
    state: Mutex<MockState>,
}

impl Default for MockStorefrontApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStorefrontApi {
    /// A backend that accepts orders, never reports a payment as settled and
    /// hands out provider URLs for redirect initiations
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                event: None,
                tiers: Vec::new(),
                products: Vec::new(),
                order_id: OrderId::new(),
                create_order_error: None,
                promo: PromoValidation {
                    valid: false,
                    error: Some("Invalid promo code".to_owned()),
                    ..PromoValidation::default()
                },
                initiation: None,
                initiation_error: None,
                paid_on_status_check: None,
                failing_status_checks: HashSet::new(),
                paystack_verified: true,
                lottery_eligible: true,
                lottery_stats: LotteryStats::default(),
                access_code: None,
                calls: Vec::new(),
            }),
        }
    }

    /// Wrap in an `Arc<dyn StorefrontApi>` while keeping a typed handle
    #[must_use]
    pub fn shared(self) -> (Arc<Self>, Arc<dyn StorefrontApi>) {
        let typed = Arc::new(self);
        let api: Arc<dyn StorefrontApi> = Arc::clone(&typed) as Arc<dyn StorefrontApi>;
        (typed, api)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ApiCall) -> MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    fn not_found(what: &str) -> ApiError {
        ApiError::Api {
            status: 404,
            message: format!("{what} not found"),
        }
    }

    /// Serve this catalog
    #[must_use]
    pub fn with_catalog(self, event: EventDetails, tiers: Vec<TicketTier>, products: Vec<Product>) -> Self {
        {
            let mut state = self.lock();
            state.event = Some(event);
            state.tiers = tiers;
            state.products = products;
        }
        self
    }

    /// Reply to every promo validation with `validation`
    #[must_use]
    pub fn with_promo(self, validation: PromoValidation) -> Self {
        self.lock().promo = validation;
        self
    }

    /// Reply to every initiation with `reply`
    #[must_use]
    pub fn with_initiation(self, reply: serde_json::Value) -> Self {
        self.lock().initiation = Some(reply);
        self
    }

    /// Fail every initiation
    #[must_use]
    pub fn failing_initiation(self, error: ApiError) -> Self {
        self.lock().initiation_error = Some(error);
        self
    }

    /// Fail every order creation
    #[must_use]
    pub fn failing_create_order(self, error: ApiError) -> Self {
        self.lock().create_order_error = Some(error);
        self
    }

    /// Report paid from the `n`th status check on (1-based)
    #[must_use]
    pub fn paid_on_status_check(self, n: u32) -> Self {
        self.lock().paid_on_status_check = Some(n);
        self
    }

    /// Make these status checks (1-based) fail with a transport error
    #[must_use]
    pub fn failing_status_checks(self, checks: impl IntoIterator<Item = u32>) -> Self {
        self.lock().failing_status_checks.extend(checks);
        self
    }

    /// Outcome of Paystack verification
    #[must_use]
    pub fn with_paystack_verification(self, success: bool) -> Self {
        self.lock().paystack_verified = success;
        self
    }

    /// Lottery eligibility reply
    #[must_use]
    pub fn with_lottery_eligibility(self, eligible: bool) -> Self {
        self.lock().lottery_eligible = eligible;
        self
    }

    /// Lottery stats reply
    #[must_use]
    pub fn with_lottery_stats(self, stats: LotteryStats) -> Self {
        self.lock().lottery_stats = stats;
        self
    }

    /// The one code that unlocks private events
    #[must_use]
    pub fn with_access_code(self, code: impl Into<String>) -> Self {
        self.lock().access_code = Some(code.into());
        self
    }

    /// Id every created order gets
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        self.lock().order_id
    }

    /// Every call so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of order creations
    #[must_use]
    pub fn create_order_calls(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::CreateOrder(_)))
    }

    /// Number of payment initiations
    #[must_use]
    pub fn initiate_calls(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::InitiatePayment { .. }))
    }

    /// Number of settlement status checks
    #[must_use]
    pub fn status_checks(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::PaymentStatus(_)))
    }

    /// Number of promo validations
    #[must_use]
    pub fn promo_calls(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::ValidatePromo(_)))
    }
}

#[async_trait]
impl StorefrontApi for MockStorefrontApi {
    async fn event(&self, event_id: EventId) -> ApiResult<EventDetails> {
        self.record(ApiCall::Event(event_id))
            .event
            .clone()
            .filter(|e| e.id == event_id)
            .ok_or_else(|| Self::not_found("Event"))
    }

    async fn tiers(&self, event_id: EventId) -> ApiResult<Vec<TicketTier>> {
        Ok(self.record(ApiCall::Tiers(event_id)).tiers.clone())
    }

    async fn products(&self, event_id: EventId) -> ApiResult<Vec<Product>> {
        Ok(self.record(ApiCall::Products(event_id)).products.clone())
    }

    async fn create_order(&self, request: &OrderRequest) -> ApiResult<Order> {
        let state = self.record(ApiCall::CreateOrder(request.clone()));
        if let Some(error) = &state.create_order_error {
            return Err(error.clone());
        }
        Ok(Order {
            id: state.order_id,
            status: Some("PENDING".to_owned()),
            total_amount: None,
        })
    }

    async fn validate_promo(&self, request: &PromoValidationRequest) -> ApiResult<PromoValidation> {
        Ok(self.record(ApiCall::ValidatePromo(request.clone())).promo.clone())
    }

    async fn initiate_payment(
        &self,
        order_id: OrderId,
        payload: &PaymentPayload,
    ) -> ApiResult<serde_json::Value> {
        let state = self.record(ApiCall::InitiatePayment {
            order_id,
            payload: payload.clone(),
        });
        if let Some(error) = &state.initiation_error {
            return Err(error.clone());
        }
        if let Some(reply) = &state.initiation {
            return Ok(reply.clone());
        }
        Ok(match payload {
            PaymentPayload::Mpesa { .. } => json!({"success": true}),
            PaymentPayload::Redirect { .. } => json!({
                "url": "https://checkout.stripe.com/c/pay/cs_mock",
                "data": {"authorization_url": "https://checkout.paystack.com/mock"},
            }),
        })
    }

    async fn payment_status(&self, order_id: OrderId) -> ApiResult<SettlementReport> {
        let mut state = self.record(ApiCall::PaymentStatus(order_id));
        let check = u32::try_from(
            state
                .calls
                .iter()
                .filter(|c| matches!(c, ApiCall::PaymentStatus(_)))
                .count(),
        )
        .unwrap_or(u32::MAX);

        if state.failing_status_checks.remove(&check) {
            return Err(ApiError::RequestFailed("connection reset".to_owned()));
        }
        Ok(SettlementReport {
            paid: state.paid_on_status_check.is_some_and(|n| check >= n),
        })
    }

    async fn verify_paystack(&self, reference: &str) -> ApiResult<bool> {
        Ok(self.record(ApiCall::VerifyPaystack(reference.to_owned())).paystack_verified)
    }

    async fn lottery_eligibility(&self, event_id: EventId) -> ApiResult<bool> {
        Ok(self.record(ApiCall::LotteryEligibility(event_id)).lottery_eligible)
    }

    async fn enter_lottery(&self, event_id: EventId) -> ApiResult<()> {
        let mut state = self.record(ApiCall::EnterLottery(event_id));
        if !state.lottery_eligible {
            return Err(ApiError::Api {
                status: 409,
                message: "You have already entered this lottery".to_owned(),
            });
        }
        state.lottery_eligible = false;
        state.lottery_stats.total_entries += 1;
        Ok(())
    }

    async fn lottery_stats(&self, event_id: EventId) -> ApiResult<LotteryStats> {
        Ok(self.record(ApiCall::LotteryStats(event_id)).lottery_stats)
    }

    async fn join_waitlist(&self, event_id: EventId, tier_id: TierId, email: &str) -> ApiResult<()> {
        drop(self.record(ApiCall::JoinWaitlist {
            event_id,
            tier_id,
            email: email.to_owned(),
        }));
        Ok(())
    }

    async fn verify_access(&self, event_id: EventId, code: &str) -> ApiResult<bool> {
        let state = self.record(ApiCall::VerifyAccess {
            event_id,
            code: code.to_owned(),
        });
        Ok(state.access_code.as_deref() == Some(code))
    }
}
