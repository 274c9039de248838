//! Checkout screen: cart, promo, payment dispatch and settlement in one reducer.
//!
//! One [`CheckoutState`] belongs to one checkout screen and is discarded with it.
//! Disposing the screen's store cancels the settlement poll registered under
//! [`SETTLEMENT_POLL`], so no reply lands in a screen that has gone away.
//!
//! From `Submit` until the attempt fails, the cart, promo and provider are
//! frozen. `Submit` waits for an outstanding promo check.
//!
//! Payment flow:
//!
//! ```text
//! Idle --Submit--> Dispatching --OrderCreated--> Dispatching --Initiated--> Processing | Redirected
//! Processing --SettlementConfirmed--> Succeeded --(2s)--> LeaveCheckout
//! Processing --SettlementTimedOut--> TimedOut
//! Dispatching --DispatchFailed--> Failed
//! Failed | TimedOut --Retry--> Idle (order id kept)
//! ```

use crate::catalog::Catalog;
use crate::cart::Cart;
use crate::gates::sale_window::{sale_status, SaleStatus};
use crate::gateway::StorefrontApi;
use crate::order::{OrderBuilder, OrderRequest};
use crate::payment::{parse_initiation, Initiation, PaymentSession, PaymentStatus, ProviderInput};
use crate::promo::{self, normalize_code, PromoApplication, PromoValidationRequest};
use crate::settlement::{SettlementOutcome, SettlementPoller};
use crate::types::{EventId, LineItem, Money, OrderId, PaymentProvider, TierId};
use boxoffice_core::{
    async_effect, delay,
    effect::{Effect, EffectId},
    environment::Clock,
    reducer::Reducer,
    smallvec, SmallVec,
};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Registration id of the settlement poll
pub const SETTLEMENT_POLL: EffectId = EffectId::new("checkout.settlement-poll");

/// Pause on the success state before leaving checkout
pub const SUCCESS_REDIRECT_DELAY: Duration = Duration::from_secs(2);

type Effects = SmallVec<[Effect<CheckoutAction>; 4]>;

/// Where the screen should go next
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// The buyer's tickets page
    MyTickets,
    /// A provider page (full-page redirect)
    External(Url),
}

/// What this checkout is buying
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Purchase {
    /// Whatever is in the cart
    Cart,
    /// Tickets gifted to the lottery pool
    Adoption {
        /// Tier adopted
        tier_id: TierId,
        /// Units
        quantity: u32,
    },
    /// An instalment on a layaway order
    TopUp {
        /// Layaway order
        order_id: OrderId,
        /// Instalment
        amount: Money,
    },
}

/// Checkout screen state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutState {
    /// Catalog snapshot the cart is priced against
    pub catalog: Catalog,
    /// What is being bought
    pub purchase: Purchase,
    /// Selected lines
    pub cart: Cart,
    /// Active promo
    pub promo: Option<PromoApplication>,
    /// A promo validation is in flight
    pub promo_pending: bool,
    /// Last promo error
    pub promo_error: Option<String>,
    /// Chosen provider and its local input
    pub provider_input: ProviderInput,
    /// Current payment attempt
    pub payment: PaymentSession,
    /// Inline message (validation or gate)
    pub notice: Option<String>,
    /// Sold-out tier the buyer was offered the waitlist for
    pub waitlist_tier: Option<TierId>,
    /// Pending navigation
    pub navigation: Option<Navigation>,
}

impl CheckoutState {
    fn with_purchase(catalog: Catalog, purchase: Purchase) -> Self {
        Self {
            catalog,
            purchase,
            cart: Cart::new(),
            promo: None,
            promo_pending: false,
            promo_error: None,
            provider_input: ProviderInput::default(),
            payment: PaymentSession::default(),
            notice: None,
            waitlist_tier: None,
            navigation: None,
        }
    }

    /// Cart checkout
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self::with_purchase(catalog, Purchase::Cart)
    }

    /// Adoption checkout
    #[must_use]
    pub fn adoption(catalog: Catalog, tier_id: TierId, quantity: u32) -> Self {
        Self::with_purchase(catalog, Purchase::Adoption { tier_id, quantity })
    }

    /// Layaway top-up checkout
    #[must_use]
    pub fn top_up(catalog: Catalog, order_id: OrderId, amount: Money) -> Self {
        Self::with_purchase(catalog, Purchase::TopUp { order_id, amount })
    }

    /// Event being bought for
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.catalog.event.id
    }

    /// Amount before discount
    #[must_use]
    pub fn subtotal(&self) -> Money {
        match &self.purchase {
            Purchase::Cart => self.cart.subtotal(&self.catalog),
            Purchase::Adoption { tier_id, quantity } => self
                .catalog
                .tier(*tier_id)
                .map_or(Money::ZERO, |t| t.price.times(*quantity)),
            Purchase::TopUp { amount, .. } => *amount,
        }
    }

    /// Discount currently shown
    #[must_use]
    pub fn discount(&self) -> Money {
        self.promo
            .as_ref()
            .map_or(Money::ZERO, |p| p.discount_for(self.subtotal()))
    }

    /// Amount shown as payable, never negative
    #[must_use]
    pub fn total(&self) -> Money {
        promo::total(self.subtotal(), self.promo.as_ref())
    }

    fn build_request(&self) -> crate::error::Result<OrderRequest> {
        let provider = self.provider_input.provider();
        match &self.purchase {
            Purchase::Cart => {
                OrderBuilder::checkout(self.event_id(), &self.cart, self.promo.as_ref(), provider)
            },
            Purchase::Adoption { tier_id, quantity } => {
                OrderBuilder::adoption(self.event_id(), *tier_id, *quantity, provider)
            },
            Purchase::TopUp { order_id, amount } => OrderBuilder::top_up(*order_id, *amount, provider),
        }
    }

    /// A changed order must not reuse the order created for the previous contents
    fn forget_order(&mut self) {
        if !self.payment.status.locks_order() {
            self.payment.order_id = None;
        }
    }
}

/// Checkout actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutAction {
    /// Change a cart line by `delta`
    AddLine {
        /// Line
        item: LineItem,
        /// Signed change
        delta: i32,
    },
    /// Take one unit off a line
    RemoveLine {
        /// Line
        item: LineItem,
    },
    /// Fresh catalog snapshot (caps and prices may have moved)
    CatalogRefreshed(Catalog),
    /// Submit a promo code
    ApplyPromo {
        /// Raw input
        code: String,
    },
    /// Backend accepted the promo
    PromoApplied(PromoApplication),
    /// Backend (or local validation) rejected the promo
    PromoRejected {
        /// Message shown as-is
        message: String,
    },
    /// Drop the active promo
    RemovePromo,
    /// Choose a provider and its input
    SelectProvider(ProviderInput),
    /// Pay
    Submit,
    /// Order created
    OrderCreated {
        /// Backend order id
        order_id: OrderId,
    },
    /// Provider accepted the initiation
    Initiated(Initiation),
    /// Order creation or initiation failed
    DispatchFailed {
        /// Message shown as-is
        message: String,
    },
    /// Poller saw the order paid
    SettlementConfirmed,
    /// Poller ran out of attempts
    SettlementTimedOut,
    /// Back to idle after a failure or timeout
    Retry,
    /// Returned from Paystack's page with a reference
    VerifyCallback {
        /// Paystack transaction reference
        reference: String,
    },
    /// Paystack verification reply
    CallbackVerified {
        /// Whether the payment was confirmed
        success: bool,
    },
    /// Leave checkout after success
    LeaveCheckout,
}

/// Checkout dependencies
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Backend
    pub api: Arc<dyn StorefrontApi>,
    /// Time source for sale windows
    pub clock: Arc<dyn Clock>,
    /// Origin used for provider return URLs
    pub origin: Url,
    /// Settlement poller
    pub poller: SettlementPoller,
}

impl CheckoutEnvironment {
    /// Environment with the standard poll cadence
    #[must_use]
    pub fn new(api: Arc<dyn StorefrontApi>, clock: Arc<dyn Clock>, origin: Url) -> Self {
        let poller = SettlementPoller::new(Arc::clone(&api));
        Self {
            api,
            clock,
            origin,
            poller,
        }
    }

    /// Replace the poller
    #[must_use]
    pub fn with_poller(mut self, poller: SettlementPoller) -> Self {
        self.poller = poller;
        self
    }
}

/// Checkout reducer
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new `CheckoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn change_line(state: &mut CheckoutState, item: LineItem, delta: i32, env: &CheckoutEnvironment) -> Effects {
        if state.purchase != Purchase::Cart || state.payment.status.locks_order() {
            tracing::debug!(%item, "Cart locked");
            return smallvec![Effect::None];
        }

        if let (LineItem::Tier(tier_id), true) = (item, delta > 0) {
            let Some(tier) = state.catalog.tier(tier_id) else {
                state.notice = Some("This ticket is no longer available".to_owned());
                return smallvec![Effect::None];
            };

            let status = sale_status(tier, env.clock.now());
            if let Err(rejection) = status.admit() {
                if status == SaleStatus::SoldOut {
                    state.waitlist_tier = Some(tier_id);
                }
                state.notice = Some(rejection.user_message());
                return smallvec![Effect::None];
            }
        }

        let before = state.cart.quantity(item);
        let cap = state.catalog.cap_of(item);
        state.cart = std::mem::take(&mut state.cart).add_line(item, delta, cap);
        let after = state.cart.quantity(item);

        state.notice = (delta > 0 && after == before && cap > 0)
            .then(|| format!("You can select at most {cap} of this item"));
        if after != before {
            state.forget_order();
        }
        smallvec![Effect::None]
    }

    fn create_order(request: OrderRequest, env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        let api = Arc::clone(&env.api);
        async_effect! {
            Some(match api.create_order(&request).await {
                Ok(order) => CheckoutAction::OrderCreated { order_id: order.id },
                Err(error) => CheckoutAction::DispatchFailed {
                    message: error.to_string(),
                },
            })
        }
    }

    fn initiate(state: &mut CheckoutState, order_id: OrderId, env: &CheckoutEnvironment) -> Effects {
        let payload = match state.provider_input.payload(order_id, &env.origin) {
            Ok(payload) => payload,
            Err(error) => {
                state.payment.status = PaymentStatus::Failed {
                    message: error.user_message(),
                };
                return smallvec![Effect::None];
            },
        };

        let provider = state.provider_input.provider();
        let api = Arc::clone(&env.api);
        smallvec![Effect::future(async move {
            Some(match api.initiate_payment(order_id, &payload).await {
                Ok(reply) => match parse_initiation(provider, &reply) {
                    Ok(initiation) => CheckoutAction::Initiated(initiation),
                    Err(error) => CheckoutAction::DispatchFailed {
                        message: error.user_message(),
                    },
                },
                Err(error) => CheckoutAction::DispatchFailed {
                    message: error.to_string(),
                },
            })
        })]
    }

    fn poll_settlement(order_id: OrderId, env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        let poller = env.poller.clone();
        let poll: Effect<CheckoutAction> = async_effect! {
            Some(match poller.run(order_id).await {
                SettlementOutcome::Paid { .. } => CheckoutAction::SettlementConfirmed,
                SettlementOutcome::TimedOut { .. } => CheckoutAction::SettlementTimedOut,
            })
        };
        poll.cancellable(SETTLEMENT_POLL)
    }

    fn succeed(state: &mut CheckoutState) -> Effects {
        state.payment.status = PaymentStatus::Succeeded;
        smallvec![delay! {
            duration: SUCCESS_REDIRECT_DELAY,
            action: CheckoutAction::LeaveCheckout
        }]
    }

    fn submit(state: &mut CheckoutState, env: &CheckoutEnvironment) -> Effects {
        match &state.payment.status {
            status if status.is_in_flight() => {
                tracing::debug!(status = status.label(), "Dispatch already in progress");
                return smallvec![Effect::None];
            },
            PaymentStatus::Succeeded | PaymentStatus::Redirected { .. } => {
                return smallvec![Effect::None];
            },
            _ => {},
        }

        if state.promo_pending {
            tracing::debug!("Promo check in progress");
            return smallvec![Effect::None];
        }

        if let Err(error) = state.provider_input.validate() {
            state.notice = Some(error.user_message());
            return smallvec![Effect::None];
        }

        let provider = state.provider_input.provider();

        // Retrying a failed attempt reuses the order
        if let Some(order_id) = state.payment.order_id {
            tracing::info!(%order_id, %provider, "Re-dispatching payment");
            state.notice = None;
            state.payment.provider = Some(provider);
            state.payment.status = PaymentStatus::Dispatching;
            return Self::initiate(state, order_id, env);
        }

        let request = match state.build_request() {
            Ok(request) => request,
            Err(error) => {
                state.notice = Some(error.user_message());
                return smallvec![Effect::None];
            },
        };

        tracing::info!(event_id = %state.event_id(), %provider, total = %state.total(), "Dispatching order");
        state.notice = None;
        state.payment.provider = Some(provider);
        state.payment.status = PaymentStatus::Dispatching;
        smallvec![Self::create_order(request, env)]
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(&self, state: &mut CheckoutState, action: CheckoutAction, env: &CheckoutEnvironment) -> Effects {
        match action {
            CheckoutAction::AddLine { item, delta } => Self::change_line(state, item, delta, env),

            CheckoutAction::RemoveLine { item } => Self::change_line(state, item, -1, env),

            CheckoutAction::CatalogRefreshed(catalog) => {
                state.cart = std::mem::take(&mut state.cart).reconcile(&catalog);
                state.catalog = catalog;
                smallvec![Effect::None]
            },

            CheckoutAction::ApplyPromo { code } => {
                if state.purchase != Purchase::Cart || state.promo_pending || state.payment.status.locks_order() {
                    return smallvec![Effect::None];
                }
                let code = match normalize_code(&code) {
                    Ok(code) => code,
                    Err(error) => {
                        state.promo_error = Some(error.user_message());
                        return smallvec![Effect::None];
                    },
                };

                state.promo_pending = true;
                state.promo_error = None;

                let subtotal = state.subtotal();
                let request = PromoValidationRequest {
                    code: code.clone(),
                    event_id: state.event_id(),
                    subtotal,
                    product_ids: state.cart.products().map(|(id, _)| id).collect(),
                };
                let api = Arc::clone(&env.api);
                smallvec![Effect::future(async move {
                    Some(match api.validate_promo(&request).await {
                        Ok(validation) => match PromoApplication::from_validation(&code, validation, subtotal) {
                            Ok(application) => CheckoutAction::PromoApplied(application),
                            Err(error) => CheckoutAction::PromoRejected {
                                message: error.user_message(),
                            },
                        },
                        Err(error) => CheckoutAction::PromoRejected {
                            message: error.to_string(),
                        },
                    })
                })]
            },

            CheckoutAction::PromoApplied(application) => {
                state.promo_pending = false;
                if state.payment.status.locks_order() {
                    tracing::debug!(code = %application.code, "Order locked, promo ignored");
                    return smallvec![Effect::None];
                }
                tracing::debug!(code = %application.code, discount = %application.discount_amount, "Promo applied");
                state.promo_error = None;
                state.promo = Some(application);
                state.forget_order();
                smallvec![Effect::None]
            },

            CheckoutAction::PromoRejected { message } => {
                state.promo_pending = false;
                state.promo_error = Some(message);
                smallvec![Effect::None]
            },

            CheckoutAction::RemovePromo => {
                if state.payment.status.locks_order() {
                    return smallvec![Effect::None];
                }
                if state.promo.take().is_some() {
                    state.forget_order();
                }
                state.promo_error = None;
                smallvec![Effect::None]
            },

            CheckoutAction::SelectProvider(input) => {
                if !state.payment.status.locks_order() {
                    // An order is created for one provider
                    if input.provider() != state.provider_input.provider() {
                        state.forget_order();
                    }
                    state.provider_input = input;
                    state.notice = None;
                }
                smallvec![Effect::None]
            },

            CheckoutAction::Submit => Self::submit(state, env),

            CheckoutAction::OrderCreated { order_id } => {
                if state.payment.status != PaymentStatus::Dispatching {
                    return smallvec![Effect::None];
                }
                tracing::info!(%order_id, "Order created");
                state.payment.order_id = Some(order_id);
                Self::initiate(state, order_id, env)
            },

            CheckoutAction::Initiated(initiation) => {
                if state.payment.status != PaymentStatus::Dispatching {
                    return smallvec![Effect::None];
                }
                match (initiation, state.payment.order_id) {
                    (Initiation::AwaitSettlement, Some(order_id)) => {
                        tracing::info!(%order_id, "Awaiting settlement");
                        state.payment.status = PaymentStatus::Processing;
                        smallvec![Self::poll_settlement(order_id, env)]
                    },
                    (Initiation::Redirect(url), _) => {
                        tracing::info!(%url, "Redirecting to provider");
                        state.navigation = Some(Navigation::External(url.clone()));
                        state.payment.status = PaymentStatus::Redirected { url };
                        smallvec![Effect::None]
                    },
                    (Initiation::AwaitSettlement, None) => {
                        state.payment.status = PaymentStatus::Failed {
                            message: "Payment could not be started".to_owned(),
                        };
                        smallvec![Effect::None]
                    },
                }
            },

            CheckoutAction::DispatchFailed { message } => {
                if state.payment.status != PaymentStatus::Dispatching {
                    return smallvec![Effect::None];
                }
                tracing::warn!(
                    provider = ?state.payment.provider,
                    order_id = ?state.payment.order_id,
                    %message,
                    "Payment dispatch failed"
                );
                state.payment.status = PaymentStatus::Failed { message };
                smallvec![Effect::None]
            },

            CheckoutAction::SettlementConfirmed => {
                if state.payment.status != PaymentStatus::Processing {
                    return smallvec![Effect::None];
                }
                Self::succeed(state)
            },

            CheckoutAction::SettlementTimedOut => {
                if state.payment.status == PaymentStatus::Processing {
                    state.payment.status = PaymentStatus::TimedOut;
                }
                smallvec![Effect::None]
            },

            CheckoutAction::Retry => {
                if state.payment.status.can_retry() {
                    state.payment.status = PaymentStatus::Idle;
                    state.notice = None;
                }
                smallvec![Effect::None]
            },

            CheckoutAction::VerifyCallback { reference } => {
                if state.payment.status.is_in_flight() || state.payment.status == PaymentStatus::Succeeded {
                    return smallvec![Effect::None];
                }
                state.payment.provider = Some(PaymentProvider::Paystack);
                state.payment.status = PaymentStatus::Processing;

                let api = Arc::clone(&env.api);
                smallvec![async_effect! {
                    let success = match api.verify_paystack(&reference).await {
                        Ok(success) => success,
                        Err(error) => {
                            tracing::warn!(%reference, %error, "Paystack verification failed");
                            false
                        },
                    };
                    Some(CheckoutAction::CallbackVerified { success })
                }]
            },

            CheckoutAction::CallbackVerified { success } => {
                if state.payment.status != PaymentStatus::Processing {
                    return smallvec![Effect::None];
                }
                if success {
                    Self::succeed(state)
                } else {
                    state.payment.status = PaymentStatus::Failed {
                        message: "Payment verification failed".to_owned(),
                    };
                    smallvec![Effect::None]
                }
            },

            CheckoutAction::LeaveCheckout => {
                if state.payment.status == PaymentStatus::Succeeded {
                    state.navigation = Some(Navigation::MyTickets);
                }
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::tests::{event, product, tier};
    use crate::catalog::Visibility;
    use crate::mock::MockStorefrontApi;
    use crate::promo::DiscountType;
    use boxoffice_testing::{assertions, test_clock, test_instant, ManualClock, ReducerTest};
    use chrono::Duration as ChronoDuration;
    use rust_decimal::Decimal;

    fn env() -> CheckoutEnvironment {
        CheckoutEnvironment::new(
            Arc::new(MockStorefrontApi::new()),
            Arc::new(test_clock()),
            Url::parse("https://tickets.example.com").unwrap(),
        )
    }

    /// Tier A at 1000 (cap 4), sold-out tier, upcoming tier, product B at 500
    fn catalog() -> Catalog {
        let mut sold_out = tier("Early Bird", "Standing", 700, 4);
        sold_out.remaining_quantity = 0;
        let mut upcoming = tier("Late", "Standing", 1200, 4);
        upcoming.sales_start = Some(test_instant() + ChronoDuration::days(3));

        Catalog::new(
            event(Visibility::Public),
            vec![tier("Regular", "Standing", 1000, 4), sold_out, upcoming],
            vec![product("Programme", 500, 10, None)],
        )
    }

    fn tier_a(catalog: &Catalog) -> LineItem {
        LineItem::Tier(catalog.tiers[0].id)
    }

    fn product_b(catalog: &Catalog) -> LineItem {
        LineItem::Product(catalog.products[0].id)
    }

    fn filled() -> (CheckoutState, Vec<CheckoutAction>) {
        let catalog = catalog();
        let actions = vec![
            CheckoutAction::AddLine {
                item: tier_a(&catalog),
                delta: 2,
            },
            CheckoutAction::AddLine {
                item: product_b(&catalog),
                delta: 1,
            },
        ];
        (CheckoutState::new(catalog), actions)
    }

    fn fixed_300(subtotal: Money) -> PromoApplication {
        PromoApplication {
            code: "SAVE300".into(),
            discount_type: DiscountType::FixedAmount,
            discount_value: Decimal::from(300),
            discount_amount: Money::from_major(300),
            max_discount_amount: None,
            description: None,
            validated_subtotal: subtotal,
        }
    }

    fn mpesa(phone: &str) -> CheckoutAction {
        CheckoutAction::SelectProvider(ProviderInput::Mpesa {
            phone_number: phone.into(),
        })
    }

    #[test]
    fn cart_totals_with_and_without_promo() {
        let (state, setup) = filled();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::PromoApplied(fixed_300(Money::from_major(2500))))
            .then_state(|s| {
                assert_eq!(s.subtotal(), Money::from_major(2500));
                assert_eq!(s.discount(), Money::from_major(300));
                assert_eq!(s.total(), Money::from_major(2200));
            })
            .run();

        let (state, mut setup) = filled();
        setup.push(CheckoutAction::PromoApplied(fixed_300(Money::from_major(2500))));
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::RemovePromo)
            .then_state(|s| {
                assert!(s.promo.is_none());
                assert_eq!(s.total(), Money::from_major(2500));
            })
            .run();
    }

    #[test]
    fn sold_out_tier_offers_waitlist() {
        let catalog = catalog();
        let sold_out = catalog.tiers[1].id;
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(CheckoutState::new(catalog))
            .when_action(CheckoutAction::AddLine {
                item: LineItem::Tier(sold_out),
                delta: 1,
            })
            .then_state(move |s| {
                assert!(s.cart.is_empty());
                assert_eq!(s.waitlist_tier, Some(sold_out));
                assert_eq!(s.notice.as_deref(), Some("This ticket is sold out"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn upcoming_tier_rejected_without_waitlist() {
        let catalog = catalog();
        let upcoming = catalog.tiers[2].id;
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(CheckoutState::new(catalog))
            .when_action(CheckoutAction::AddLine {
                item: LineItem::Tier(upcoming),
                delta: 1,
            })
            .then_state(|s| {
                assert!(s.cart.is_empty());
                assert!(s.waitlist_tier.is_none());
                assert_eq!(s.notice.as_deref(), Some("Sales for this ticket have not started yet"));
            })
            .run();
    }

    #[test]
    fn adding_past_cap_explains_limit() {
        let catalog = catalog();
        let item = tier_a(&catalog);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(CheckoutState::new(catalog))
            .given_actions([CheckoutAction::AddLine { item, delta: 4 }])
            .when_action(CheckoutAction::AddLine { item, delta: 1 })
            .then_state(move |s| {
                assert_eq!(s.cart.quantity(item), 4);
                assert_eq!(s.notice.as_deref(), Some("You can select at most 4 of this item"));
            })
            .run();
    }

    #[test]
    fn blank_promo_rejected_locally() {
        let (state, setup) = filled();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::ApplyPromo { code: "  ".into() })
            .then_state(|s| {
                assert!(!s.promo_pending);
                assert_eq!(s.promo_error.as_deref(), Some("Please enter a promo code"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn promo_validation_dispatched() {
        let (state, setup) = filled();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::ApplyPromo { code: "save300".into() })
            .then_state(|s| assert!(s.promo_pending))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn empty_cart_submit_is_local_validation() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(CheckoutState::new(catalog()))
            .given_actions([mpesa("0712345678")])
            .when_action(CheckoutAction::Submit)
            .then_state(|s| {
                assert_eq!(s.payment.status, PaymentStatus::Idle);
                assert_eq!(s.notice.as_deref(), Some("Please select at least one ticket or product"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn short_phone_blocks_dispatch() {
        let (state, mut setup) = filled();
        setup.push(mpesa("071234567"));
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Submit)
            .then_state(|s| {
                assert_eq!(s.payment.status, PaymentStatus::Idle);
                assert!(s.notice.as_deref().unwrap().contains("at least 10 digits"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn submit_marks_dispatching() {
        let (state, mut setup) = filled();
        setup.push(mpesa("0712345678"));
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Submit)
            .then_state(|s| {
                assert_eq!(s.payment.status, PaymentStatus::Dispatching);
                assert_eq!(s.payment.provider, Some(PaymentProvider::Mpesa));
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn second_submit_while_dispatching_does_nothing() {
        let (state, mut setup) = filled();
        setup.extend([mpesa("0712345678"), CheckoutAction::Submit]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Submit)
            .then_state(|s| assert_eq!(s.payment.status, PaymentStatus::Dispatching))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn cart_locked_while_dispatching() {
        let (state, mut setup) = filled();
        let item = tier_a(&state.catalog);
        setup.extend([mpesa("0712345678"), CheckoutAction::Submit]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::AddLine { item, delta: 1 })
            .then_state(move |s| assert_eq!(s.cart.quantity(item), 2))
            .run();
    }

    #[test]
    fn mpesa_initiation_starts_cancellable_poll() {
        let (state, mut setup) = filled();
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::Submit,
            CheckoutAction::OrderCreated {
                order_id: OrderId::new(),
            },
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Initiated(Initiation::AwaitSettlement))
            .then_state(|s| assert_eq!(s.payment.status, PaymentStatus::Processing))
            .then_effects(|effects| assertions::assert_has_cancellable(effects, &SETTLEMENT_POLL))
            .run();
    }

    #[test]
    fn redirect_initiation_navigates_away() {
        let url = Url::parse("https://checkout.stripe.com/c/pay/cs_1").unwrap();
        let (state, mut setup) = filled();
        setup.extend([
            CheckoutAction::SelectProvider(ProviderInput::Stripe),
            CheckoutAction::Submit,
            CheckoutAction::OrderCreated {
                order_id: OrderId::new(),
            },
        ]);
        let expected = url.clone();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Initiated(Initiation::Redirect(url)))
            .then_state(move |s| {
                assert_eq!(s.navigation, Some(Navigation::External(expected.clone())));
                assert_eq!(s.payment.status, PaymentStatus::Redirected { url: expected });
            })
            .run();
    }

    #[test]
    fn settlement_schedules_leave_after_two_seconds() {
        let (state, mut setup) = filled();
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::Submit,
            CheckoutAction::OrderCreated {
                order_id: OrderId::new(),
            },
            CheckoutAction::Initiated(Initiation::AwaitSettlement),
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::SettlementConfirmed)
            .then_state(|s| assert_eq!(s.payment.status, PaymentStatus::Succeeded))
            .then_effects(|effects| {
                let action = assertions::assert_has_delay(effects, SUCCESS_REDIRECT_DELAY);
                assert_eq!(*action, CheckoutAction::LeaveCheckout);
            })
            .run();
    }

    #[test]
    fn failure_then_retry_keeps_order() {
        let order_id = OrderId::new();
        let (state, mut setup) = filled();
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::Submit,
            CheckoutAction::OrderCreated { order_id },
            CheckoutAction::DispatchFailed {
                message: "Insufficient balance".into(),
            },
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Retry)
            .then_state(move |s| {
                assert_eq!(s.payment.status, PaymentStatus::Idle);
                assert_eq!(s.payment.order_id, Some(order_id));
            })
            .run();
    }

    #[test]
    fn cart_change_after_failure_needs_new_order() {
        let (state, mut setup) = filled();
        let item = tier_a(&state.catalog);
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::Submit,
            CheckoutAction::OrderCreated {
                order_id: OrderId::new(),
            },
            CheckoutAction::DispatchFailed {
                message: "Declined".into(),
            },
            CheckoutAction::Retry,
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::AddLine { item, delta: 1 })
            .then_state(|s| assert!(s.payment.order_id.is_none()))
            .run();
    }

    #[test]
    fn switching_provider_after_failure_needs_new_order() {
        let order_id = OrderId::new();
        let (state, mut setup) = filled();
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::Submit,
            CheckoutAction::OrderCreated { order_id },
            CheckoutAction::DispatchFailed {
                message: "Declined".into(),
            },
        ]);

        // Same provider, corrected phone: the order stands
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state.clone())
            .given_actions(setup.clone())
            .when_action(mpesa("0722000111"))
            .then_state(move |s| assert_eq!(s.payment.order_id, Some(order_id)))
            .run();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::SelectProvider(ProviderInput::Stripe))
            .then_state(|s| {
                assert!(s.payment.order_id.is_none());
                assert_eq!(s.provider_input, ProviderInput::Stripe);
            })
            .run();
    }

    #[test]
    fn submit_waits_for_pending_promo_check() {
        let (state, mut setup) = filled();
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::ApplyPromo {
                code: "SAVE300".into(),
            },
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Submit)
            .then_state(|s| {
                assert_eq!(s.payment.status, PaymentStatus::Idle);
                assert!(s.promo_pending);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn promo_reply_then_submit_carries_the_code() {
        let (state, mut setup) = filled();
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::ApplyPromo {
                code: "SAVE300".into(),
            },
            CheckoutAction::Submit,
            CheckoutAction::PromoApplied(fixed_300(Money::from_major(2500))),
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::Submit)
            .then_state(|s| {
                assert_eq!(s.payment.status, PaymentStatus::Dispatching);
                assert_eq!(s.total(), Money::from_major(2200));
                let request = s.build_request().unwrap();
                assert!(matches!(
                    request,
                    OrderRequest::Checkout(ref checkout) if checkout.promo_code.as_deref() == Some("SAVE300")
                ));
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn promo_frozen_once_submitted() {
        let (state, mut setup) = filled();
        setup.extend([mpesa("0712345678"), CheckoutAction::Submit]);

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state.clone())
            .given_actions(setup.clone())
            .when_action(CheckoutAction::ApplyPromo {
                code: "SAVE300".into(),
            })
            .then_state(|s| {
                assert!(!s.promo_pending);
                assert_eq!(s.total(), Money::from_major(2500));
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        // A reply that was already on its way is dropped
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state.clone())
            .given_actions(setup.clone())
            .when_action(CheckoutAction::PromoApplied(fixed_300(Money::from_major(2500))))
            .then_state(|s| {
                assert!(s.promo.is_none());
                assert!(!s.promo_pending);
                assert_eq!(s.total(), Money::from_major(2500));
            })
            .run();

        setup.insert(0, CheckoutAction::PromoApplied(fixed_300(Money::from_major(2500))));
        setup.extend([
            CheckoutAction::OrderCreated {
                order_id: OrderId::new(),
            },
            CheckoutAction::Initiated(Initiation::AwaitSettlement),
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::RemovePromo)
            .then_state(|s| {
                assert_eq!(s.payment.status, PaymentStatus::Processing);
                assert!(s.promo.is_some());
                assert_eq!(s.total(), Money::from_major(2200));
            })
            .run();
    }

    #[test]
    fn upcoming_tier_opens_when_its_sale_starts() {
        let catalog = catalog();
        let upcoming = LineItem::Tier(catalog.tiers[2].id);
        let clock = Arc::new(ManualClock::new(test_instant()));
        let env = CheckoutEnvironment::new(
            Arc::new(MockStorefrontApi::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Url::parse("https://tickets.example.com").unwrap(),
        );
        let reducer = CheckoutReducer::new();
        let mut state = CheckoutState::new(catalog);
        let add = CheckoutAction::AddLine {
            item: upcoming,
            delta: 1,
        };

        let _ = reducer.reduce(&mut state, add.clone(), &env);
        assert_eq!(state.cart.quantity(upcoming), 0);
        assert!(state.notice.is_some());

        clock.advance(ChronoDuration::days(3));
        let _ = reducer.reduce(&mut state, add, &env);
        assert_eq!(state.cart.quantity(upcoming), 1);
        assert!(state.notice.is_none());
    }

    #[test]
    fn late_replies_after_timeout_are_ignored() {
        let (state, mut setup) = filled();
        setup.extend([
            mpesa("0712345678"),
            CheckoutAction::Submit,
            CheckoutAction::OrderCreated {
                order_id: OrderId::new(),
            },
            CheckoutAction::Initiated(Initiation::AwaitSettlement),
            CheckoutAction::SettlementTimedOut,
        ]);
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .given_actions(setup)
            .when_action(CheckoutAction::SettlementConfirmed)
            .then_state(|s| assert_eq!(s.payment.status, PaymentStatus::TimedOut))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn failed_paystack_verification() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(CheckoutState::new(catalog()))
            .given_actions([CheckoutAction::VerifyCallback {
                reference: "T123".into(),
            }])
            .when_action(CheckoutAction::CallbackVerified { success: false })
            .then_state(|s| {
                assert_eq!(
                    s.payment.status,
                    PaymentStatus::Failed {
                        message: "Payment verification failed".into()
                    }
                );
            })
            .run();
    }

    #[test]
    fn adoption_subtotal_uses_tier_price() {
        let catalog = catalog();
        let tier_id = catalog.tiers[0].id;
        let state = CheckoutState::adoption(catalog, tier_id, 3);
        assert_eq!(state.subtotal(), Money::from_major(3000));
        assert_eq!(state.total(), Money::from_major(3000));
    }
}
