//! # Boxoffice Storefront
//!
//! Order composition and payment orchestration for an event-ticketing storefront.
//!
//! A buyer assembles a cart of ticket tiers and merchandise, optionally applies a
//! promo code, passes the sale-window, lottery and private-access gates, and pays
//! through M-Pesa, Stripe or Paystack. M-Pesa settles while the buyer waits, so
//! the checkout polls for settlement; Stripe and Paystack hand the browser to the
//! provider and come back through a callback.
//!
//! ```text
//! Catalog ──► Cart ──► Promo ──► OrderBuilder ──► Payment dispatch
//!                 ▲                                    │
//!           Sale window                    ┌───────────┴───────────┐
//!                                          ▼                       ▼
//!                                  SettlementPoller          Provider redirect
//!                                  (M-Pesa, 30 × 1s)       (Stripe / Paystack)
//! ```
//!
//! Screen logic lives in reducers ([`checkout::CheckoutReducer`],
//! [`gates::LotteryReducer`], [`gates::AccessReducer`]) run by a
//! [`boxoffice_runtime::Store`]. All network access goes through
//! [`gateway::StorefrontApi`].

#![forbid(unsafe_code)]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gates;
pub mod gateway;
pub mod mock;
pub mod order;
pub mod payment;
pub mod promo;
pub mod settlement;
pub mod storage;
pub mod telemetry;
pub mod types;
pub mod waitlist;

pub use api::{ApiError, RestClient};
pub use cart::Cart;
pub use catalog::{Catalog, CatalogService, EventDetails, Product, TicketTier, Visibility};
pub use checkout::{CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState, Navigation, Purchase};
pub use config::Config;
pub use error::{Result, StorefrontError};
pub use gateway::StorefrontApi;
pub use payment::{PaymentStatus, ProviderInput};
pub use settlement::{SettlementOutcome, SettlementPoller};
pub use storage::LocalStorage;
pub use types::{EventId, LineItem, Money, OrderId, PaymentProvider, ProductId, TierId};
pub use waitlist::WaitlistClient;

use boxoffice_runtime::Store;

/// Store for one checkout screen
pub type CheckoutStore = Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

/// Store for one lottery panel
pub type LotteryStore = Store<gates::LotteryState, gates::LotteryAction, gates::LotteryEnvironment, gates::LotteryReducer>;

/// Store for one private-event gate
pub type AccessStore = Store<gates::AccessState, gates::AccessAction, gates::AccessEnvironment, gates::AccessReducer>;
