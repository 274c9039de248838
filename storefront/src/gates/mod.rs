//! Eligibility gates.
//!
//! Each gate is independent and decides, before the cart or the payment
//! dispatcher gets involved, whether the purchase flow may continue.

pub mod access;
pub mod lottery;
pub mod sale_window;

pub use access::{AccessAction, AccessEnvironment, AccessReducer, AccessState, AccessStatus, UnlockStore};
pub use lottery::{LotteryAction, LotteryEnvironment, LotteryReducer, LotteryState, LotteryStats};
pub use sale_window::{sale_status, SaleStatus};
