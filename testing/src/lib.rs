//! # Boxoffice Testing
//!
//! Testing utilities for storefront reducers.
//!
//! This crate provides:
//! - Deterministic clocks for sale-window and timestamp logic
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Effect assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(CartReducer)
//!     .with_env(cart_env(test_clock()))
//!     .given_state(CartState::default())
//!     .when_action(CartAction::Add { item, delta: 2 })
//!     .then_state(|state| assert_eq!(state.cart.quantity(&item), 2))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use boxoffice_core::environment::Clock;


/// Deterministic implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time.
    ///
    /// ```
    /// use boxoffice_testing::mocks::FixedClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Used to walk a tier across its sale window inside one test.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start the clock at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// The instant every `test_clock()` reports (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_instant() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_735_689_600)
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_instant())
    }
}

pub use mocks::{test_clock, test_instant, FixedClock, ManualClock};
pub use reducer_test::{assertions, ReducerTest};
