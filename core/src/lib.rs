//! # Boxoffice Core
//!
//! Primitives shared by every storefront feature.
//!
//! Storefront logic is written as reducers: pure functions that take the current
//! state and an action, mutate the state in place and return descriptions of the
//! side effects that should follow (network calls, timers). The runtime crate
//! executes those descriptions and feeds resulting actions back in.
//!
//! ## Core Concepts
//!
//! - **State**: Owned, cloneable screen state (a cart, a payment session)
//! - **Action**: Everything that can happen to that state (user input, server replies)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: A description of work to do, never the work itself
//! - **Environment**: Injected collaborators (REST gateway, clock, storage)
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct Counter {
//!     taps: u32,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Tap,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = Counter;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Counter,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Tap => state.taps += 1,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let mut state = Counter::default();
//! let _ = CounterReducer.reduce(&mut state, CounterAction::Tap, &());
//! assert_eq!(state.taps, 1);
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// Declarative helpers for building effects
pub mod effect_macros;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They hold every rule of a feature and are deterministic and testable without I/O.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values. A reducer returns them; the runtime decides when and how
/// to execute them. Long-running effects can be registered under an [`effect::EffectId`]
/// so a later action (or disposal of the hosting screen) can cancel them.
pub mod effect {
    use std::borrow::Cow;
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Boxed future produced by [`Effect::Future`]
    pub type EffectFuture<Action> = Pin<Box<dyn Future<Output = Option<Action>> + Send>>;

    /// Identifier under which a cancellable effect is registered
    ///
    /// Only one effect may be registered per id at a time: registering a new
    /// effect under an id that is already in flight cancels the older one.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct EffectId(Cow<'static, str>);

    impl EffectId {
        /// Create an id from a static name (usable in `const` items)
        #[must_use]
        pub const fn new(name: &'static str) -> Self {
            Self(Cow::Borrowed(name))
        }

        /// Create an id from a runtime string
        #[must_use]
        pub fn owned(name: impl Into<String>) -> Self {
            Self(Cow::Owned(name.into()))
        }

        /// The id's name
        #[must_use]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should
    /// happen, returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run effects one after another
        Sequential(Vec<Effect<Action>>),

        /// Dispatch an action after a delay
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after the delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// If the future resolves to `Some(action)`, the action is fed back into the reducer.
        Future(EffectFuture<Action>),

        /// Run `effect` registered under `id` so it can be cancelled later
        Cancellable {
            /// Registration id
            id: EffectId,
            /// The effect to run
            effect: Box<Effect<Action>>,
        },

        /// Cancel whatever effect is currently registered under the id
        Cancel(EffectId),
    }

    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::None => write!(f, "Effect::None"),
                Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
                Self::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Self::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Self::Future(_) => write!(f, "Effect::Future(<future>)"),
                Self::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Self::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an async block that may produce a follow-up action
        #[must_use]
        pub fn future<F>(future: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Self::Future(Box::pin(future))
        }

        /// Register this effect under `id`
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Self {
            Self::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// Combine effects to run concurrently
        #[must_use]
        pub const fn merge(effects: Vec<Self>) -> Self {
            Self::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Self>) -> Self {
            Self::Sequential(effects)
        }

        /// True for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// External collaborators are abstracted behind traits and passed to reducers
/// through their `Environment`.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time for sale-window checks and timestamps
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
