//! Private-event access gate.
//!
//! The unlock flag is a convenience cache for this browser. The backend still
//! decides what a private event actually serves.

use crate::api::ApiError;
use crate::catalog::{EventDetails, Visibility};
use crate::error::Result;
use crate::gateway::StorefrontApi;
use crate::types::EventId;
use boxoffice_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Persisted per-event unlock flags
pub trait UnlockStore: Send + Sync {
    /// Whether `event_id` was unlocked on this client
    fn is_unlocked(&self, event_id: EventId) -> bool;

    /// Record the flag for `event_id`
    ///
    /// # Errors
    ///
    /// Returns a storage error when the flag cannot be persisted.
    fn set_unlocked(&self, event_id: EventId, unlocked: bool) -> Result<()>;
}

/// Unlock flags that live as long as the process
#[derive(Debug, Default)]
pub struct InMemoryUnlockStore {
    flags: Mutex<HashMap<EventId, bool>>,
}

impl InMemoryUnlockStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnlockStore for InMemoryUnlockStore {
    fn is_unlocked(&self, event_id: EventId) -> bool {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_id)
            .copied()
            .unwrap_or(false)
    }

    fn set_unlocked(&self, event_id: EventId, unlocked: bool) -> Result<()> {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_id, unlocked);
        Ok(())
    }
}

/// Gate position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    /// Code required
    Locked,
    /// Code submitted, waiting for the backend
    Verifying,
    /// Event content may be shown
    Unlocked,
}

/// Access gate state for one event view
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessState {
    /// Event being viewed
    pub event_id: EventId,
    /// Current position
    pub status: AccessStatus,
    /// Inline error
    pub error: Option<String>,
}

impl AccessState {
    /// Initial gate for `event`
    ///
    /// Public events are always unlocked; private events start unlocked only if
    /// this client unlocked them before.
    #[must_use]
    pub fn new(event: &EventDetails, unlocks: &dyn UnlockStore) -> Self {
        let status = match event.visibility {
            Visibility::Public => AccessStatus::Unlocked,
            Visibility::Private if unlocks.is_unlocked(event.id) => AccessStatus::Unlocked,
            Visibility::Private => AccessStatus::Locked,
        };

        Self {
            event_id: event.id,
            status,
            error: None,
        }
    }

    /// Whether event content may be rendered
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.status == AccessStatus::Unlocked
    }
}

/// Access gate actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessAction {
    /// User submitted a code
    SubmitCode {
        /// Raw input
        code: String,
    },
    /// Backend accepted the code and the flag was recorded
    Verified,
    /// Backend rejected the code
    Denied,
    /// Verification could not be completed
    VerifyFailed {
        /// Transport message
        message: String,
    },
}

/// Access gate dependencies
#[derive(Clone)]
pub struct AccessEnvironment {
    /// Backend
    pub api: Arc<dyn StorefrontApi>,
    /// Where unlock flags are persisted
    pub unlocks: Arc<dyn UnlockStore>,
}

/// Access gate reducer
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessReducer;

impl AccessReducer {
    /// Creates a new `AccessReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for AccessReducer {
    type State = AccessState;
    type Action = AccessAction;
    type Environment = AccessEnvironment;

    fn reduce(
        &self,
        state: &mut AccessState,
        action: AccessAction,
        env: &AccessEnvironment,
    ) -> SmallVec<[Effect<AccessAction>; 4]> {
        match action {
            AccessAction::SubmitCode { code } => {
                if state.status != AccessStatus::Locked {
                    return smallvec![Effect::None];
                }

                let code = code.trim().to_owned();
                if code.is_empty() {
                    state.error = Some("Please enter an access code".to_owned());
                    return smallvec![Effect::None];
                }

                state.status = AccessStatus::Verifying;
                state.error = None;

                let event_id = state.event_id;
                let api = Arc::clone(&env.api);
                let unlocks = Arc::clone(&env.unlocks);
                smallvec![Effect::future(async move {
                    Some(match api.verify_access(event_id, &code).await {
                        Ok(true) => {
                            if let Err(error) = unlocks.set_unlocked(event_id, true) {
                                tracing::warn!(event_id = %event_id, %error, "Could not persist unlock");
                            }
                            AccessAction::Verified
                        },
                        Ok(false) | Err(ApiError::Api { .. }) => AccessAction::Denied,
                        Err(error) => AccessAction::VerifyFailed {
                            message: error.to_string(),
                        },
                    })
                })]
            },

            AccessAction::Verified => {
                tracing::info!(event_id = %state.event_id, "Private event unlocked");
                state.status = AccessStatus::Unlocked;
                state.error = None;
                smallvec![Effect::None]
            },

            AccessAction::Denied => {
                state.status = AccessStatus::Locked;
                state.error = Some("Invalid access code".to_owned());
                smallvec![Effect::None]
            },

            AccessAction::VerifyFailed { message } => {
                tracing::warn!(event_id = %state.event_id, %message, "Access verification failed");
                state.status = AccessStatus::Locked;
                state.error = Some(message);
                smallvec![Effect::None]
            },
        }
    }
}
