//! Lottery eligibility gate.
//!
//! Eligibility is fetched once per event view. A successful entry flips it to
//! `false` straight away and then refetches eligibility and stats; until those
//! replies land the flipped value is a local guess.

use crate::gateway::StorefrontApi;
use crate::types::EventId;
use boxoffice_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pool counters from `GET /lottery/event/{id}/stats`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryStats {
    /// Entries so far
    #[serde(default)]
    pub total_entries: u32,
    /// Tickets still to be drawn
    #[serde(default)]
    pub tickets_available: u32,
    /// Tickets bought into the pool by adopters
    #[serde(default)]
    pub adopted_tickets: u32,
}

/// Lottery view state for one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotteryState {
    /// Event being viewed
    pub event_id: EventId,
    /// Whether a bearer token is present
    pub signed_in: bool,
    /// Last known eligibility (`None` until fetched or when signed out)
    pub eligible: Option<bool>,
    /// Last known pool counters
    pub stats: Option<LotteryStats>,
    /// An entry request is in flight
    pub entering: bool,
    /// The view should send the user to sign in
    pub needs_sign_in: bool,
    /// Action to replay once signed in
    pub pending_after_sign_in: Option<LotteryAction>,
    /// Confirmation for the last entry
    pub message: Option<String>,
    /// Last error
    pub error: Option<String>,
}

impl LotteryState {
    /// Fresh view
    #[must_use]
    pub const fn new(event_id: EventId, signed_in: bool) -> Self {
        Self {
            event_id,
            signed_in,
            eligible: None,
            stats: None,
            entering: false,
            needs_sign_in: false,
            pending_after_sign_in: None,
            message: None,
            error: None,
        }
    }

    /// Whether the enter button should be offered
    #[must_use]
    pub fn can_enter(&self) -> bool {
        !self.entering && self.eligible != Some(false)
    }
}

/// Lottery actions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LotteryAction {
    /// View opened
    Load,
    /// Eligibility reply
    EligibilityLoaded {
        /// Whether this identity may still enter
        eligible: bool,
    },
    /// Stats reply
    StatsLoaded(LotteryStats),
    /// A read failed
    LoadFailed {
        /// Backend message
        message: String,
    },
    /// User asked to enter
    Enter,
    /// Entry accepted
    Entered,
    /// Entry declined or failed
    EntryFailed {
        /// Backend message
        message: String,
    },
    /// Authentication completed
    SignedIn,
}

/// Lottery dependencies
#[derive(Clone)]
pub struct LotteryEnvironment {
    /// Backend
    pub api: Arc<dyn StorefrontApi>,
}

/// Lottery gate reducer
#[derive(Clone, Copy, Debug, Default)]
pub struct LotteryReducer;

impl LotteryReducer {
    /// Creates a new `LotteryReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fetch_stats(event_id: EventId, env: &LotteryEnvironment) -> Effect<LotteryAction> {
        let api = Arc::clone(&env.api);
        Effect::future(async move {
            Some(match api.lottery_stats(event_id).await {
                Ok(stats) => LotteryAction::StatsLoaded(stats),
                Err(error) => LotteryAction::LoadFailed {
                    message: error.to_string(),
                },
            })
        })
    }

    fn fetch_eligibility(event_id: EventId, env: &LotteryEnvironment) -> Effect<LotteryAction> {
        let api = Arc::clone(&env.api);
        Effect::future(async move {
            Some(match api.lottery_eligibility(event_id).await {
                Ok(eligible) => LotteryAction::EligibilityLoaded { eligible },
                Err(error) => LotteryAction::LoadFailed {
                    message: error.to_string(),
                },
            })
        })
    }
}

impl Reducer for LotteryReducer {
    type State = LotteryState;
    type Action = LotteryAction;
    type Environment = LotteryEnvironment;

    fn reduce(
        &self,
        state: &mut LotteryState,
        action: LotteryAction,
        env: &LotteryEnvironment,
    ) -> SmallVec<[Effect<LotteryAction>; 4]> {
        let event_id = state.event_id;
        match action {
            LotteryAction::Load => {
                let mut effects: SmallVec<[Effect<LotteryAction>; 4]> =
                    smallvec![Self::fetch_stats(event_id, env)];
                if state.signed_in {
                    effects.push(Self::fetch_eligibility(event_id, env));
                }
                effects
            },

            LotteryAction::EligibilityLoaded { eligible } => {
                state.eligible = Some(eligible);
                smallvec![Effect::None]
            },

            LotteryAction::StatsLoaded(stats) => {
                state.stats = Some(stats);
                smallvec![Effect::None]
            },

            LotteryAction::LoadFailed { message } => {
                tracing::warn!(event_id = %event_id, %message, "Lottery read failed");
                state.error = Some(message);
                smallvec![Effect::None]
            },

            LotteryAction::Enter => {
                if !state.signed_in {
                    tracing::debug!(event_id = %event_id, "Deferring lottery entry until sign-in");
                    state.needs_sign_in = true;
                    state.pending_after_sign_in = Some(LotteryAction::Enter);
                    return smallvec![Effect::None];
                }
                if state.entering {
                    return smallvec![Effect::None];
                }
                if state.eligible == Some(false) {
                    state.error = Some("You have already entered this lottery".to_owned());
                    return smallvec![Effect::None];
                }

                state.entering = true;
                state.error = None;
                state.message = None;

                let api = Arc::clone(&env.api);
                smallvec![Effect::future(async move {
                    Some(match api.enter_lottery(event_id).await {
                        Ok(()) => LotteryAction::Entered,
                        Err(error) => LotteryAction::EntryFailed {
                            message: error.to_string(),
                        },
                    })
                })]
            },

            LotteryAction::Entered => {
                tracing::info!(event_id = %event_id, "Lottery entry accepted");
                state.entering = false;
                state.eligible = Some(false);
                state.message = Some("You're in the draw. Good luck!".to_owned());
                smallvec![
                    Self::fetch_stats(event_id, env),
                    Self::fetch_eligibility(event_id, env),
                ]
            },

            LotteryAction::EntryFailed { message } => {
                tracing::warn!(event_id = %event_id, %message, "Lottery entry failed");
                state.entering = false;
                state.error = Some(message);
                smallvec![Self::fetch_stats(event_id, env)]
            },

            LotteryAction::SignedIn => {
                state.signed_in = true;
                state.needs_sign_in = false;

                match state.pending_after_sign_in.take() {
                    Some(deferred) => self.reduce(state, deferred, env),
                    None => smallvec![Self::fetch_eligibility(event_id, env)],
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStorefrontApi;
    use boxoffice_testing::{assertions, ReducerTest};

    fn env() -> LotteryEnvironment {
        LotteryEnvironment {
            api: Arc::new(MockStorefrontApi::new()),
        }
    }

    #[test]
    fn load_fetches_stats_and_eligibility_when_signed_in() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(env())
            .given_state(LotteryState::new(EventId::new(), true))
            .when_action(LotteryAction::Load)
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn load_skips_eligibility_when_signed_out() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(env())
            .given_state(LotteryState::new(EventId::new(), false))
            .when_action(LotteryAction::Load)
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn signed_out_entry_is_deferred() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(env())
            .given_state(LotteryState::new(EventId::new(), false))
            .when_action(LotteryAction::Enter)
            .then_state(|s| {
                assert!(s.needs_sign_in);
                assert_eq!(s.pending_after_sign_in, Some(LotteryAction::Enter));
                assert!(!s.entering);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn sign_in_resumes_deferred_entry() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(env())
            .given_state(LotteryState::new(EventId::new(), false))
            .given_actions([LotteryAction::Enter])
            .when_action(LotteryAction::SignedIn)
            .then_state(|s| {
                assert!(s.signed_in);
                assert!(!s.needs_sign_in);
                assert!(s.entering);
                assert!(s.pending_after_sign_in.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn entry_flips_eligibility_optimistically_and_refetches() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(env())
            .given_state(LotteryState::new(EventId::new(), true))
            .given_actions([LotteryAction::EligibilityLoaded { eligible: true }, LotteryAction::Enter])
            .when_action(LotteryAction::Entered)
            .then_state(|s| {
                assert_eq!(s.eligible, Some(false));
                assert!(!s.can_enter());
                assert!(s.message.is_some());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn ineligible_identity_cannot_enter() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(env())
            .given_state(LotteryState::new(EventId::new(), true))
            .given_actions([LotteryAction::EligibilityLoaded { eligible: false }])
            .when_action(LotteryAction::Enter)
            .then_state(|s| {
                assert!(!s.entering);
                assert_eq!(s.error.as_deref(), Some("You have already entered this lottery"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn failed_entry_surfaces_message_and_refreshes_stats() {
        ReducerTest::new(LotteryReducer::new())
            .with_env(env())
            .given_state(LotteryState::new(EventId::new(), true))
            .given_actions([LotteryAction::Enter])
            .when_action(LotteryAction::EntryFailed {
                message: "Lottery closed".into(),
            })
            .then_state(|s| {
                assert!(!s.entering);
                assert_eq!(s.error.as_deref(), Some("Lottery closed"));
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }
}
