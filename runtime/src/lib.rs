//! # Boxoffice Runtime
//!
//! The Store that drives storefront reducers.
//!
//! A [`Store`] owns one screen's state. Actions are reduced one at a time under a
//! write lock, so every transition is total-ordered with respect to the others.
//! Effects returned by the reducer are executed on tokio and any action they
//! produce is fed back into the same store.
//!
//! Effects registered with [`Effect::Cancellable`] can be cancelled by id, and
//! [`Store::dispose`] cancels everything at once. After disposal the store
//! rejects new actions, which guarantees that a late network reply or timer
//! never writes into state that belongs to a screen that has gone away.
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_runtime::Store;
//!
//! let store = Store::new(CheckoutState::new(event_id, catalog), CheckoutReducer::new(), env);
//!
//! store.send(CheckoutAction::AddLine { item, delta: 1 }).await?;
//! let subtotal = store.state(|s| s.subtotal()).await;
//!
//! // Screen unmounted
//! store.dispose();
//! ```

use boxoffice_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use futures::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// The store has been disposed and no longer accepts actions
        #[error("Store has been disposed")]
        Disposed,

        /// Timeout waiting for a matching action or for effects to finish
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking completion of the effects spawned by one action
///
/// Only the effects returned directly for that action are tracked; actions
/// they feed back get handles of their own.
#[derive(Clone)]
pub struct EffectHandle {
    pending: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let pending = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            pending: Arc::clone(&pending),
            completion: rx,
        };
        let tracking = EffectTracking {
            pending,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// A handle with nothing left to wait for
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every tracked effect has finished (or been cancelled)
    pub async fn wait(&mut self) {
        while self.pending.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for effects with an upper bound
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when `timeout` elapses.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct EffectTracking {
    pending: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Decrements the effect counter on drop, including when the task panics
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Registry of in-flight cancellable effects
///
/// Each registration carries a generation so a finished effect only removes
/// its own entry, never a newer effect registered under the same id.
#[derive(Default)]
struct CancellationRegistry {
    generation: AtomicU64,
    entries: Mutex<HashMap<EffectId, (u64, CancellationToken)>>,
}

impl CancellationRegistry {
    fn register(&self, id: EffectId, parent: &CancellationToken) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let token = parent.child_token();
        let previous = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), (generation, token.clone()));

        if let Some((_, previous)) = previous {
            tracing::debug!(effect_id = %id, "Replacing in-flight effect");
            metrics::counter!("store.effects.cancelled").increment(1);
            previous.cancel();
        }

        (generation, token)
    }

    fn release(&self, id: &EffectId, generation: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(id).is_some_and(|(current, _)| *current == generation) {
            entries.remove(id);
        }
    }

    fn cancel(&self, id: &EffectId) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        match removed {
            Some((_, token)) => {
                token.cancel();
                metrics::counter!("store.effects.cancelled").increment(1);
                true
            },
            None => false,
        }
    }

    fn is_registered(&self, id: &EffectId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}

/// The Store - runtime coordinator for a reducer
///
/// Cloning a store is cheap; all clones share the same state, effects and
/// disposal flag.
///
/// # Type Parameters
///
/// - `S`: State type
/// - `A`: Action type
/// - `E`: Environment type
/// - `R`: Reducer implementation
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: Arc<R>,
    environment: Arc<E>,
    action_broadcast: broadcast::Sender<A>,
    registry: Arc<CancellationRegistry>,
    root: CancellationToken,
    disposed: Arc<AtomicBool>,
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: Arc::clone(&self.reducer),
            environment: Arc::clone(&self.environment),
            action_broadcast: self.action_broadcast.clone(),
            registry: Arc::clone(&self.registry),
            root: self.root.clone(),
            disposed: Arc::clone(&self.disposed),
        }
    }
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
    }

    /// Create a new store with a custom action broadcast capacity
    #[must_use]
    pub fn with_broadcast_capacity(
        initial_state: S,
        reducer: R,
        environment: E,
        capacity: usize,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(capacity.max(1));

        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer: Arc::new(reducer),
            environment: Arc::new(environment),
            action_broadcast,
            registry: Arc::new(CancellationRegistry::default()),
            root: CancellationToken::new(),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send an action to the store
    ///
    /// The reducer runs to completion before this returns; effects are spawned
    /// afterwards and can be awaited through the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Disposed`] once [`Store::dispose`] has been called.
    #[tracing::instrument(skip(self, action), name = "store_send")]
    pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
        if self.is_disposed() {
            tracing::debug!("Rejected action: store disposed");
            return Err(StoreError::Disposed);
        }

        metrics::counter!("store.actions.total").increment(1);

        let effects = {
            let mut state = self.state.write().await;
            // Disposal may have happened while waiting for the lock
            if self.is_disposed() {
                return Err(StoreError::Disposed);
            }
            self.reducer.reduce(&mut state, action, &self.environment)
        };

        tracing::trace!("Reducer returned {} effects", effects.len());

        let (handle, tracking) = EffectHandle::new();
        for effect in effects {
            self.spawn_effect(effect, &self.root, &tracking);
        }

        Ok(handle)
    }

    /// Send an action and wait for a matching action produced by its effects
    ///
    /// Subscribes before sending so the terminal action cannot be missed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: no matching action within `timeout`
    /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
    /// - [`StoreError::Disposed`]: the store has been disposed
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut rx = self.action_broadcast.subscribe();
        self.send(action).await?;
        Self::wait_on(&mut rx, predicate, timeout).await
    }

    /// Wait for a matching action on a receiver obtained from [`Store::subscribe_actions`]
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] or [`StoreError::ChannelClosed`].
    pub async fn wait_on<F>(
        rx: &mut broadcast::Receiver<A>,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Action observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Subscribe to actions produced by effects
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.action_broadcast.subscribe()
    }

    /// Read from the current state
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    /// Cancel the effect registered under `id`, if any
    ///
    /// Returns whether something was cancelled.
    pub fn cancel(&self, id: &EffectId) -> bool {
        self.registry.cancel(id)
    }

    /// Whether an effect is currently registered under `id`
    #[must_use]
    pub fn is_running(&self, id: &EffectId) -> bool {
        self.registry.is_registered(id)
    }

    /// Dispose the store
    ///
    /// Cancels every in-flight effect and rejects all further actions. Call this
    /// when the screen owning the state goes away.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Disposing store");
            self.root.cancel();
        }
    }

    /// Whether [`Store::dispose`] has been called
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn spawn_effect(&self, effect: Effect<A>, parent: &CancellationToken, tracking: &EffectTracking) {
        match effect {
            Effect::None => {
                metrics::counter!("store.effects.executed", "type" => "none").increment(1);
            },
            // Registration and cancellation happen synchronously so that they are
            // ordered with the action that requested them.
            Effect::Cancel(id) => {
                tracing::debug!(effect_id = %id, "Cancelling effect");
                self.registry.cancel(&id);
            },
            Effect::Cancellable { id, effect } => {
                let (generation, token) = self.registry.register(id.clone(), parent);
                let store = self.clone();
                self.spawn_tracked(tracking, async move {
                    store.run_effect(*effect, token).await;
                    store.registry.release(&id, generation);
                });
            },
            effect => {
                let store = self.clone();
                let token = parent.clone();
                self.spawn_tracked(tracking, async move {
                    store.run_effect(effect, token).await;
                });
            },
        }
    }

    fn spawn_tracked<F>(&self, tracking: &EffectTracking, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracking.increment();
        let guard = DecrementGuard(tracking.clone());
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    fn run_effect(&self, effect: Effect<A>, token: CancellationToken) -> BoxFuture<'static, ()> {
        let store = self.clone();
        Box::pin(async move {
            match effect {
                Effect::None => {},
                Effect::Future(future) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let action = tokio::select! {
                        biased;
                        () = token.cancelled() => None,
                        action = future => action,
                    };
                    store.feed_back(action, &token).await;
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tokio::select! {
                        biased;
                        () = token.cancelled() => {},
                        () = tokio::time::sleep(duration) => {
                            store.feed_back(Some(*action), &token).await;
                        },
                    }
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    join_all(effects.into_iter().map(|e| store.run_effect(e, token.clone()))).await;
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);
                    for effect in effects {
                        if token.is_cancelled() {
                            break;
                        }
                        store.run_effect(effect, token.clone()).await;
                    }
                },
                Effect::Cancellable { id, effect } => {
                    let (generation, child) = store.registry.register(id.clone(), &token);
                    store.run_effect(*effect, child).await;
                    store.registry.release(&id, generation);
                },
                Effect::Cancel(id) => {
                    store.registry.cancel(&id);
                },
            }
        })
    }

    async fn feed_back(&self, action: Option<A>, token: &CancellationToken) {
        let Some(action) = action else {
            return;
        };

        if token.is_cancelled() {
            tracing::trace!("Dropping action from cancelled effect");
            return;
        }

        match self.send(action.clone()).await {
            Ok(_) => {
                let _ = self.action_broadcast.send(action);
            },
            Err(error) => tracing::trace!(%error, "Feedback action rejected"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::{smallvec, SmallVec};

    #[derive(Debug, Clone, Default)]
    struct Taps {
        count: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TapAction {
        Tap,
        TapLater(Duration),
        TapViaFuture,
        TapTwiceInOrder,
        StartTicker,
        StopTicker,
        Ticked,
    }

    const TICKER: EffectId = EffectId::new("ticker");

    struct TapReducer;

    impl Reducer for TapReducer {
        type State = Taps;
        type Action = TapAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Taps,
            action: TapAction,
            _env: &(),
        ) -> SmallVec<[Effect<TapAction>; 4]> {
            match action {
                TapAction::Tap | TapAction::Ticked => {
                    state.count += 1;
                    smallvec![Effect::None]
                },
                TapAction::TapLater(duration) => smallvec![Effect::Delay {
                    duration,
                    action: Box::new(TapAction::Tap),
                }],
                TapAction::TapViaFuture => {
                    smallvec![Effect::future(async { Some(TapAction::Tap) })]
                },
                TapAction::TapTwiceInOrder => smallvec![Effect::chain(vec![
                    Effect::future(async { Some(TapAction::Tap) }),
                    Effect::future(async { Some(TapAction::Tap) }),
                ])],
                TapAction::StartTicker => smallvec![
                    Effect::Delay {
                        duration: Duration::from_secs(5),
                        action: Box::new(TapAction::Ticked),
                    }
                    .cancellable(TICKER)
                ],
                TapAction::StopTicker => smallvec![Effect::Cancel(TICKER)],
            }
        }
    }

    fn store() -> Store<Taps, TapAction, (), TapReducer> {
        Store::new(Taps::default(), TapReducer, ())
    }

    #[tokio::test]
    async fn send_runs_reducer_before_returning() {
        let store = store();
        let _ = store.send(TapAction::Tap).await;
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn future_effect_feeds_action_back() {
        let store = store();
        let mut handle = store.send(TapAction::TapViaFuture).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn sequential_effects_all_run() {
        let store = store();
        let mut handle = store.send(TapAction::TapTwiceInOrder).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.count).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_effect_fires_after_duration() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TapAction::TapLater(Duration::from_secs(2)),
                |a| *a == TapAction::Tap,
                Duration::from_secs(3),
            )
            .await;

        assert_eq!(result, Ok(TapAction::Tap));
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_effect_stops_registered_effect() {
        let store = store();
        let mut ticker = store.send(TapAction::StartTicker).await.unwrap();
        assert!(store.is_running(&TICKER));

        let _ = store.send(TapAction::StopTicker).await;
        ticker.wait().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.state(|s| s.count).await, 0);
        assert!(!store.is_running(&TICKER));
    }

    #[tokio::test(start_paused = true)]
    async fn registering_same_id_replaces_in_flight_effect() {
        let store = store();
        let mut first = store.send(TapAction::StartTicker).await.unwrap();
        let mut second = store.send(TapAction::StartTicker).await.unwrap();

        first.wait().await;
        second.wait().await;

        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_effects_and_rejects_actions() {
        let store = store();
        let mut handle = store.send(TapAction::TapLater(Duration::from_secs(1))).await.unwrap();

        store.dispose();
        handle.wait().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(store.state(|s| s.count).await, 0);
        assert_eq!(store.send(TapAction::Tap).await.unwrap_err(), StoreError::Disposed);
        assert!(store.is_disposed());
    }

    #[tokio::test]
    async fn completed_handle_does_not_block() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        assert!(handle.wait_with_timeout(Duration::from_millis(10)).await.is_ok());
    }
}
