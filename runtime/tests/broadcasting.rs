//! Action observation through the store's broadcast channel.
//!
//! A screen waits on the terminal action of a multi-step flow, and several
//! observers follow the same flow, each seeing state that already includes the
//! action it was handed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use boxoffice_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use boxoffice_runtime::{Store, StoreError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum FlowAction {
    /// Start a three-step flow tagged `id`
    Start { id: u64 },
    /// One step finished
    Step { id: u64, step: u32 },
    /// Terminal action
    Done { id: u64 },
    /// Terminal action that never happens
    Abandoned { id: u64 },
}

#[derive(Debug, Clone, Default)]
struct FlowState {
    steps: Vec<(u64, u32)>,
    done: Vec<u64>,
}

struct FlowReducer;

fn step_later(id: u64, step: u32) -> Effect<FlowAction> {
    Effect::future(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Some(FlowAction::Step { id, step })
    })
}

impl Reducer for FlowReducer {
    type State = FlowState;
    type Action = FlowAction;
    type Environment = ();

    fn reduce(&self, state: &mut FlowState, action: FlowAction, _env: &()) -> SmallVec<[Effect<FlowAction>; 4]> {
        match action {
            FlowAction::Start { id } => smallvec![step_later(id, 1)],
            FlowAction::Step { id, step } => {
                state.steps.push((id, step));
                if step < 3 {
                    smallvec![step_later(id, step + 1)]
                } else {
                    smallvec![Effect::future(async move { Some(FlowAction::Done { id }) })]
                }
            },
            FlowAction::Done { id } => {
                state.done.push(id);
                smallvec![Effect::None]
            },
            FlowAction::Abandoned { .. } => smallvec![Effect::None],
        }
    }
}

fn store() -> Store<FlowState, FlowAction, (), FlowReducer> {
    Store::new(FlowState::default(), FlowReducer, ())
}

#[tokio::test(start_paused = true)]
async fn waits_for_terminal_action_of_multi_step_flow() {
    let store = store();

    let done = store
        .send_and_wait_for(
            FlowAction::Start { id: 42 },
            |a| matches!(a, FlowAction::Done { id: 42 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(done, FlowAction::Done { id: 42 });
    assert_eq!(store.state(|s| s.steps.clone()).await, vec![(42, 1), (42, 2), (42, 3)]);
    assert_eq!(store.state(|s| s.done.clone()).await, vec![42]);
}

#[tokio::test(start_paused = true)]
async fn missing_terminal_action_times_out() {
    let store = store();

    let result = store
        .send_and_wait_for(
            FlowAction::Start { id: 7 },
            |a| matches!(a, FlowAction::Abandoned { .. }),
            Duration::from_millis(50),
        )
        .await;

    assert_eq!(result.unwrap_err(), StoreError::Timeout);
}

#[tokio::test(start_paused = true)]
async fn concurrent_flows_filter_by_tag() {
    let store = store();

    let mut waits = Vec::new();
    for id in 1..=3 {
        let store = store.clone();
        waits.push(tokio::spawn(async move {
            store
                .send_and_wait_for(
                    FlowAction::Start { id },
                    move |a| *a == FlowAction::Done { id },
                    Duration::from_secs(1),
                )
                .await
        }));
    }

    for (id, wait) in (1..=3).zip(waits) {
        assert_eq!(wait.await.expect("wait task").unwrap(), FlowAction::Done { id });
    }
    assert_eq!(store.state(|s| s.steps.len()).await, 9);
}

#[tokio::test(start_paused = true)]
async fn observers_see_every_fed_back_action_in_order() {
    let store = store();
    let mut first = store.subscribe_actions();
    let mut second = store.subscribe_actions();

    store.send(FlowAction::Start { id: 5 }).await.unwrap();

    let expected = vec![
        FlowAction::Step { id: 5, step: 1 },
        FlowAction::Step { id: 5, step: 2 },
        FlowAction::Step { id: 5, step: 3 },
        FlowAction::Done { id: 5 },
    ];
    for rx in [&mut first, &mut second] {
        let mut seen = Vec::new();
        while seen.len() < expected.len() {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn observed_action_is_already_reduced() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store.send(FlowAction::Start { id: 9 }).await.unwrap();
    let first = rx.recv().await.unwrap();

    assert_eq!(first, FlowAction::Step { id: 9, step: 1 });
    assert_eq!(store.state(|s| s.steps.first().copied()).await, Some((9, 1)));
}

#[tokio::test(start_paused = true)]
async fn disposed_store_rejects_waits() {
    let store = store();
    store.dispose();

    let result = store
        .send_and_wait_for(
            FlowAction::Start { id: 1 },
            |a| matches!(a, FlowAction::Done { .. }),
            Duration::from_secs(1),
        )
        .await;

    assert_eq!(result.unwrap_err(), StoreError::Disposed);
}

#[tokio::test(start_paused = true)]
async fn disposing_mid_flow_stops_feedback() {
    let store = store();
    let mut rx = store.subscribe_actions();

    store.send(FlowAction::Start { id: 3 }).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), FlowAction::Step { id: 3, step: 1 });
    store.dispose();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.state(|s| s.steps.len()).await, 1);
    assert!(store.state(|s| s.done.is_empty()).await);
}
