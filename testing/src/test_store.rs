//! Exhaustive store verification.
//!
//! A [`TestStore`] wraps a [`Store`] with transition recording turned on.
//! Every action an effect sends must be claimed with [`TestStore::receive`]
//! before the test ends, in the order it was emitted.

#![allow(clippy::module_name_repetitions)] // TestStore is the natural name
#![allow(clippy::panic)] // Verification failures are test failures

use crate::mocks::test_clock;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use uniflow_core::dispatch::EffectContext;
use uniflow_core::error::EffectError;
use uniflow_core::reducer::{ActionOf, ContainerOf, Reducer};
use uniflow_core::task::SendTask;
use uniflow_core::state::StateContainer;
use uniflow_runtime::{ActionTransition, CancellationRegistry, Store, StoreConfig, TransitionRecorder};

/// Default time to wait for an expected action
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

type RecorderOf<R> =
    TransitionRecorder<ActionOf<R>, <R as Reducer>::State, <R as Reducer>::ReducerState>;

/// Store wrapper that asserts every state transition
///
/// # Example
///
/// ```ignore
/// let mut store = TestStore::new(Counter::default(), CounterReducer, ());
///
/// store.send(CounterAction::IncrementLater, |_| {});
/// store
///     .receive(Action::View(CounterAction::Increment), |state| state.count = 1)
///     .await;
///
/// store.finish().await;
/// ```
pub struct TestStore<R: Reducer> {
    store: Store<R>,
    recorder: Arc<RecorderOf<R>>,
    tasks: Vec<SendTask>,
    timeout: Duration,
    finished: bool,
}

impl<R> TestStore<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug,
    R::ReducerState: Clone + PartialEq + Debug,
    R::ViewAction: Clone + PartialEq + Debug,
    R::ReducerAction: Clone + PartialEq + Debug,
{
    /// Create a test store with a private cancellation registry and a fixed
    /// clock
    #[must_use]
    pub fn new(
        initial_state: impl Into<ContainerOf<R>>,
        reducer: R,
        environment: R::Environment,
    ) -> Self {
        let config = StoreConfig::default()
            .with_registry(Arc::new(CancellationRegistry::new()))
            .with_clock(Arc::new(test_clock()));
        Self::with_config(initial_state, reducer, environment, config)
    }

    /// Create a test store from a custom configuration
    ///
    /// Transition recording is always turned on.
    #[must_use]
    pub fn with_config(
        initial_state: impl Into<ContainerOf<R>>,
        reducer: R,
        environment: R::Environment,
        config: StoreConfig,
    ) -> Self {
        let store = Store::with_config(
            initial_state,
            reducer,
            environment,
            config.with_transition_recording(true),
        );

        let Some(recorder) = store.recorder() else {
            panic!("transition recording was not enabled");
        };

        Self {
            store,
            recorder,
            tasks: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            finished: false,
        }
    }

    /// Change how long `receive` and `finish` wait
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wrapped store
    #[must_use]
    pub const fn store(&self) -> &Store<R> {
        &self.store
    }

    /// Read the current observable state
    ///
    /// # Panics
    ///
    /// Panics if no state container is bound.
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&R::State) -> T,
    {
        match self.store.state(f) {
            Ok(value) => value,
            Err(error) => panic!("cannot read state: {error}"),
        }
    }

    /// Send a view action and assert the resulting state
    ///
    /// `update` receives a copy of the state before the reducer ran and must
    /// turn it into the expected state after.
    ///
    /// # Panics
    ///
    /// Panics if the resulting state differs from the expectation.
    pub fn send<F>(&mut self, action: R::ViewAction, update: F) -> EffectContext
    where
        F: FnOnce(&mut ContainerOf<R>),
    {
        let description = format!("{action:?}");
        let traced = self.store.send_traced(action);

        let Some(transition) = traced.transition else {
            panic!("send({description}) was not reduced: no state container is bound");
        };
        assert_transition(&description, transition, update);

        self.tasks.push(traced.task);
        traced.context
    }

    /// Claim the next effect-sent `action` and assert the resulting state
    ///
    /// Waits up to the configured timeout for the action to be dispatched.
    /// Records are matched in emission order; earlier unclaimed records with a
    /// different action stay unclaimed.
    ///
    /// # Panics
    ///
    /// Panics if no matching action arrives in time, or if the resulting
    /// state differs from the expectation.
    pub async fn receive<F>(&mut self, action: ActionOf<R>, update: F)
    where
        F: FnOnce(&mut ContainerOf<R>),
    {
        self.receive_matching(None, action, update).await;
    }

    /// Like [`TestStore::receive`], restricted to one dispatch chain
    ///
    /// # Panics
    ///
    /// As [`TestStore::receive`].
    pub async fn receive_in<F>(&mut self, context: EffectContext, action: ActionOf<R>, update: F)
    where
        F: FnOnce(&mut ContainerOf<R>),
    {
        self.receive_matching(Some(context), action, update).await;
    }

    async fn receive_matching<F>(
        &mut self,
        context: Option<EffectContext>,
        action: ActionOf<R>,
        update: F,
    ) where
        F: FnOnce(&mut ContainerOf<R>),
    {
        let claimed = self
            .recorder
            .claim_within(self.timeout, |transition| {
                transition.action == action && context.is_none_or(|c| transition.context == c)
            })
            .await;

        let description = format!("{action:?}");
        let Some(transition) = claimed else {
            panic!(
                "expected to receive {description} within {:?}, unclaimed actions: {:?}",
                self.timeout,
                describe(&self.recorder.unclaimed())
            );
        };
        assert_transition(&description, transition, update);
    }

    /// Actions dispatched by effects that have not been claimed yet
    #[must_use]
    pub fn unclaimed(&self) -> Vec<ActionOf<R>> {
        self.recorder
            .unclaimed()
            .into_iter()
            .map(|transition| transition.action)
            .collect()
    }

    /// Wait for outstanding work, then require every record to be claimed
    ///
    /// # Panics
    ///
    /// Panics if work is still running after the timeout, or if any action
    /// sent by an effect was never received.
    pub async fn finish(mut self) {
        self.finished = true;

        for task in &mut self.tasks {
            if let Err(EffectError::Timeout) = task.wait_with_timeout(self.timeout).await {
                panic!("effects still running after {:?}", self.timeout);
            }
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        while self.store.pending_effects() > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "{} effect tasks still running after {:?}",
                self.store.pending_effects(),
                self.timeout
            );
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let unclaimed = self.recorder.unclaimed();
        assert!(
            unclaimed.is_empty(),
            "{} action(s) sent by effects were never received: {:?}",
            unclaimed.len(),
            describe(&unclaimed)
        );
    }
}

impl<R: Reducer> Drop for TestStore<R> {
    fn drop(&mut self) {
        if self.finished || std::thread::panicking() {
            return;
        }

        let unclaimed = self.recorder.unclaimed_count();
        assert!(
            unclaimed == 0,
            "TestStore dropped with {unclaimed} unclaimed action(s); call finish() to verify them"
        );
    }
}

fn assert_transition<A, S, P, F>(description: &str, transition: ActionTransition<A, S, P>, update: F)
where
    S: PartialEq + Debug,
    P: PartialEq + Debug,
    F: FnOnce(&mut StateContainer<S, P>),
{
    let mut expected = transition.before;
    update(&mut expected);
    assert_eq!(
        expected, transition.after,
        "state after {description} does not match the expectation"
    );
}

fn describe<A: Debug, S, P>(transitions: &[ActionTransition<A, S, P>]) -> Vec<String> {
    transitions
        .iter()
        .map(|transition| format!("{:?} ({})", transition.action, transition.context))
        .collect()
}
