//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing a single reducer call with
//! readable Given-When-Then syntax. Nothing is executed: the returned effect
//! is handed to the assertions as a description.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use uniflow_core::reducer::{ActionOf, ContainerOf, EffectOf, Reducer};

/// Type alias for state assertion functions
type StateAssertion<R> = Box<dyn FnOnce(&ContainerOf<R>)>;

/// Type alias for effect assertion functions
type EffectAssertion<R> = Box<dyn FnOnce(&EffectOf<R>)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use uniflow_testing::ReducerTest;
///
/// ReducerTest::new(CounterReducer)
///     .with_env(())
///     .given_state(Counter { count: 0 })
///     .when_action(Action::View(CounterAction::Increment))
///     .then_state(|state| {
///         assert_eq!(state.count, 1);
///     })
///     .then_effect(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R: Reducer> {
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<ContainerOf<R>>,
    action: Option<ActionOf<R>>,
    state_assertions: Vec<StateAssertion<R>>,
    effect_assertions: Vec<EffectAssertion<R>>,
}

impl<R: Reducer> ReducerTest<R> {
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: impl Into<ContainerOf<R>>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: ActionOf<R>) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&ContainerOf<R>) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the returned effect (Then)
    #[must_use]
    pub fn then_effect<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&EffectOf<R>) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the reducer once and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    pub fn run(self) {
        let Some(mut state) = self.initial_state else {
            panic!("Initial state must be set with given_state()");
        };
        let Some(action) = self.action else {
            panic!("Action must be set with when_action()");
        };
        let Some(env) = self.environment else {
            panic!("Environment must be set with with_env()");
        };

        let effect = self.reducer.reduce(&mut state, action, &env);

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effect);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use serde::Serialize;
    use std::fmt::Debug;
    use std::time::Duration;
    use uniflow_core::effect::{Effect, EffectShape};

    /// Assert that the effect does no work
    ///
    /// # Panics
    ///
    /// Panics if the effect is anything but [`Effect::None`].
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: Debug>(effect: &Effect<A>) {
        assert!(effect.is_none(), "Expected no effect, but found {effect:?}");
    }

    /// Assert the actions an effect sends directly, in tree order
    ///
    /// Actions sent from inside `run` bodies are not visible here.
    ///
    /// # Panics
    ///
    /// Panics if the sent actions differ from `expected`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_sends<A>(effect: &Effect<A>, expected: &[A])
    where
        A: Clone + PartialEq + Debug,
    {
        let shape = effect.shape();
        let sent: Vec<&A> = shape.sent_actions();
        let expected: Vec<&A> = expected.iter().collect();
        assert_eq!(sent, expected, "Unexpected actions sent by {effect:?}");
    }

    /// Assert that the effect cancels `id` somewhere in its tree
    ///
    /// # Panics
    ///
    /// Panics if no `cancel` with that id is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels<A>(effect: &Effect<A>, id: &str)
    where
        A: Clone + Debug,
    {
        assert!(
            any_shape(&effect.shape(), &|shape| matches!(
                shape,
                EffectShape::Cancel { id: cancelled } if cancelled.as_str() == id
            )),
            "Expected {effect:?} to cancel {id:?}"
        );
    }

    /// Assert that the effect is debounced under `id` with `delay`
    ///
    /// # Panics
    ///
    /// Panics if no matching debounce is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_debounced<A>(effect: &Effect<A>, id: &str, delay: Duration)
    where
        A: Clone + Debug,
    {
        assert!(
            any_shape(&effect.shape(), &|shape| matches!(
                shape,
                EffectShape::Debounce { id: gated, delay: waited, .. }
                    if gated.as_str() == id && *waited == delay
            )),
            "Expected {effect:?} to be debounced as {id:?} for {delay:?}"
        );
    }

    /// Assert the effect's shape against a JSON description
    ///
    /// # Panics
    ///
    /// Panics if the shape cannot be serialized or differs from `expected`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_shape_json<A>(effect: &Effect<A>, expected: &serde_json::Value)
    where
        A: Clone + Serialize,
    {
        let actual = match serde_json::to_value(effect.shape()) {
            Ok(value) => value,
            Err(error) => panic!("Effect shape is not serializable: {error}"),
        };
        assert_eq!(&actual, expected, "Unexpected effect shape");
    }

    fn any_shape<A>(shape: &EffectShape<A>, predicate: &dyn Fn(&EffectShape<A>) -> bool) -> bool {
        if predicate(shape) {
            return true;
        }
        match shape {
            EffectShape::SerialEffects { effects } | EffectShape::ConcurrentEffects { effects } => {
                effects.iter().any(|effect| any_shape(effect, predicate))
            },
            EffectShape::Debounce { base, .. } | EffectShape::Cancellable { base, .. } => {
                any_shape(base, predicate)
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uniflow_core::action::Action;
    use uniflow_core::effect::Effect;
    use uniflow_core::state::StateContainer;

    #[derive(Clone, Debug, PartialEq, serde::Serialize)]
    enum TestAction {
        Increment,
        Decrement,
        Search(String),
        Stop,
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = i32;
        type ReducerState = ();
        type ViewAction = TestAction;
        type ReducerAction = ();
        type Environment = ();

        fn reduce(
            &self,
            state: &mut StateContainer<i32>,
            action: Action<TestAction, ()>,
            _env: &(),
        ) -> Effect<Action<TestAction, ()>> {
            match action {
                Action::View(TestAction::Increment) => {
                    **state += 1;
                    Effect::none()
                },
                Action::View(TestAction::Decrement) => {
                    **state -= 1;
                    Effect::send(Action::View(TestAction::Stop))
                },
                Action::View(TestAction::Search(query)) => {
                    Effect::send(Action::View(TestAction::Search(query)))
                        .debounce("search", Duration::from_millis(300))
                },
                Action::View(TestAction::Stop) => Effect::cancel("search"),
                Action::Internal(()) => Effect::none(),
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(0)
            .when_action(Action::View(TestAction::Increment))
            .then_state(|state| {
                assert_eq!(**state, 1);
            })
            .then_effect(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_reducer_test_decrement_sends_stop() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(5)
            .when_action(Action::View(TestAction::Decrement))
            .then_state(|state| {
                assert_eq!(**state, 4);
            })
            .then_effect(|effect| {
                assertions::assert_sends(effect, &[Action::View(TestAction::Stop)]);
            })
            .run();
    }

    #[test]
    fn test_assert_debounced_and_cancels() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(0)
            .when_action(Action::View(TestAction::Search("rust".into())))
            .then_effect(|effect| {
                assertions::assert_debounced(effect, "search", Duration::from_millis(300));
            })
            .run();

        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(0)
            .when_action(Action::View(TestAction::Stop))
            .then_effect(|effect| assertions::assert_cancels(effect, "search"))
            .run();
    }

    #[test]
    fn test_assert_shape_json() {
        let effect: Effect<Action<TestAction, ()>> = Effect::cancel("search");
        assertions::assert_shape_json(
            &effect,
            &serde_json::json!({ "kind": "cancel", "id": "search" }),
        );
    }

    #[test]
    #[should_panic(expected = "Action must be set")]
    fn test_missing_action_panics() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(0)
            .run();
    }
}
