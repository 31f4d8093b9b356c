//! # Uniflow Core
//!
//! Core traits and types for the Uniflow effect runtime.
//!
//! This crate provides the abstractions for unidirectional state management:
//! a reducer receives an action, mutates state, and returns a *description*
//! of side effects that the runtime then executes.
//!
//! ## Core Concepts
//!
//! - **State**: [`StateContainer`](state::StateContainer) holding observable
//!   state plus a reducer-private partition
//! - **Action**: [`Action`](action::Action), either a view action sent from
//!   outside or an internal action sent from effects
//! - **Reducer**: `(State, Action, Environment) → Effect`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Dispatcher**: Handle effect bodies use to feed actions back in
//! - **SendTask**: Awaitable, cancellable handle to triggered work
//!
//! ## Example
//!
//! ```ignore
//! use uniflow_core::prelude::*;
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum CounterAction {
//!     Increment,
//!     IncrementLater,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = Counter;
//!     type ReducerState = ();
//!     type ViewAction = CounterAction;
//!     type ReducerAction = std::convert::Infallible;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut StateContainer<Counter>,
//!         action: Action<CounterAction, std::convert::Infallible>,
//!         _env: &(),
//!     ) -> Effect<Action<CounterAction, std::convert::Infallible>> {
//!         match action {
//!             Action::View(CounterAction::Increment) => {
//!                 state.count += 1;
//!                 Effect::none()
//!             },
//!             Action::View(CounterAction::IncrementLater) => Effect::run(|send| async move {
//!                 send.send(Action::View(CounterAction::Increment));
//!                 Ok(())
//!             }),
//!             Action::Internal(never) => match never {},
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod dispatch;
pub mod effect;
pub mod error;
pub mod state;
pub mod task;

#[macro_use]
mod effect_macros;

/// Action module - the two flavors of input a reducer handles
pub mod action {
    use serde::{Deserialize, Serialize};

    /// Input to a reducer.
    ///
    /// `View` actions are the only ones an outside caller may send through the
    /// store. `Internal` actions are sent from running effects. A feature with
    /// no internal actions uses [`std::convert::Infallible`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Action<V, I> {
        /// Sent by an external collaborator
        View(V),
        /// Sent only from inside effects
        Internal(I),
    }

    impl<V, I> Action<V, I> {
        /// Whether this is a view action
        #[must_use]
        pub const fn is_view(&self) -> bool {
            matches!(self, Self::View(_))
        }

        /// Whether this is an internal action
        #[must_use]
        pub const fn is_internal(&self) -> bool {
            matches!(self, Self::Internal(_))
        }

        /// The view action, if this is one
        #[must_use]
        pub const fn as_view(&self) -> Option<&V> {
            match self {
                Self::View(action) => Some(action),
                Self::Internal(_) => None,
            }
        }

        /// The internal action, if this is one
        #[must_use]
        pub const fn as_internal(&self) -> Option<&I> {
            match self {
                Self::Internal(action) => Some(action),
                Self::View(_) => None,
            }
        }
    }
}

/// Reducer module - The core trait for business logic
///
/// Reducers are functions `(State, Action, Environment) → Effect`. They
/// contain the feature's logic, perform no I/O themselves, and describe all
/// asynchronous work as effects.
pub mod reducer {
    use super::action::Action;
    use super::effect::Effect;
    use super::state::StateContainer;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: Observable state, readable from outside the store
    /// - `ReducerState`: State only the reducer sees (use `()` when unused)
    /// - `ViewAction`: Actions external callers may send
    /// - `ReducerAction`: Actions only effects may send
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer: Send + Sync + 'static {
        /// The observable state type
        type State: Send + 'static;

        /// The reducer-private state type
        type ReducerState: Send + 'static;

        /// Actions sent from outside the store
        type ViewAction: Send + 'static;

        /// Actions sent only from effects
        type ReducerAction: Send + 'static;

        /// The environment type with injected dependencies
        type Environment: Send + Sync + 'static;

        /// Reduce an action into state changes and an effect
        ///
        /// Mutates `state` in place and returns a description of the work
        /// the runtime should perform next. Return [`Effect::none`] when there
        /// is nothing to do.
        fn reduce(
            &self,
            state: &mut StateContainer<Self::State, Self::ReducerState>,
            action: Action<Self::ViewAction, Self::ReducerAction>,
            env: &Self::Environment,
        ) -> Effect<Action<Self::ViewAction, Self::ReducerAction>>;
    }

    /// Full action type of a reducer
    pub type ActionOf<R> =
        Action<<R as Reducer>::ViewAction, <R as Reducer>::ReducerAction>;

    /// Effect type a reducer returns
    pub type EffectOf<R> = Effect<ActionOf<R>>;

    /// State container type a reducer operates on
    pub type ContainerOf<R> =
        StateContainer<<R as Reducer>::State, <R as Reducer>::ReducerState>;
}

/// Environment module - Dependency injection traits
///
/// External dependencies are abstracted behind traits and injected through
/// the reducer's `Environment`.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

/// Everything a feature module usually needs
pub mod prelude {
    pub use crate::action::Action;
    pub use crate::dispatch::{Dispatcher, EffectContext};
    pub use crate::effect::{Effect, EffectId, EffectShape, ErrorHandler, TaskPriority};
    pub use crate::environment::{Clock, SystemClock};
    pub use crate::error::{EffectError, StateError};
    pub use crate::reducer::{ActionOf, ContainerOf, EffectOf, Reducer};
    pub use crate::state::{FieldTable, StateContainer};
    pub use crate::task::SendTask;
    pub use crate::{concurrent, run_effect, serial};
}
