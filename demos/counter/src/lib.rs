//! # Counter Example
//!
//! A counter demonstrating the Uniflow effect runtime.
//!
//! This example showcases:
//! - View actions versus reducer-only actions
//! - Reducer-private state next to observable state
//! - `run` effects that send actions back into the store
//! - A cancellable ticker and a debounced save
//! - Name-based field access through a [`FieldTable`]
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterAction, CounterEnvironment, CounterReducer, initial_state};
//! use uniflow_runtime::Store;
//! use uniflow_testing::test_clock;
//!
//! # async fn example() {
//! let env = CounterEnvironment::new(test_clock());
//! let store = Store::new(initial_state(), CounterReducer::new(), env);
//!
//! let _ = store.send(CounterAction::Increment);
//! assert_eq!(store.state(|s| s.count).ok(), Some(1));
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use uniflow_core::prelude::*;

pub use uniflow_core::{DateTime, Utc};

/// Counter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
    /// When the count was last saved
    pub last_saved: Option<DateTime<Utc>>,
}

/// State only the reducer sees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterPrivate {
    /// Ticks received since the ticker last started
    pub ticks: u32,
}

/// Actions a caller may send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterAction {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Reset the counter to 0
    Reset,
    /// Increment after the given delay
    IncrementLater(Duration),
    /// Increment once per tick period, `ticks` times
    StartTicking {
        /// Number of ticks before the ticker stops by itself
        ticks: u32,
    },
    /// Stop a running ticker
    StopTicking,
    /// Save the count once edits settle down
    Save,
}

/// Actions only effects send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterInternal {
    /// One ticker period elapsed
    Tick,
    /// The save finished
    Saved(DateTime<Utc>),
}

/// Full action type of the counter
pub type Action = uniflow_core::action::Action<CounterAction, CounterInternal>;

/// Id of the ticker effect
pub const TICKER: &str = "counter-ticker";

/// Id of the debounced save
pub const SAVE: &str = "counter-save";

/// Counter environment
///
/// Holds the injected clock and the timing the effects use.
#[derive(Debug, Clone)]
pub struct CounterEnvironment<C: Clock> {
    /// Clock used to stamp saves
    pub clock: C,
    /// Time between ticks
    pub tick_period: Duration,
    /// Quiet period before a save runs
    pub save_delay: Duration,
}

impl<C: Clock> CounterEnvironment<C> {
    /// Create a new counter environment with the given clock
    #[must_use]
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            tick_period: Duration::from_secs(1),
            save_delay: Duration::from_millis(500),
        }
    }
}

/// Field table exposing `count` and `last_saved` by name
#[must_use]
pub fn counter_fields() -> Arc<FieldTable<CounterState>> {
    Arc::new(
        FieldTable::<CounterState>::builder()
            .field("count", |s| &s.count, |s| &mut s.count)
            .field("last_saved", |s| &s.last_saved, |s| &mut s.last_saved)
            .build(),
    )
}

/// A fresh container with the field table attached
#[must_use]
pub fn initial_state() -> StateContainer<CounterState, CounterPrivate> {
    StateContainer::new(CounterState::default(), CounterPrivate::default())
        .with_fields(counter_fields())
}

/// Counter reducer
///
/// Generic over the Clock type C to work with any clock implementation.
#[derive(Debug, Clone, Copy)]
pub struct CounterReducer<C> {
    _phantom: std::marker::PhantomData<C>,
}

impl<C> CounterReducer<C> {
    /// Create a new counter reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<C> Default for CounterReducer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Reducer for CounterReducer<C>
where
    C: Clock + Clone + 'static,
{
    type State = CounterState;
    type ReducerState = CounterPrivate;
    type ViewAction = CounterAction;
    type ReducerAction = CounterInternal;
    type Environment = CounterEnvironment<C>;

    fn reduce(
        &self,
        state: &mut StateContainer<CounterState, CounterPrivate>,
        action: Action,
        env: &CounterEnvironment<C>,
    ) -> Effect<Action> {
        match action {
            Action::View(CounterAction::Increment) => {
                state.count += 1;
                Effect::none()
            },
            Action::View(CounterAction::Decrement) => {
                state.count -= 1;
                Effect::none()
            },
            Action::View(CounterAction::Reset) => {
                state.count = 0;
                Effect::none()
            },
            Action::View(CounterAction::IncrementLater(delay)) => run_effect!(|send| {
                tokio::time::sleep(delay).await;
                send.send_and_wait(Action::View(CounterAction::Increment)).await
            }),
            Action::View(CounterAction::StartTicking { ticks }) => {
                state.reducer_state_mut().ticks = 0;
                let period = env.tick_period;
                Effect::run(move |send| tick(send, ticks, period)).cancellable(TICKER, true)
            },
            Action::View(CounterAction::StopTicking) => Effect::cancel(TICKER),
            Action::View(CounterAction::Save) => {
                let clock = env.clock.clone();
                run_effect!(|send| {
                    send.send_and_wait(Action::Internal(CounterInternal::Saved(clock.now())))
                        .await
                })
                .debounce(SAVE, env.save_delay)
            },
            Action::Internal(CounterInternal::Tick) => {
                state.count += 1;
                state.reducer_state_mut().ticks += 1;
                Effect::none()
            },
            Action::Internal(CounterInternal::Saved(at)) => {
                state.last_saved = Some(at);
                Effect::none()
            },
        }
    }
}

async fn tick(send: Dispatcher<Action>, ticks: u32, period: Duration) -> Result<(), EffectError> {
    for _ in 0..ticks {
        tokio::time::sleep(period).await;
        send.send_and_wait(Action::Internal(CounterInternal::Tick)).await?;
    }
    Ok(())
}
