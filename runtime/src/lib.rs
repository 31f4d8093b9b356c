//! # Uniflow Runtime
//!
//! Runtime implementation for the Uniflow effect runtime.
//!
//! This crate provides the Store that owns state, runs the reducer, and
//! executes the effects it returns.
//!
//! ## Core Components
//!
//! - **Store**: Owns the state container and serializes reducer runs
//! - **Scheduler**: Interprets effect descriptions into tokio tasks
//! - **`CancellationRegistry`**: Gives effects an identity for cancellation
//!   and debouncing
//! - **`TransitionRecorder`**: Captures effect-originated transitions for tests
//!
//! ## Example
//!
//! ```ignore
//! use uniflow_runtime::Store;
//!
//! let store = Store::new(Counter::default(), CounterReducer, ());
//!
//! // Send an action; the reducer has already run when `send` returns
//! let mut task = store.send(CounterAction::IncrementLater);
//!
//! // Wait for everything the action triggered
//! task.wait().await?;
//!
//! let count = store.state(|s| s.count)?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uniflow_core::environment::{Clock, SystemClock};

/// Cancellation registry for tagged effects
pub mod registry;

/// Effect interpreter
pub mod scheduler;

/// Transition recording for test verification
pub mod recorder;

/// Non-fatal runtime diagnostics
pub mod diagnostics;

/// Prometheus metrics for observability
pub mod metrics;

pub use diagnostics::{Diagnostic, Diagnostics, NoopDiagnostics, TracingDiagnostics};
pub use error::StoreError;
pub use recorder::{ActionTransition, TransitionOf, TransitionRecorder};
pub use registry::CancellationRegistry;
pub use scheduler::Scheduler;
pub use store::{Store, TracedSend};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// No state container is bound to the store
        #[error("No state container is bound to the store")]
        Unbound,

        /// A state container is already bound
        #[error("A state container is already bound to the store")]
        AlreadyBound,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

/// Configuration for Store instances
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default()
///     .with_registry(Arc::new(CancellationRegistry::new()))
///     .with_diagnostics(Arc::new(TracingDiagnostics))
///     .with_shutdown_timeout(Duration::from_secs(5));
///
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Clone)]
pub struct StoreConfig {
    /// Registry for cancellable and debounced effects
    pub registry: Arc<CancellationRegistry>,
    /// Sink for non-fatal runtime problems
    pub diagnostics: Arc<dyn Diagnostics>,
    /// Record effect-originated transitions for verification
    pub record_transitions: bool,
    /// Time source for transition timestamps
    pub clock: Arc<dyn Clock>,
    /// Timeout used by [`Store::close`]
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Use a specific cancellation registry instead of the shared one
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<CancellationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the diagnostics sink
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Turn transition recording on or off
    #[must_use]
    pub const fn with_transition_recording(mut self, enabled: bool) -> Self {
        self.record_transitions = enabled;
        self
    }

    /// Set the clock used for timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            registry: CancellationRegistry::shared(),
            diagnostics: Arc::new(NoopDiagnostics),
            record_transitions: false,
            clock: Arc::new(SystemClock),
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("registry", &self.registry)
            .field("record_transitions", &self.record_transitions)
            .field("default_shutdown_timeout", &self.default_shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
pub(crate) struct AtomicCounterGuard(pub(crate) Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, Clock, Diagnostic, Diagnostics, Duration, Ordering, Scheduler, StoreConfig,
        StoreError, TransitionOf, TransitionRecorder,
    };
    use crate::metrics::StoreMetrics;
    use crate::recorder::ActionTransition;
    use crate::registry::CancellationRegistry;
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
    use uniflow_core::action::Action;
    use uniflow_core::dispatch::{Dispatch, Dispatcher, EffectContext};
    use uniflow_core::error::EffectError;
    use uniflow_core::reducer::{ActionOf, ContainerOf, Reducer};
    use uniflow_core::task::SendTask;

    /// Recorder type of a reducer
    type RecorderOf<R> =
        TransitionRecorder<ActionOf<R>, <R as Reducer>::State, <R as Reducer>::ReducerState>;

    /// Result of [`Store::send_traced`]
    pub struct TracedSend<R: Reducer> {
        /// Handle for all work the action triggered
        pub task: SendTask,
        /// Dispatch chain allocated for the action
        pub context: EffectContext,
        /// Snapshots around the reducer run, when recording is enabled and a
        /// container was bound
        pub transition: Option<TransitionOf<R>>,
    }

    /// Where a dispatch came from
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Origin {
        /// `Store::send` from outside
        External,
        /// A `Dispatcher` inside a running effect
        Effect,
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (an optional [`StateContainer`] behind a mutex)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (through its [`Scheduler`])
    ///
    /// Cloning a store is cheap and yields another handle to the same state.
    ///
    /// [`StateContainer`]: uniflow_core::state::StateContainer
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::new(SearchState::default(), SearchReducer, environment);
    ///
    /// store.send(SearchAction::QueryChanged("rust".into()));
    /// assert_eq!(store.state(|s| s.query.clone())?, "rust");
    /// ```
    pub struct Store<R: Reducer> {
        inner: Arc<StoreInner<R>>,
    }

    struct StoreInner<R: Reducer> {
        this: Weak<StoreInner<R>>,
        container: Mutex<Option<ContainerOf<R>>>,
        reducer: R,
        environment: R::Environment,
        scheduler: Scheduler,
        diagnostics: Arc<dyn Diagnostics>,
        recorder: Option<Arc<RecorderOf<R>>>,
        clock: Arc<dyn Clock>,
        next_context: AtomicU64,
        shutdown: AtomicBool,
        default_shutdown_timeout: Duration,
    }

    impl<R> Store<R>
    where
        R: Reducer,
        R::State: Clone,
        R::ReducerState: Clone,
        R::ViewAction: Clone,
        R::ReducerAction: Clone,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default`]: the shared cancellation registry,
        /// no-op diagnostics and no transition recording.
        #[must_use]
        pub fn new(
            initial_state: impl Into<ContainerOf<R>>,
            reducer: R,
            environment: R::Environment,
        ) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: impl Into<ContainerOf<R>>,
            reducer: R,
            environment: R::Environment,
            config: StoreConfig,
        ) -> Self {
            Self::build(Some(initial_state.into()), reducer, environment, config)
        }

        /// Create a store with no state bound yet
        ///
        /// Until [`Store::bind`] is called every send is a no-op reported as
        /// [`Diagnostic::UnboundDispatch`].
        #[must_use]
        pub fn unbound(reducer: R, environment: R::Environment, config: StoreConfig) -> Self {
            Self::build(None, reducer, environment, config)
        }

        fn build(
            container: Option<ContainerOf<R>>,
            reducer: R,
            environment: R::Environment,
            config: StoreConfig,
        ) -> Self {
            let inner = Arc::new_cyclic(|this| StoreInner {
                this: this.clone(),
                container: Mutex::new(container),
                reducer,
                environment,
                scheduler: Scheduler::new(config.registry, Arc::clone(&config.diagnostics)),
                diagnostics: config.diagnostics,
                recorder: config
                    .record_transitions
                    .then(|| Arc::new(TransitionRecorder::new())),
                clock: config.clock,
                next_context: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                default_shutdown_timeout: config.default_shutdown_timeout,
            });

            Self { inner }
        }

        /// Bind the state container
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::AlreadyBound`] if a container is bound.
        pub fn bind(&self, container: impl Into<ContainerOf<R>>) -> Result<(), StoreError> {
            let mut slot = self.inner.lock();
            if slot.is_some() {
                return Err(StoreError::AlreadyBound);
            }
            *slot = Some(container.into());
            drop(slot);

            tracing::debug!("State container bound");
            Ok(())
        }

        /// Whether a state container is bound
        #[must_use]
        pub fn is_bound(&self) -> bool {
            self.inner.lock().is_some()
        }

        /// Send a view action to the store
        ///
        /// This is the primary way to interact with the store:
        /// 1. Acquires the state lock
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Interprets the returned effect, spawning its tasks
        /// 4. Effects may send more actions (feedback loop)
        ///
        /// The state change is visible as soon as `send` returns. The returned
        /// [`SendTask`] covers every task the action triggered; dropping it
        /// leaves the work running.
        ///
        /// # Panics
        ///
        /// Panics if the reducer panics, or if the effect spawns work outside a
        /// tokio runtime.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub fn send(&self, action: R::ViewAction) -> SendTask {
            self.send_traced(action).task
        }

        /// Send a view action and wait for everything it triggered
        ///
        /// # Errors
        ///
        /// Propagates [`EffectError::Cancelled`] or [`EffectError::Panicked`]
        /// from the triggered work.
        pub async fn send_and_wait(&self, action: R::ViewAction) -> Result<(), EffectError> {
            self.send(action).wait().await
        }

        /// Send a view action and also return its context and snapshots
        ///
        /// The transition is only captured with recording enabled. It is
        /// returned to the caller, never stored in the recorder.
        ///
        /// # Panics
        ///
        /// As [`Store::send`].
        pub fn send_traced(&self, action: R::ViewAction) -> TracedSend<R> {
            let context = self.inner.allocate_context();
            let (task, transition) =
                self.inner
                    .reduce(Action::View(action), context, Origin::External);

            TracedSend {
                task,
                context,
                transition,
            }
        }

        /// Read observable state via a closure
        ///
        /// ```ignore
        /// let count = store.state(|s| s.count)?;
        /// ```
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Unbound`] when no container is bound.
        pub fn state<F, T>(&self, f: F) -> Result<T, StoreError>
        where
            F: FnOnce(&R::State) -> T,
        {
            self.with_container(|container| f(container))
        }

        /// Read reducer-private state via a closure
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Unbound`] when no container is bound.
        pub fn reducer_state<F, T>(&self, f: F) -> Result<T, StoreError>
        where
            F: FnOnce(&R::ReducerState) -> T,
        {
            self.with_container(|container| f(container.reducer_state()))
        }

        /// Read the whole container via a closure
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Unbound`] when no container is bound.
        pub fn with_container<F, T>(&self, f: F) -> Result<T, StoreError>
        where
            F: FnOnce(&ContainerOf<R>) -> T,
        {
            self.inner.lock().as_ref().map(f).ok_or(StoreError::Unbound)
        }

        /// The transition recorder, when recording is enabled
        #[must_use]
        pub fn recorder(&self) -> Option<Arc<RecorderOf<R>>> {
            self.inner.recorder.clone()
        }

        /// The cancellation registry effects are tagged in
        #[must_use]
        pub fn registry(&self) -> &Arc<CancellationRegistry> {
            self.inner.scheduler.registry()
        }

        /// Number of effect tasks still running
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.inner.scheduler.pending()
        }

        /// Whether shutdown has begun
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.inner.shutdown.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (later sends become no-ops)
        /// 2. Waits for pending effects to complete (with timeout)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before
        /// all pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.inner.shutdown.store(true, Ordering::Release);

            let deadline = tokio::time::Instant::now() + timeout;
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.inner.scheduler.pending();

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if tokio::time::Instant::now() >= deadline {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(pending_effects = pending, "Waiting for effects to complete");
                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Shut down using the configured default timeout
        ///
        /// # Errors
        ///
        /// As [`Store::shutdown`].
        pub async fn close(&self) -> Result<(), StoreError> {
            self.shutdown(self.inner.default_shutdown_timeout).await
        }
    }

    impl<R> StoreInner<R>
    where
        R: Reducer,
        R::State: Clone,
        R::ReducerState: Clone,
        R::ViewAction: Clone,
        R::ReducerAction: Clone,
    {
        fn lock(&self) -> MutexGuard<'_, Option<ContainerOf<R>>> {
            self.container.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn allocate_context(&self) -> EffectContext {
            EffectContext::new(self.next_context.fetch_add(1, Ordering::Relaxed) + 1)
        }

        fn dispatcher(&self, context: EffectContext) -> Dispatcher<ActionOf<R>> {
            let target: Weak<dyn Dispatch<ActionOf<R>>> = self.this.clone();
            Dispatcher::new(target, context)
        }

        /// Run the reducer and interpret its effect, all under the state lock
        #[tracing::instrument(skip(self, action), name = "store_reduce")]
        fn reduce(
            &self,
            action: ActionOf<R>,
            context: EffectContext,
            origin: Origin,
        ) -> (SendTask, Option<TransitionOf<R>>) {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                StoreMetrics::record_rejected("shutdown");
                self.diagnostics
                    .report(Diagnostic::DispatchRejected { context });
                return (SendTask::completed(), None);
            }

            let mut slot = self.lock();
            let Some(container) = slot.as_mut() else {
                drop(slot);
                tracing::debug!("Dropped action: no state container bound");
                StoreMetrics::record_rejected("unbound");
                self.diagnostics.report(Diagnostic::UnboundDispatch { context });
                return (SendTask::completed(), None);
            };

            let snapshot = self
                .recorder
                .as_ref()
                .map(|_| (action.clone(), container.clone()));

            let effect = {
                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effect = self.reducer.reduce(container, action, &self.environment);
                StoreMetrics::record_action(start.elapsed());

                tracing::trace!(effect = effect.kind(), "Reducer completed");
                effect
            };

            let transition = snapshot.map(|(action, before)| ActionTransition {
                action,
                before,
                after: container.clone(),
                effect: effect.shape(),
                context,
                recorded_at: self.clock.now(),
            });

            if origin == Origin::Effect {
                if let (Some(recorder), Some(transition)) = (&self.recorder, &transition) {
                    recorder.record(transition.clone());
                }
            }

            let task = self.scheduler.execute(effect, &self.dispatcher(context));
            drop(slot);

            (task, transition)
        }
    }

    impl<R> Dispatch<ActionOf<R>> for StoreInner<R>
    where
        R: Reducer,
        R::State: Clone,
        R::ReducerState: Clone,
        R::ViewAction: Clone,
        R::ReducerAction: Clone,
    {
        fn dispatch(&self, action: ActionOf<R>, context: EffectContext) -> SendTask {
            self.reduce(action, context, Origin::Effect).0
        }
    }

    impl<R: Reducer> Clone for Store<R> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<R: Reducer> std::fmt::Debug for Store<R> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Store")
                .field("pending_effects", &self.inner.scheduler.pending())
                .field("recording", &self.inner.recorder.is_some())
                .field("shutdown", &self.inner.shutdown.load(Ordering::Acquire))
                .finish_non_exhaustive()
        }
    }

    impl<R: Reducer> std::fmt::Debug for TracedSend<R> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TracedSend")
                .field("task", &self.task)
                .field("context", &self.context)
                .field("recorded", &self.transition.is_some())
                .finish()
        }
    }
}
