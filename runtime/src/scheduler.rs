//! Effect interpreter.
//!
//! [`Scheduler::interpret`] turns an [`Effect`] description into tokio tasks.
//! Interpretation itself is synchronous: cancellations happen immediately,
//! and every task is spawned before `interpret` returns.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::metrics::{EffectMetrics, StoreMetrics};
use crate::registry::{CancellationRegistry, Registration};
use crate::AtomicCounterGuard;
use futures::FutureExt;
use smallvec::{SmallVec, smallvec};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uniflow_core::dispatch::Dispatcher;
use uniflow_core::effect::{Effect, EffectId, Run};
use uniflow_core::task::{AbortOnDrop, SendTask, panic_message};

/// Tasks spawned for one effect
pub type Tasks = SmallVec<[SendTask; 4]>;

/// How a tagged task enters the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tagging {
    /// Join whatever is already registered under the id
    Add,
    /// Cancel whatever is registered under the id first, atomically
    Replace,
}

/// Interprets effects into tasks.
///
/// Cloning is cheap; clones share the registry, the diagnostics sink and the
/// pending-task counter.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<CancellationRegistry>,
    diagnostics: Arc<dyn Diagnostics>,
    pending: Arc<AtomicUsize>,
}

impl Scheduler {
    /// Create a scheduler over `registry`, reporting to `diagnostics`
    #[must_use]
    pub fn new(registry: Arc<CancellationRegistry>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            registry,
            diagnostics,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The registry used for cancellable and debounced effects
    #[must_use]
    pub const fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// Number of spawned tasks that have not finished yet, group tasks
    /// included
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Interpret `effect` and aggregate its tasks into one handle
    ///
    /// A group task joining several children counts as pending too.
    ///
    /// # Panics
    ///
    /// Panics if the effect spawns work outside a tokio runtime.
    pub fn execute<A>(&self, effect: Effect<A>, dispatcher: &Dispatcher<A>) -> SendTask
    where
        A: Send + 'static,
    {
        SendTask::join_with(self.interpret(effect, dispatcher), |group| self.spawn(group))
    }

    /// Interpret `effect`, returning one handle per spawned task
    ///
    /// # Panics
    ///
    /// Panics if the effect spawns work outside a tokio runtime.
    #[tracing::instrument(
        skip(self, effect, dispatcher),
        fields(kind = effect.kind(), context = %dispatcher.context()),
        name = "interpret_effect"
    )]
    pub fn interpret<A>(&self, effect: Effect<A>, dispatcher: &Dispatcher<A>) -> Tasks
    where
        A: Send + 'static,
    {
        let effect = effect.normalized();
        EffectMetrics::record_executed(effect.kind());

        match effect {
            Effect::None => smallvec![],
            Effect::Run(run) => smallvec![self.spawn_run(run, dispatcher.clone())],
            Effect::Send(action) => smallvec![self.spawn_send(action, dispatcher.clone())],
            Effect::SerialActions(actions) => {
                if actions.is_empty() {
                    return smallvec![];
                }
                tracing::trace!("Executing {} actions serially", actions.len());

                let dispatcher = dispatcher.clone();
                smallvec![self.spawn(async move {
                    for action in actions {
                        // Failures of one chain do not stop the next
                        let _ = dispatcher.send(action).wait().await;
                    }
                })]
            },
            Effect::ConcurrentActions(actions) => actions
                .into_iter()
                .map(|action| self.spawn_send(action, dispatcher.clone()))
                .collect(),
            Effect::SerialEffects(effects) => {
                if effects.iter().all(Effect::is_none) {
                    return smallvec![];
                }
                tracing::trace!("Executing {} effects serially", effects.len());

                let scheduler = self.clone();
                let dispatcher = dispatcher.clone();
                smallvec![self.spawn(async move {
                    for effect in effects {
                        let mut tasks = scheduler.interpret(effect, &dispatcher);
                        SendTask::wait_all(&mut tasks).await;
                    }
                })]
            },
            Effect::ConcurrentEffects(effects) => effects
                .into_iter()
                .flat_map(|effect| self.interpret(effect, dispatcher))
                .collect(),
            Effect::Cancel(id) => {
                let cancelled = self.registry.cancel(&id);
                EffectMetrics::record_cancelled(cancelled);
                tracing::trace!(effect_id = %id, cancelled, "Executed Effect::Cancel");
                smallvec![]
            },
            Effect::Debounce { base, id, delay } => {
                if base.is_none() {
                    return smallvec![];
                }
                smallvec![self.spawn_debounce(*base, &id, delay, dispatcher.clone())]
            },
            Effect::Cancellable {
                base,
                id,
                cancel_in_flight,
            } => {
                if cancel_in_flight {
                    let cancelled = self.registry.cancel(&id);
                    EffectMetrics::record_cancelled(cancelled);
                }

                let mut children = self.interpret(*base, dispatcher);
                if children.is_empty() {
                    return smallvec![];
                }

                let guard = AbortOnDrop::new(&children);
                smallvec![self.spawn_tagged(&id, Tagging::Add, async move {
                    SendTask::wait_all(&mut children).await;
                    guard.disarm();
                })]
            },
        }
    }

    fn spawn_send<A>(&self, action: A, dispatcher: Dispatcher<A>) -> SendTask
    where
        A: Send + 'static,
    {
        self.spawn(async move {
            let _ = dispatcher.send(action).wait().await;
        })
    }

    fn spawn_run<A>(&self, run: Run<A>, dispatcher: Dispatcher<A>) -> SendTask
    where
        A: Send + 'static,
    {
        let Run {
            priority,
            operation,
            on_error,
        } = run;
        let diagnostics = Arc::clone(&self.diagnostics);
        let context = dispatcher.context();

        self.spawn(async move {
            if priority.yields_first() {
                tokio::task::yield_now().await;
            }

            let body_dispatcher = dispatcher.clone();
            let body = AssertUnwindSafe(async move { operation(body_dispatcher).await });
            match body.catch_unwind().await {
                Ok(Ok(())) => tracing::trace!(%context, "Run effect completed"),
                Ok(Err(error)) if error.is_cancelled() => {
                    tracing::trace!(%context, "Run effect observed cancellation");
                },
                Ok(Err(error)) => {
                    EffectMetrics::record_failure();
                    tracing::debug!(%context, error = %error, "Run effect failed");

                    match on_error {
                        Some(handler) => {
                            let handled = AssertUnwindSafe(handler.call(error, dispatcher))
                                .catch_unwind()
                                .await;
                            if let Err(payload) = handled {
                                EffectMetrics::record_panic();
                                diagnostics.report(Diagnostic::TaskPanicked {
                                    context,
                                    message: panic_message(payload.as_ref()),
                                });
                            }
                        },
                        None => diagnostics.report(Diagnostic::EffectFailed {
                            context,
                            error: error.to_string(),
                        }),
                    }
                },
                Err(payload) => {
                    EffectMetrics::record_panic();
                    diagnostics.report(Diagnostic::TaskPanicked {
                        context,
                        message: panic_message(payload.as_ref()),
                    });
                },
            }
        })
    }

    fn spawn_debounce<A>(
        &self,
        base: Effect<A>,
        id: &EffectId,
        delay: Duration,
        dispatcher: Dispatcher<A>,
    ) -> SendTask
    where
        A: Send + 'static,
    {
        tracing::trace!(effect_id = %id, delay_ms = delay.as_millis(), "Debouncing effect");

        let scheduler = self.clone();
        self.spawn_tagged(id, Tagging::Replace, async move {
            tokio::time::sleep(delay).await;
            let mut tasks = scheduler.interpret(base, &dispatcher);
            SendTask::wait_all(&mut tasks).await;
        })
    }

    /// Spawn `body` registered under `id` for as long as it runs
    fn spawn_tagged<F>(&self, id: &EffectId, tagging: Tagging, body: F) -> SendTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (mut registration, ready) = Registration::pending(Arc::clone(&self.registry), id.clone());

        let task = self.spawn(async move {
            registration.ready().await;
            body.await;
            drop(registration);
        });

        let key = match tagging {
            Tagging::Add => self.registry.register(id, &task),
            Tagging::Replace => {
                let previous = self.registry.in_flight(id);
                let key = self.registry.replace(id, &task);
                EffectMetrics::record_cancelled(previous);
                key
            },
        };
        if let Some(key) = key {
            let _ = ready.send(key);
        }

        task
    }

    /// Spawn `future`, counting it as pending until it ends or is dropped
    fn spawn<F>(&self, future: F) -> SendTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pending = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        StoreMetrics::record_pending(pending);
        let guard = AtomicCounterGuard(Arc::clone(&self.pending));

        SendTask::spawn(async move {
            let _guard = guard; // Decrement on drop
            future.await;
        })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::diagnostics::NoopDiagnostics;
    use std::sync::Mutex;
    use uniflow_core::dispatch::{Dispatch, EffectContext};
    use uniflow_core::error::EffectError;

    /// Dispatch target that only logs actions
    #[derive(Default)]
    struct Log {
        actions: Mutex<Vec<u32>>,
    }

    impl Log {
        fn actions(&self) -> Vec<u32> {
            self.actions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    impl Dispatch<u32> for Log {
        fn dispatch(&self, action: u32, _context: EffectContext) -> SendTask {
            self.actions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(action);
            SendTask::completed()
        }
    }

    fn fixture() -> (Scheduler, Arc<Log>, Arc<dyn Dispatch<u32>>) {
        let scheduler = Scheduler::new(
            Arc::new(CancellationRegistry::new()),
            Arc::new(NoopDiagnostics),
        );
        let log = Arc::new(Log::default());
        let target: Arc<dyn Dispatch<u32>> = log.clone();
        (scheduler, log, target)
    }

    #[tokio::test]
    async fn test_none_spawns_nothing() {
        let (scheduler, _log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));

        let tasks = scheduler.interpret(Effect::none(), &dispatcher);
        assert!(tasks.is_empty());
        assert!(scheduler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_serial_actions_dispatch_in_order() {
        let (scheduler, log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));

        let mut task = scheduler.execute(Effect::serial_actions(vec![3, 1, 2]), &dispatcher);
        assert!(task.wait().await.is_ok());
        assert_eq!(log.actions(), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_concurrent_effects_flatten() {
        let (scheduler, _log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));

        let tasks = scheduler.interpret(
            Effect::merge(vec![
                Effect::send(1),
                Effect::none(),
                Effect::concurrent_actions(vec![2, 3]),
            ]),
            &dispatcher,
        );
        assert_eq!(tasks.len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_unknown_id_spawns_nothing() {
        let (scheduler, _log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));

        let mut task = scheduler.execute(Effect::cancel("x"), &dispatcher);
        assert!(!task.has_work());
        assert!(task.wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellable_registers_until_done() {
        let (scheduler, _log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));
        let id = EffectId::from("tick");

        let effect = Effect::run(|_send| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        })
        .cancellable(id.clone(), false);

        let mut task = scheduler.execute(effect, &dispatcher);
        tokio::task::yield_now().await;
        assert_eq!(scheduler.registry().in_flight(&id), 1);

        assert!(task.wait().await.is_ok());
        assert!(!scheduler.registry().contains(&id));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight_stops_earlier_run() {
        let (scheduler, log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));

        let slow = |value: u32| {
            Effect::run(move |send: Dispatcher<u32>| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = send.send(value);
                Ok(())
            })
            .cancellable("load", true)
        };

        let mut first = scheduler.execute(slow(1), &dispatcher);
        let mut second = scheduler.execute(slow(2), &dispatcher);

        assert!(matches!(first.wait().await, Err(EffectError::Cancelled)));
        assert!(second.wait().await.is_ok());
        assert_eq!(log.actions(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_task_counts_as_pending() {
        let (scheduler, _log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));

        let sleeper = || {
            Effect::run(|_send: Dispatcher<u32>| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            })
        };

        let mut group = scheduler.execute(Effect::merge(vec![sleeper(), sleeper()]), &dispatcher);
        assert_eq!(scheduler.pending(), 3);

        assert!(group.wait().await.is_ok());
        tokio::task::yield_now().await;
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_priority_still_runs() {
        let (scheduler, log, target) = fixture();
        let dispatcher = Dispatcher::new(Arc::downgrade(&target), EffectContext::new(1));

        let effect = Effect::run_with(
            uniflow_core::effect::TaskPriority::Background,
            |send: Dispatcher<u32>| async move {
                let _ = send.send(9);
                Ok(())
            },
            None,
        );

        assert!(scheduler.execute(effect, &dispatcher).wait().await.is_ok());
        assert_eq!(log.actions(), vec![9]);
    }
}
