//! Cancellation registry: effect identities mapped to in-flight tasks.
//!
//! Tasks are registered under an [`EffectId`] so a later effect can cancel
//! them by id. Entries disappear when their last task unregisters or when the
//! id is cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use uniflow_core::effect::EffectId;
use uniflow_core::task::SendTask;

/// Key of one registered task, unique within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(u64);

impl TaskKey {
    /// The raw key value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Table of in-flight tasks by effect id.
///
/// The lock is held only while the map changes. Tasks are aborted after it is
/// released, so a task's own unregistration can never contend with the
/// cancellation that stopped it.
///
/// # Example
///
/// ```ignore
/// let registry = CancellationRegistry::new();
/// let task = SendTask::spawn(long_running());
/// registry.register(&EffectId::from("sync"), &task);
///
/// assert_eq!(registry.cancel(&EffectId::from("sync")), 1);
/// ```
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<EffectId, HashMap<TaskKey, AbortHandle>>>,
    next_key: AtomicU64,
}

impl CancellationRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry stores use unless configured otherwise
    #[must_use]
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<CancellationRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }

    /// Register `task` under `id`
    ///
    /// Returns `None` when the task has no work to track.
    pub fn register(&self, id: &EffectId, task: &SendTask) -> Option<TaskKey> {
        let handle = task.abort_handle()?;
        let key = self.allocate();
        self.lock().entry(id.clone()).or_default().insert(key, handle);
        tracing::trace!(effect_id = %id, key = key.0, "Registered task");
        Some(key)
    }

    /// Cancel everything under `id`, then register `task` in its place
    ///
    /// Both steps happen under one lock acquisition, so no other task can
    /// slip in between.
    pub fn replace(&self, id: &EffectId, task: &SendTask) -> Option<TaskKey> {
        let handle = task.abort_handle()?;
        let key = self.allocate();

        let replaced = {
            let mut entries = self.lock();
            let previous = entries.remove(id);
            entries.entry(id.clone()).or_default().insert(key, handle);
            previous
        };

        let cancelled = abort_all(replaced);
        tracing::trace!(effect_id = %id, key = key.0, cancelled, "Replaced tasks");
        Some(key)
    }

    /// Remove one task's registration; unknown keys are ignored
    pub fn unregister(&self, id: &EffectId, key: TaskKey) {
        let mut entries = self.lock();
        if let Some(tasks) = entries.get_mut(id) {
            tasks.remove(&key);
            if tasks.is_empty() {
                entries.remove(id);
            }
        }
    }

    /// Cancel every task registered under `id`
    ///
    /// Returns the number of tasks cancelled. Cancelling an unknown id does
    /// nothing.
    pub fn cancel(&self, id: &EffectId) -> usize {
        let removed = self.lock().remove(id);
        let cancelled = abort_all(removed);
        if cancelled > 0 {
            tracing::debug!(effect_id = %id, cancelled, "Cancelled effects");
        }
        cancelled
    }

    /// Cancel every registered task
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().map(|(_, tasks)| tasks).collect();
        drained.into_iter().map(|tasks| abort_all(Some(tasks))).sum()
    }

    /// Whether any task is registered under `id`
    #[must_use]
    pub fn contains(&self, id: &EffectId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of ids with at least one registered task
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no task is registered at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of tasks registered under `id`
    #[must_use]
    pub fn in_flight(&self, id: &EffectId) -> usize {
        self.lock().get(id).map_or(0, HashMap::len)
    }

    fn allocate(&self) -> TaskKey {
        TaskKey(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EffectId, HashMap<TaskKey, AbortHandle>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn abort_all(tasks: Option<HashMap<TaskKey, AbortHandle>>) -> usize {
    tasks.map_or(0, |tasks| {
        let count = tasks.len();
        for handle in tasks.into_values() {
            handle.abort();
        }
        count
    })
}

/// RAII guard releasing a task's registration.
///
/// Created before the task is spawned and moved into its future, so the
/// registration is released whether the task completes, is cancelled, or is
/// dropped before its first poll.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<CancellationRegistry>,
    id: EffectId,
    key: Option<TaskKey>,
    ready: Option<oneshot::Receiver<TaskKey>>,
}

impl Registration {
    /// Create a guard plus the sender that delivers its key once the task
    /// has been registered
    #[must_use]
    pub fn pending(registry: Arc<CancellationRegistry>, id: EffectId) -> (Self, oneshot::Sender<TaskKey>) {
        let (tx, rx) = oneshot::channel();
        let registration = Self {
            registry,
            id,
            key: None,
            ready: Some(rx),
        };
        (registration, tx)
    }

    /// Wait until the task is registered
    ///
    /// If the key is never delivered the task simply runs unregistered.
    pub async fn ready(&mut self) {
        if let Some(ready) = self.ready.take() {
            self.key = ready.await.ok();
        }
    }

    /// The registered key, once known
    #[must_use]
    pub const fn key(&self) -> Option<TaskKey> {
        self.key
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let key = self
            .key
            .or_else(|| self.ready.as_mut().and_then(|ready| ready.try_recv().ok()));
        if let Some(key) = key {
            self.registry.unregister(&self.id, key);
        }
    }
}
