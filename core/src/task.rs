//! Cancellable, awaitable handles to scheduled effect work.

use crate::error::EffectError;
use futures::future::BoxFuture;
use smallvec::SmallVec;
use std::any::Any;
use std::future::Future;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinError, JoinHandle};

/// How a task ended, cached so a handle can be awaited more than once.
#[derive(Debug, Clone)]
enum Outcome {
    Completed,
    Cancelled,
    Panicked(String),
}

impl Outcome {
    fn from_join(result: Result<(), JoinError>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(error) if error.is_cancelled() => Self::Cancelled,
            Err(error) => match error.try_into_panic() {
                Ok(payload) => Self::Panicked(panic_message(payload.as_ref())),
                Err(error) => Self::Panicked(error.to_string()),
            },
        }
    }

    fn into_result(self) -> Result<(), EffectError> {
        match self {
            Self::Completed => Ok(()),
            Self::Cancelled => Err(EffectError::Cancelled),
            Self::Panicked(message) => Err(EffectError::Panicked(message)),
        }
    }
}

/// Extract a readable message from a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Aborts a set of tasks when dropped, unless disarmed first.
///
/// Move one into a spawned future that owns child tasks: if the owning task
/// is cancelled (even before its first poll) the children are cancelled too.
#[derive(Debug, Default)]
pub struct AbortOnDrop {
    handles: SmallVec<[AbortHandle; 4]>,
}

impl AbortOnDrop {
    /// Guard every still-running task in `tasks`
    #[must_use]
    pub fn new(tasks: &[SendTask]) -> Self {
        Self {
            handles: tasks.iter().filter_map(SendTask::abort_handle).collect(),
        }
    }

    /// Release the guarded tasks without aborting them
    pub fn disarm(mut self) {
        self.handles.clear();
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

/// Handle to the work triggered by one dispatched action.
///
/// A `SendTask` owns at most one tokio task. A handle without a task means the
/// work is already complete, or there never was any.
///
/// - [`SendTask::wait`] suspends until the task ends. Dropping a pending
///   `wait()` future cancels the task.
/// - [`SendTask::cancel`] aborts the task; calling it again is harmless.
/// - Dropping the handle itself detaches the work, it keeps running.
///
/// # Example
///
/// ```ignore
/// let mut task = store.send(SearchAction::QueryChanged("rust".into()));
/// task.wait().await?;
/// ```
pub struct SendTask {
    handle: Option<JoinHandle<()>>,
    outcome: Option<Outcome>,
}

impl SendTask {
    /// A handle for work that is already done (or was a no-op)
    #[must_use]
    pub const fn completed() -> Self {
        Self {
            handle: None,
            outcome: Some(Outcome::Completed),
        }
    }

    /// Spawn `future` on the current tokio runtime and track it
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like [`tokio::spawn`].
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::from(tokio::spawn(future))
    }

    /// Aggregate several handles into one.
    ///
    /// Handles without work are dropped. No remaining work yields
    /// [`SendTask::completed`], a single task is returned as is, and more than
    /// one are joined by a group task that finishes once every child has
    /// finished. Cancelling the group cancels every child.
    pub fn join<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = SendTask>,
    {
        Self::join_with(tasks, Self::spawn)
    }

    /// Like [`SendTask::join`], but the group task is started by `spawn`
    ///
    /// Lets a caller track the group task the same way it tracks the
    /// children, for example in a pending-task count.
    pub fn join_with<I, S>(tasks: I, spawn: S) -> Self
    where
        I: IntoIterator<Item = SendTask>,
        S: FnOnce(BoxFuture<'static, ()>) -> SendTask,
    {
        let mut pending: SmallVec<[SendTask; 4]> =
            tasks.into_iter().filter(SendTask::has_work).collect();

        if pending.len() <= 1 {
            return pending.pop().unwrap_or_else(Self::completed);
        }

        let guard = AbortOnDrop::new(&pending);
        spawn(Box::pin(async move {
            Self::wait_all(&mut pending).await;
            guard.disarm();
        }))
    }

    /// Wait for every task in `tasks`, ignoring how each one ended
    pub async fn wait_all(tasks: &mut [SendTask]) {
        futures::future::join_all(tasks.iter_mut().map(|task| task.wait())).await;
    }

    /// Whether this handle still owns a task
    #[must_use]
    pub const fn has_work(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether the underlying work has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Abort handle for the underlying task, if there is one
    #[must_use]
    pub fn abort_handle(&self) -> Option<AbortHandle> {
        self.handle.as_ref().map(JoinHandle::abort_handle)
    }

    /// Cancel the underlying task
    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// Suspend until the work has ended
    ///
    /// # Errors
    ///
    /// - [`EffectError::Cancelled`] if the task was cancelled
    /// - [`EffectError::Panicked`] if the task panicked
    pub async fn wait(&mut self) -> Result<(), EffectError> {
        if let Some(handle) = self.handle.as_mut() {
            let guard = AbortOnDrop {
                handles: SmallVec::from_iter([handle.abort_handle()]),
            };
            let result = handle.await;
            guard.disarm();
            self.settle(result);
        }

        self.outcome.clone().unwrap_or(Outcome::Completed).into_result()
    }

    /// Wait for the work, giving up after `timeout`
    ///
    /// Unlike dropping a [`SendTask::wait`] future, timing out leaves the
    /// work running.
    ///
    /// # Errors
    ///
    /// Returns [`EffectError::Timeout`] if the timeout expires first, otherwise
    /// the same errors as [`SendTask::wait`].
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), EffectError> {
        if let Some(handle) = self.handle.as_mut() {
            let Ok(result) = tokio::time::timeout(timeout, handle).await else {
                return Err(EffectError::Timeout);
            };
            self.settle(result);
        }

        self.outcome.clone().unwrap_or(Outcome::Completed).into_result()
    }

    fn settle(&mut self, result: Result<(), JoinError>) {
        self.handle = None;
        self.outcome = Some(Outcome::from_join(result));
    }
}

impl From<JoinHandle<()>> for SendTask {
    fn from(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
            outcome: None,
        }
    }
}

impl Default for SendTask {
    fn default() -> Self {
        Self::completed()
    }
}

impl std::fmt::Debug for SendTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendTask")
            .field("has_work", &self.has_work())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
