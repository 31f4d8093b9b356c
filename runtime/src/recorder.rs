//! Action transition recording for tests.
//!
//! When recording is enabled, the store captures every action dispatched from
//! inside a running effect together with the state before and after the
//! reducer ran. Verification code claims records in emission order.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use uniflow_core::dispatch::EffectContext;
use uniflow_core::effect::EffectShape;
use uniflow_core::reducer::{ActionOf, Reducer};
use uniflow_core::state::StateContainer;

/// One reducer run, with snapshots taken around it
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTransition<A, S, P = ()> {
    /// The reduced action
    pub action: A,
    /// State before the reducer ran
    pub before: StateContainer<S, P>,
    /// State after the reducer ran
    pub after: StateContainer<S, P>,
    /// What the reducer returned
    pub effect: EffectShape<A>,
    /// Dispatch chain the action belongs to
    pub context: EffectContext,
    /// When the reducer ran
    pub recorded_at: DateTime<Utc>,
}

/// Transition type of a reducer
pub type TransitionOf<R> =
    ActionTransition<ActionOf<R>, <R as Reducer>::State, <R as Reducer>::ReducerState>;

#[derive(Debug)]
struct Record<T> {
    transition: T,
    tested: bool,
}

/// Ordered log of effect-originated transitions.
///
/// Each record carries a tested flag: verification claims a record at most
/// once. Waiters are woken through a `watch` channel whenever a record is
/// added.
#[derive(Debug)]
pub struct TransitionRecorder<A, S, P = ()> {
    records: Mutex<Vec<Record<ActionTransition<A, S, P>>>>,
    changes: watch::Sender<usize>,
}

impl<A, S, P> TransitionRecorder<A, S, P> {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            records: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// Append a transition
    pub fn record(&self, transition: ActionTransition<A, S, P>) {
        let count = {
            let mut records = self.lock();
            records.push(Record {
                transition,
                tested: false,
            });
            records.len()
        };
        self.changes.send_replace(count);
    }

    /// Number of records, claimed or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of records not claimed yet
    #[must_use]
    pub fn unclaimed_count(&self) -> usize {
        self.lock().iter().filter(|record| !record.tested).count()
    }

    /// Drop every record
    pub fn clear(&self) {
        self.lock().clear();
        self.changes.send_replace(0);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record<ActionTransition<A, S, P>>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, S, P> TransitionRecorder<A, S, P>
where
    A: Clone,
    S: Clone,
    P: Clone,
{
    /// Every record in emission order
    #[must_use]
    pub fn transitions(&self) -> Vec<ActionTransition<A, S, P>> {
        self.lock()
            .iter()
            .map(|record| record.transition.clone())
            .collect()
    }

    /// Records not claimed yet, in emission order
    #[must_use]
    pub fn unclaimed(&self) -> Vec<ActionTransition<A, S, P>> {
        self.lock()
            .iter()
            .filter(|record| !record.tested)
            .map(|record| record.transition.clone())
            .collect()
    }

    /// Claim the first unclaimed record matching `predicate`
    pub fn claim_first<F>(&self, mut predicate: F) -> Option<ActionTransition<A, S, P>>
    where
        F: FnMut(&ActionTransition<A, S, P>) -> bool,
    {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|record| !record.tested && predicate(&record.transition))?;
        record.tested = true;
        Some(record.transition.clone())
    }

    /// Wait up to `timeout` for a matching record to appear, then claim it
    pub async fn claim_within<F>(
        &self,
        timeout: Duration,
        mut predicate: F,
    ) -> Option<ActionTransition<A, S, P>>
    where
        F: FnMut(&ActionTransition<A, S, P>) -> bool,
    {
        let mut changes = self.changes.subscribe();
        let search = async {
            loop {
                changes.borrow_and_update();
                if let Some(transition) = self.claim_first(&mut predicate) {
                    return Some(transition);
                }
                if changes.changed().await.is_err() {
                    return None;
                }
            }
        };

        tokio::time::timeout(timeout, search).await.ok().flatten()
    }
}

impl<A, S, P> Default for TransitionRecorder<A, S, P> {
    fn default() -> Self {
        Self::new()
    }
}
