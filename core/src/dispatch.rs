//! The dispatcher handed to effect bodies, and the effect-context token.

use crate::error::EffectError;
use crate::task::SendTask;
use serde::{Deserialize, Serialize};
use std::sync::Weak;

/// Correlation token shared by an externally sent action and every action it
/// transitively triggers.
///
/// Contexts are allocated by the store for each top-level send and carried
/// explicitly by every [`Dispatcher`] derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectContext(u64);

impl EffectContext {
    /// Wrap a raw context value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw context value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EffectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Something that can run the reducer for an action and schedule its effect.
///
/// Implemented by the runtime's store. Effect code never sees this trait
/// directly, only a [`Dispatcher`].
pub trait Dispatch<A>: Send + Sync {
    /// Reduce `action` as part of the dispatch chain `context`
    fn dispatch(&self, action: A, context: EffectContext) -> SendTask;
}

/// Handle passed to every `run` effect body for sending further actions.
///
/// A dispatcher holds only a weak reference to its store: once the store is
/// gone, sends become no-ops returning [`SendTask::completed`].
pub struct Dispatcher<A> {
    target: Option<Weak<dyn Dispatch<A>>>,
    context: EffectContext,
}

impl<A> Dispatcher<A> {
    /// Create a dispatcher that forwards to `target` within `context`
    #[must_use]
    pub fn new(target: Weak<dyn Dispatch<A>>, context: EffectContext) -> Self {
        Self {
            target: Some(target),
            context,
        }
    }

    /// A dispatcher connected to nothing; every send is a no-op
    #[must_use]
    pub const fn detached(context: EffectContext) -> Self {
        Self {
            target: None,
            context,
        }
    }

    /// The dispatch chain this dispatcher belongs to
    #[must_use]
    pub const fn context(&self) -> EffectContext {
        self.context
    }

    /// Whether sends still reach a live store
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|target| target.strong_count() > 0)
    }

    /// Send an action without waiting for the work it triggers
    pub fn send(&self, action: A) -> SendTask {
        match self.target.as_ref().and_then(Weak::upgrade) {
            Some(target) => target.dispatch(action, self.context),
            None => SendTask::completed(),
        }
    }

    /// Send an action and suspend until everything it triggered has finished
    ///
    /// # Errors
    ///
    /// Propagates [`EffectError::Cancelled`] or [`EffectError::Panicked`] from
    /// the triggered work. Inside a `run` body, `?` on a cancellation ends the
    /// body quietly.
    pub async fn send_and_wait(&self, action: A) -> Result<(), EffectError> {
        self.send(action).wait().await
    }
}

impl<A> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            context: self.context,
        }
    }
}

impl<A> std::fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("context", &self.context)
            .field("attached", &self.is_attached())
            .finish()
    }
}
