//! Error types shared by effect bodies, task handles and state access.

use thiserror::Error;

/// Errors observed by effect bodies and by callers awaiting a [`SendTask`].
///
/// [`EffectError::Cancelled`] is not a failure: the scheduler swallows it
/// silently. Any other variant coming out of a `run` body is routed to the
/// effect's error handler, or reported as a diagnostic when none was given.
///
/// [`SendTask`]: crate::task::SendTask
#[derive(Error, Debug)]
pub enum EffectError {
    /// The awaited work was cancelled before it completed
    #[error("Effect was cancelled")]
    Cancelled,

    /// The awaited work panicked
    #[error("Effect panicked: {0}")]
    Panicked(String),

    /// Waiting for the work timed out (the work itself keeps running)
    #[error("Timed out waiting for effect")]
    Timeout,

    /// The effect body failed
    #[error("Effect failed: {0}")]
    Failed(#[from] anyhow::Error),
}

impl EffectError {
    /// Wrap an arbitrary error as an operation failure
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Failed(error.into())
    }

    /// Whether this error only signals cancellation
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors from key-based state access through a [`FieldTable`].
///
/// [`FieldTable`]: crate::state::FieldTable
#[derive(Error, Debug)]
pub enum StateError {
    /// The container has no field table attached
    #[error("No field table attached to the state container")]
    NoFieldTable,

    /// No accessor is registered under the requested name
    #[error("Unknown state field: {0}")]
    UnknownField(String),

    /// The value could not be converted to or from the field's type
    #[error("Failed to convert state field: {0}")]
    Codec(#[from] serde_json::Error),
}
