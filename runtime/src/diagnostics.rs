//! Non-fatal runtime diagnostics.
//!
//! Failures that should not stop the store (an effect body returning an
//! error without a handler, a panicking body, a send with no state bound)
//! are reported to an injectable [`Diagnostics`] collaborator.

use serde::Serialize;
use uniflow_core::dispatch::EffectContext;

/// A non-fatal problem observed by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A `run` body failed and no error handler was attached
    EffectFailed {
        /// Dispatch chain the effect belonged to
        context: EffectContext,
        /// Rendered error
        error: String,
    },

    /// A `run` body or error handler panicked
    TaskPanicked {
        /// Dispatch chain the effect belonged to
        context: EffectContext,
        /// Panic message
        message: String,
    },

    /// An action was sent before any state container was bound
    UnboundDispatch {
        /// Dispatch chain of the rejected action
        context: EffectContext,
    },

    /// An action was sent after shutdown began
    DispatchRejected {
        /// Dispatch chain of the rejected action
        context: EffectContext,
    },
}

impl Diagnostic {
    /// Dispatch chain the diagnostic belongs to
    #[must_use]
    pub const fn context(&self) -> EffectContext {
        match self {
            Self::EffectFailed { context, .. }
            | Self::TaskPanicked { context, .. }
            | Self::UnboundDispatch { context }
            | Self::DispatchRejected { context } => *context,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EffectFailed { context, error } => {
                write!(f, "[{context}] effect failed: {error}")
            },
            Self::TaskPanicked { context, message } => {
                write!(f, "[{context}] effect panicked: {message}")
            },
            Self::UnboundDispatch { context } => {
                write!(f, "[{context}] action sent with no state bound")
            },
            Self::DispatchRejected { context } => {
                write!(f, "[{context}] action sent after shutdown")
            },
        }
    }
}

/// Sink for runtime diagnostics
pub trait Diagnostics: Send + Sync {
    /// Report one diagnostic
    fn report(&self, diagnostic: Diagnostic);
}

/// Discards every diagnostic
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Logs diagnostics as `tracing` warnings
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            context = %diagnostic.context(),
            diagnostic = %diagnostic,
            "Runtime diagnostic"
        );
    }
}
