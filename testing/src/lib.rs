//! # Uniflow Testing
//!
//! Testing utilities and helpers for the Uniflow effect runtime.
//!
//! This crate provides:
//! - [`TestStore`]: exhaustive verification of a store and its effects
//! - [`ReducerTest`]: Given-When-Then tests for a single reducer call
//! - Mock collaborators (fixed clock, capturing diagnostics)
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use uniflow_testing::TestStore;
//!
//! #[tokio::test]
//! async fn test_increment_later() {
//!     let mut store = TestStore::new(Counter::default(), CounterReducer, ());
//!
//!     store.send(CounterAction::IncrementLater, |_| {});
//!     store
//!         .receive(Action::View(CounterAction::Increment), |state| state.count = 1)
//!         .await;
//!
//!     store.finish().await;
//! }
//! ```

use chrono::{DateTime, Utc};
use uniflow_core::environment::Clock;

pub mod reducer_test;
pub mod test_store;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};
    use uniflow_runtime::{Diagnostic, Diagnostics};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use uniflow_testing::mocks::FixedClock;
    /// use uniflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }

    /// Diagnostics sink that keeps everything it receives
    ///
    /// # Example
    ///
    /// ```ignore
    /// let diagnostics = Arc::new(CapturingDiagnostics::default());
    /// let config = StoreConfig::default().with_diagnostics(diagnostics.clone());
    /// // ... drive the store ...
    /// assert!(diagnostics.is_empty());
    /// ```
    #[derive(Debug, Default)]
    pub struct CapturingDiagnostics {
        captured: Mutex<Vec<Diagnostic>>,
    }

    impl CapturingDiagnostics {
        /// Everything reported so far
        #[must_use]
        pub fn diagnostics(&self) -> Vec<Diagnostic> {
            self.captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Drain everything reported so far
        #[must_use]
        pub fn take(&self) -> Vec<Diagnostic> {
            std::mem::take(&mut *self.captured.lock().unwrap_or_else(PoisonError::into_inner))
        }

        /// Whether nothing was reported
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
        }
    }

    impl Diagnostics for CapturingDiagnostics {
        fn report(&self, diagnostic: Diagnostic) {
            self.captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(diagnostic);
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly `tracing` subscriber
    ///
    /// Honors `RUST_LOG` and writes through the test harness's captured
    /// output. Safe to call from every test; only the first call installs.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use std::time::Duration;
    use uniflow_core::effect::{EffectId, TaskPriority};

    /// Short lowercase identifiers, drawn from a small alphabet so collisions
    /// happen often
    pub fn effect_id() -> impl Strategy<Value = EffectId> {
        "[a-d]{1,3}".prop_map(EffectId::new)
    }

    /// Debounce delays between 1ms and 500ms
    pub fn delay() -> impl Strategy<Value = Duration> {
        (1_u64..=500).prop_map(Duration::from_millis)
    }

    /// Any task priority
    pub fn priority() -> impl Strategy<Value = TaskPriority> {
        prop_oneof![
            Just(TaskPriority::High),
            Just(TaskPriority::Medium),
            Just(TaskPriority::Low),
            Just(TaskPriority::Background),
        ]
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{CapturingDiagnostics, FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
pub use test_store::TestStore;
