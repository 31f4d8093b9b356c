//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when building `run` effects and action
//! batches inside reducers.

/// Create an `Effect::Run` from an async body
///
/// The body receives the dispatcher under the given name and must evaluate to
/// `Result<(), EffectError>`, so `?` works on anything convertible into
/// `anyhow::Error` after mapping with `EffectError::failed`.
///
/// # Example
///
/// ```rust,ignore
/// use uniflow_core::run_effect;
///
/// run_effect!(|send| {
///     let user = api.fetch_user(id).await.map_err(EffectError::failed)?;
///     send.send(Action::Internal(ProfileAction::Loaded(user)));
///     Ok(())
/// })
/// ```
#[macro_export]
macro_rules! run_effect {
    (|$send:ident| { $($body:tt)* }) => {
        $crate::effect::Effect::run(move |$send: $crate::dispatch::Dispatcher<_>| async move {
            $($body)*
        })
    };
}

/// Create an `Effect::SerialActions`
///
/// # Example
///
/// ```rust,ignore
/// use uniflow_core::serial;
///
/// serial![Action::View(Step::Validate), Action::View(Step::Submit)]
/// ```
#[macro_export]
macro_rules! serial {
    ($($action:expr),* $(,)?) => {
        $crate::effect::Effect::serial_actions(::std::vec![$($action),*])
    };
}

/// Create an `Effect::ConcurrentActions`
///
/// # Example
///
/// ```rust,ignore
/// use uniflow_core::concurrent;
///
/// concurrent![Action::Internal(Refresh::Feed), Action::Internal(Refresh::Inbox)]
/// ```
#[macro_export]
macro_rules! concurrent {
    ($($action:expr),* $(,)?) => {
        $crate::effect::Effect::concurrent_actions(::std::vec![$($action),*])
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Load,
        Save,
    }

    #[test]
    fn test_run_effect_macro() {
        let effect: Effect<TestAction> = run_effect!(|send| {
            let _ = send.send(TestAction::Load);
            Ok(())
        });

        assert!(matches!(effect, Effect::Run(_)));
    }

    #[test]
    fn test_serial_macro() {
        let effect = serial![TestAction::Load, TestAction::Save];
        assert!(matches!(
            effect,
            Effect::SerialActions(ref actions) if actions == &[TestAction::Load, TestAction::Save]
        ));
    }

    #[test]
    fn test_concurrent_macro() {
        let effect: Effect<TestAction> = concurrent![];
        assert!(matches!(effect, Effect::ConcurrentActions(ref actions) if actions.is_empty()));
    }
}
