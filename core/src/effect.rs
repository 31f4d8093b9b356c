//! Side effect descriptions.
//!
//! Effects are values returned from reducers and executed by the runtime's
//! scheduler. Building an effect never performs work. Combinators consume the
//! effect they wrap, so a description cannot change once built.

use crate::dispatch::Dispatcher;
use crate::error::EffectError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

/// Identity used to cancel or debounce effects.
///
/// Any string works. [`EffectId::of`] derives an id from a hashable value,
/// which keeps ids of different types apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(Cow<'static, str>);

impl EffectId {
    /// Id from a static string, usable in constants
    #[must_use]
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Id from any string
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// Id derived from the type and hash of `value`
    #[must_use]
    pub fn of<T>(value: &T) -> Self
    where
        T: Hash + ?Sized + 'static,
    {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        Self::new(format!(
            "{}#{:016x}",
            std::any::type_name::<T>(),
            hasher.finish()
        ))
    }

    /// The id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for EffectId {
    fn from(id: &'static str) -> Self {
        Self::from_static(id)
    }
}

impl From<String> for EffectId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for EffectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduling hint for `run` effects.
///
/// Tokio has no task priorities. `Low` and `Background` bodies yield to the
/// scheduler once before they start, the others start right away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Latency sensitive work
    High,
    /// Ordinary work
    #[default]
    Medium,
    /// Work that can wait
    Low,
    /// Housekeeping
    Background,
}

impl TaskPriority {
    /// Whether the body should yield before starting
    #[must_use]
    pub const fn yields_first(self) -> bool {
        matches!(self, Self::Low | Self::Background)
    }
}

/// Boxed asynchronous operation run by [`Effect::Run`]
pub type Operation<A> =
    Box<dyn FnOnce(Dispatcher<A>) -> BoxFuture<'static, Result<(), EffectError>> + Send>;

/// Recovery handler for a failed `run` operation.
///
/// Receives the failure and a dispatcher, so it can report the error back as
/// an action.
pub struct ErrorHandler<A>(
    Box<dyn FnOnce(EffectError, Dispatcher<A>) -> BoxFuture<'static, ()> + Send>,
);

impl<A> ErrorHandler<A> {
    /// Wrap an async error handler
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: FnOnce(EffectError, Dispatcher<A>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Box::new(move |error, dispatcher| {
            Box::pin(handler(error, dispatcher))
        }))
    }

    /// Invoke the handler
    pub fn call(self, error: EffectError, dispatcher: Dispatcher<A>) -> BoxFuture<'static, ()> {
        (self.0)(error, dispatcher)
    }
}

/// Payload of [`Effect::Run`]
pub struct Run<A> {
    /// Scheduling hint
    pub priority: TaskPriority,
    /// The operation; receives a dispatcher for sending further actions
    pub operation: Operation<A>,
    /// Optional handler for failures other than cancellation
    pub on_error: Option<ErrorHandler<A>>,
}

/// Effect type - describes a side effect to be executed
///
/// # Type Parameters
///
/// - `A`: The action type that effects can produce (feedback loop)
pub enum Effect<A> {
    /// No-op effect
    None,

    /// Run one asynchronous operation
    Run(Run<A>),

    /// Dispatch exactly one action
    Send(A),

    /// Dispatch actions one after another, each chain finishing before the next
    SerialActions(Vec<A>),

    /// Dispatch all actions independently
    ConcurrentActions(Vec<A>),

    /// Run effects one after another
    SerialEffects(Vec<Effect<A>>),

    /// Run effects concurrently
    ConcurrentEffects(Vec<Effect<A>>),

    /// Cancel every in-flight effect tagged with the id
    Cancel(EffectId),

    /// Run `base` only after `delay` passes without a newer effect under `id`
    Debounce {
        /// The gated effect
        base: Box<Effect<A>>,
        /// Debounce identity
        id: EffectId,
        /// Quiescence period
        delay: Duration,
    },

    /// Tag `base` with `id` so it can be cancelled
    Cancellable {
        /// The tagged effect
        base: Box<Effect<A>>,
        /// Cancellation identity
        id: EffectId,
        /// Cancel effects already running under `id` before starting
        cancel_in_flight: bool,
    },
}

impl<A> Effect<A> {
    /// No work
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// Run an asynchronous operation at the default priority
    ///
    /// # Example
    ///
    /// ```ignore
    /// Effect::run(move |send| async move {
    ///     let results = client.search(&query).await?;
    ///     send.send(Action::Internal(SearchAction::Loaded(results)));
    ///     Ok(())
    /// })
    /// ```
    pub fn run<F, Fut>(operation: F) -> Self
    where
        F: FnOnce(Dispatcher<A>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        Self::run_with(TaskPriority::default(), operation, None)
    }

    /// Run an asynchronous operation with a priority and an error handler
    pub fn run_with<F, Fut>(
        priority: TaskPriority,
        operation: F,
        on_error: Option<ErrorHandler<A>>,
    ) -> Self
    where
        F: FnOnce(Dispatcher<A>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        Self::Run(Run {
            priority,
            operation: Box::new(move |dispatcher| Box::pin(operation(dispatcher))),
            on_error,
        })
    }

    /// Dispatch one action
    #[must_use]
    pub const fn send(action: A) -> Self {
        Self::Send(action)
    }

    /// Dispatch actions in order, awaiting each chain
    #[must_use]
    pub const fn serial_actions(actions: Vec<A>) -> Self {
        Self::SerialActions(actions)
    }

    /// Dispatch actions concurrently
    #[must_use]
    pub const fn concurrent_actions(actions: Vec<A>) -> Self {
        Self::ConcurrentActions(actions)
    }

    /// Chain effects to run sequentially
    #[must_use]
    pub const fn chain(effects: Vec<Effect<A>>) -> Self {
        Self::SerialEffects(effects)
    }

    /// Combine effects to run in parallel
    #[must_use]
    pub const fn merge(effects: Vec<Effect<A>>) -> Self {
        Self::ConcurrentEffects(effects)
    }

    /// Cancel everything running under `id`
    #[must_use]
    pub fn cancel(id: impl Into<EffectId>) -> Self {
        Self::Cancel(id.into())
    }

    /// Debounce this effect under `id`
    ///
    /// Debouncing [`Effect::None`] returns it unchanged.
    #[must_use]
    pub fn debounce(self, id: impl Into<EffectId>, delay: Duration) -> Self {
        if self.is_none() {
            return self;
        }

        Self::Debounce {
            base: Box::new(self),
            id: id.into(),
            delay,
        }
    }

    /// Make this effect cancellable under `id`
    ///
    /// Wrapping [`Effect::None`] returns it unchanged. Wrapping a debounced
    /// effect moves the tag inside the debounce gate: the tag only applies
    /// once the gated effect actually starts.
    #[must_use]
    pub fn cancellable(self, id: impl Into<EffectId>, cancel_in_flight: bool) -> Self {
        match self {
            Self::None => Self::None,
            Self::Debounce {
                base,
                id: gate,
                delay,
            } => Self::Debounce {
                base: Box::new((*base).cancellable(id, cancel_in_flight)),
                id: gate,
                delay,
            },
            base => Self::Cancellable {
                base: Box::new(base),
                id: id.into(),
                cancel_in_flight,
            },
        }
    }

    /// Rewrite cancellables wrapped around a debounce so the gate runs first
    ///
    /// Nested cancellable layers are rewritten innermost first, so every tag
    /// ends up inside the gate.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Cancellable {
                base,
                id,
                cancel_in_flight,
            } => (*base).normalized().cancellable(id, cancel_in_flight),
            other => other,
        }
    }

    /// Whether this is [`Effect::None`]
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Short name of the variant, for logs and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Run(_) => "run",
            Self::Send(_) => "send",
            Self::SerialActions(_) => "serial_actions",
            Self::ConcurrentActions(_) => "concurrent_actions",
            Self::SerialEffects(_) => "serial_effects",
            Self::ConcurrentEffects(_) => "concurrent_effects",
            Self::Cancel(_) => "cancel",
            Self::Debounce { .. } => "debounce",
            Self::Cancellable { .. } => "cancellable",
        }
    }

    /// Closure-free, serializable description of this effect
    #[must_use]
    pub fn shape(&self) -> EffectShape<A>
    where
        A: Clone,
    {
        match self {
            Self::None => EffectShape::None,
            Self::Run(run) => EffectShape::Run {
                priority: run.priority,
                catches_errors: run.on_error.is_some(),
            },
            Self::Send(action) => EffectShape::Send {
                action: action.clone(),
            },
            Self::SerialActions(actions) => EffectShape::SerialActions {
                actions: actions.clone(),
            },
            Self::ConcurrentActions(actions) => EffectShape::ConcurrentActions {
                actions: actions.clone(),
            },
            Self::SerialEffects(effects) => EffectShape::SerialEffects {
                effects: effects.iter().map(Self::shape).collect(),
            },
            Self::ConcurrentEffects(effects) => EffectShape::ConcurrentEffects {
                effects: effects.iter().map(Self::shape).collect(),
            },
            Self::Cancel(id) => EffectShape::Cancel { id: id.clone() },
            Self::Debounce { base, id, delay } => EffectShape::Debounce {
                base: Box::new(base.shape()),
                id: id.clone(),
                delay: *delay,
            },
            Self::Cancellable {
                base,
                id,
                cancel_in_flight,
            } => EffectShape::Cancellable {
                base: Box::new(base.shape()),
                id: id.clone(),
                cancel_in_flight: *cancel_in_flight,
            },
        }
    }
}

impl<A> Default for Effect<A> {
    fn default() -> Self {
        Self::None
    }
}

// Manual Debug implementation since closures don't implement Debug
impl<A> std::fmt::Debug for Effect<A>
where
    A: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Run(run) => f
                .debug_struct("Effect::Run")
                .field("priority", &run.priority)
                .field("catches_errors", &run.on_error.is_some())
                .finish_non_exhaustive(),
            Self::Send(action) => f.debug_tuple("Effect::Send").field(action).finish(),
            Self::SerialActions(actions) => {
                f.debug_tuple("Effect::SerialActions").field(actions).finish()
            },
            Self::ConcurrentActions(actions) => {
                f.debug_tuple("Effect::ConcurrentActions").field(actions).finish()
            },
            Self::SerialEffects(effects) => {
                f.debug_tuple("Effect::SerialEffects").field(effects).finish()
            },
            Self::ConcurrentEffects(effects) => {
                f.debug_tuple("Effect::ConcurrentEffects").field(effects).finish()
            },
            Self::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            Self::Debounce { base, id, delay } => f
                .debug_struct("Effect::Debounce")
                .field("base", base)
                .field("id", id)
                .field("delay", delay)
                .finish(),
            Self::Cancellable {
                base,
                id,
                cancel_in_flight,
            } => f
                .debug_struct("Effect::Cancellable")
                .field("base", base)
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .finish(),
        }
    }
}

/// Serializable projection of an [`Effect`].
///
/// Mirrors the effect tree with closures replaced by what can be observed
/// about them. Transition records and reducer tests compare shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectShape<A> {
    /// No work
    None,
    /// An asynchronous operation
    Run {
        /// Scheduling hint
        priority: TaskPriority,
        /// Whether an error handler was attached
        catches_errors: bool,
    },
    /// One action
    Send {
        /// The action
        action: A,
    },
    /// Serial actions
    SerialActions {
        /// The actions, in order
        actions: Vec<A>,
    },
    /// Concurrent actions
    ConcurrentActions {
        /// The actions
        actions: Vec<A>,
    },
    /// Serial effects
    SerialEffects {
        /// The effects, in order
        effects: Vec<EffectShape<A>>,
    },
    /// Concurrent effects
    ConcurrentEffects {
        /// The effects
        effects: Vec<EffectShape<A>>,
    },
    /// Explicit cancellation
    Cancel {
        /// Cancelled id
        id: EffectId,
    },
    /// Debounced effect
    Debounce {
        /// The gated effect
        base: Box<EffectShape<A>>,
        /// Debounce identity
        id: EffectId,
        /// Quiescence period
        delay: Duration,
    },
    /// Cancellable effect
    Cancellable {
        /// The tagged effect
        base: Box<EffectShape<A>>,
        /// Cancellation identity
        id: EffectId,
        /// Whether in-flight effects are cancelled first
        cancel_in_flight: bool,
    },
}

impl<A> EffectShape<A> {
    /// Whether this is [`EffectShape::None`]
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Every action this effect sends directly, depth first
    #[must_use]
    pub fn sent_actions(&self) -> Vec<&A> {
        let mut actions = Vec::new();
        self.collect_actions(&mut actions);
        actions
    }

    fn collect_actions<'a>(&'a self, out: &mut Vec<&'a A>) {
        match self {
            Self::None | Self::Run { .. } | Self::Cancel { .. } => {},
            Self::Send { action } => out.push(action),
            Self::SerialActions { actions } | Self::ConcurrentActions { actions } => {
                out.extend(actions.iter());
            },
            Self::SerialEffects { effects } | Self::ConcurrentEffects { effects } => {
                for effect in effects {
                    effect.collect_actions(out);
                }
            },
            Self::Debounce { base, .. } | Self::Cancellable { base, .. } => {
                base.collect_actions(out);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum TestAction {
        Increment,
        Decrement,
    }

    #[test]
    fn test_wrapping_none_is_identity() {
        let effect = Effect::<TestAction>::none()
            .debounce("search", Duration::from_millis(300))
            .cancellable("search", true);
        assert!(effect.is_none());
    }

    #[test]
    fn test_cancellable_moves_inside_debounce() {
        let effect = Effect::send(TestAction::Increment)
            .debounce("gate", Duration::from_millis(100))
            .cancellable("tag", false);

        assert_eq!(
            effect.shape(),
            EffectShape::Debounce {
                base: Box::new(EffectShape::Cancellable {
                    base: Box::new(EffectShape::Send {
                        action: TestAction::Increment
                    }),
                    id: EffectId::from("tag"),
                    cancel_in_flight: false,
                }),
                id: EffectId::from("gate"),
                delay: Duration::from_millis(100),
            }
        );
    }

    #[test]
    fn test_normalized_rewrites_hand_built_nesting() {
        let effect = Effect::Cancellable {
            base: Box::new(Effect::Debounce {
                base: Box::new(Effect::send(TestAction::Decrement)),
                id: EffectId::from("gate"),
                delay: Duration::from_millis(5),
            }),
            id: EffectId::from("tag"),
            cancel_in_flight: true,
        };

        assert_eq!(effect.normalized().kind(), "debounce");
    }

    #[test]
    fn test_normalized_moves_every_nested_tag_inside_the_gate() {
        let effect = Effect::Cancellable {
            base: Box::new(Effect::Cancellable {
                base: Box::new(Effect::Debounce {
                    base: Box::new(Effect::send(TestAction::Decrement)),
                    id: EffectId::from("gate"),
                    delay: Duration::from_millis(5),
                }),
                id: EffectId::from("inner"),
                cancel_in_flight: false,
            }),
            id: EffectId::from("outer"),
            cancel_in_flight: true,
        };

        assert_eq!(
            effect.normalized().shape(),
            EffectShape::Debounce {
                base: Box::new(EffectShape::Cancellable {
                    base: Box::new(EffectShape::Cancellable {
                        base: Box::new(EffectShape::Send {
                            action: TestAction::Decrement
                        }),
                        id: EffectId::from("inner"),
                        cancel_in_flight: false,
                    }),
                    id: EffectId::from("outer"),
                    cancel_in_flight: true,
                }),
                id: EffectId::from("gate"),
                delay: Duration::from_millis(5),
            }
        );
    }

    #[test]
    fn test_shape_serializes_with_kind_tag() -> Result<(), serde_json::Error> {
        let effect = Effect::chain(vec![
            Effect::send(TestAction::Increment),
            Effect::cancel("timer"),
        ]);

        let json = serde_json::to_value(effect.shape())?;
        assert_eq!(json["kind"], "serial_effects");
        assert_eq!(json["effects"][0]["kind"], "send");
        assert_eq!(json["effects"][1]["id"], "timer");

        let back: EffectShape<TestAction> = serde_json::from_value(json)?;
        assert_eq!(back, effect.shape());
        Ok(())
    }

    #[test]
    fn test_run_shape_hides_closure() {
        let effect = Effect::<TestAction>::run_with(
            TaskPriority::Background,
            |_send| async { Ok(()) },
            Some(ErrorHandler::new(|_error, _send| async {})),
        );

        assert_eq!(
            effect.shape(),
            EffectShape::Run {
                priority: TaskPriority::Background,
                catches_errors: true,
            }
        );
        assert!(format!("{effect:?}").starts_with("Effect::Run"));
    }

    #[test]
    fn test_sent_actions_walks_the_tree() {
        let effect = Effect::merge(vec![
            Effect::serial_actions(vec![TestAction::Increment, TestAction::Decrement]),
            Effect::send(TestAction::Increment).cancellable("x", false),
        ]);

        let shape = effect.shape();
        assert_eq!(
            shape.sent_actions(),
            vec![
                &TestAction::Increment,
                &TestAction::Decrement,
                &TestAction::Increment
            ]
        );
    }

    #[test]
    fn test_effect_id_of_is_stable_and_typed() {
        assert_eq!(EffectId::of(&42_u32), EffectId::of(&42_u32));
        assert_ne!(EffectId::of(&42_u32), EffectId::of(&42_u64));
        assert_ne!(EffectId::of("a"), EffectId::of("b"));
    }

    proptest! {
        #[test]
        fn prop_wrappers_of_none_stay_none(
            id in "[a-z]{1,12}",
            delay_ms in 0_u64..10_000,
            cancel_in_flight in any::<bool>(),
        ) {
            let debounced = Effect::<TestAction>::none()
                .debounce(id.clone(), Duration::from_millis(delay_ms));
            prop_assert!(debounced.is_none());

            let tagged = Effect::<TestAction>::none().cancellable(id, cancel_in_flight);
            prop_assert!(tagged.is_none());
        }
    }
}
