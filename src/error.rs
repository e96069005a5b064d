//! Error types surfaced across the crate's public API.
//!
//! Usage errors (precondition violations such as calling a configuration
//! method off the owner thread) are modeled as closed, `thiserror`-derived
//! enums, mirroring the teacher crate's `ActorExitStatus`/`SendError` style.
//! Failures raised by user code (message handlers, async computations) are
//! carried as boxed dynamic errors rather than tied to a specific error
//! crate, since this is a library consumed by arbitrary callers.

use std::fmt;
use std::sync::Arc;

/// A user-supplied failure: the checked exception variant of `spec.md` §3.2
/// and §3.5, boxed so the runtime never needs to know its concrete type.
pub type UserError = Box<dyn std::error::Error + Send + Sync>;

/// Usage errors raised by the actor engine. These are precondition
/// violations; the runtime never attempts to recover from them on the
/// caller's behalf.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// `Actor::of` was given a null/empty behavior-type name.
    #[error("actor name must not be empty")]
    InvalidName,

    /// `behavior()` or `on_signal()` was called from a thread other than
    /// the one that constructed the actor.
    #[error("actor `{0}` was configured from a thread other than its owner thread")]
    WrongOwnerThread(String),

    /// `behavior()` or `on_signal()` was called after the actor left the
    /// `CREATED` state, or `behavior()` was called twice.
    #[error("actor `{0}` is not in the CREATED state (or its behavior is already set)")]
    NotCreated(String),

    /// `Actor::run` was asked to start an actor with no behavior factory.
    #[error("actor `{0}` has no behavior factory; call `.behavior(..)` before `run`")]
    MissingBehavior(String),

    /// An actor was started twice (double CREATED→RUNNING transition).
    #[error("actor `{0}` has already been started")]
    AlreadyStarted(String),

    /// A context operation (`post_to`, `spawn`, `shutdown`, `signal`,
    /// `restart`, `panic`, `current_actor`) was invoked with no bound
    /// current actor.
    #[error("no actor is currently bound on this thread")]
    NoCurrentActor,

    /// `current_actor::<B>()` was called but the bound actor's behavior
    /// type does not conform to `B`.
    #[error("current actor's behavior type does not conform to the requested type")]
    TypeMismatch,

    /// `HandlerContext::signal(target, ..)` was called with `target` equal
    /// to the calling actor.
    #[error("an actor cannot signal itself")]
    SelfSignal,

    /// `spawn()` was called with a child whose owner thread differs from
    /// the parent's, or whose behavior factory is unset, or that is not
    /// `CREATED`.
    #[error("child actor `{0}` cannot be spawned by the current actor: {1}")]
    InvalidSpawn(String, &'static str),
}

/// Usage errors raised by [`crate::scope::AsyncScope`] and
/// [`crate::scope::AsyncTask`].
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// An `AsyncScope` method gated to the owner thread was called from a
    /// different thread.
    #[error("AsyncScope method called from a thread other than its owner thread")]
    WrongThread,

    /// `AsyncTask::result()` or `get_now()` was called before the task
    /// completed.
    #[error("task has not completed yet")]
    NotDone,

    /// `AsyncTask::cancel()` — unsupported by design; cancellation comes
    /// only from substrate/scope shutdown.
    #[error("AsyncTask::cancel() is not supported")]
    CancelUnsupported,

    /// `AsyncTask::get(timeout)` elapsed without the task completing.
    #[error("timed out waiting for task to complete")]
    Timeout,

    /// The calling thread's cooperative interrupt flag was set while
    /// blocked in `run`, `await_all`, `await_stream`, or a task `get`.
    #[error("interrupted")]
    Interrupted,

    /// `AsyncTask::get_now()`/`get()`/`get(timeout)` observed a completed
    /// task whose computation raised a checked failure.
    #[error("async task failed: {0}")]
    TaskFailed(Arc<UserError>),
}

/// Internal, non-public control-flow marker consumed only by the mailbox
/// loop (`spec.md` §9, "Control-flow markers for panic/restart"). Never
/// escapes the crate.
pub(crate) enum ControlFlow {
    Continue,
    Restart,
}

impl fmt::Debug for ControlFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlFlow::Continue => write!(f, "Continue"),
            ControlFlow::Restart => write!(f, "Restart"),
        }
    }
}
