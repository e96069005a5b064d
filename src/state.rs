//! Actor lifecycle state (`spec.md` §3.1, §4.1.6).

use std::sync::atomic::{AtomicU8, Ordering};

/// One of `{CREATED, RUNNING, SHUTDOWN}`. Transitions are monotonic:
/// CREATED → RUNNING → SHUTDOWN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorState {
    Created,
    Running,
    Shutdown,
}

impl ActorState {
    fn from_u8(value: u8) -> ActorState {
        match value {
            0 => ActorState::Created,
            1 => ActorState::Running,
            _ => ActorState::Shutdown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ActorState::Created => 0,
            ActorState::Running => 1,
            ActorState::Shutdown => 2,
        }
    }
}

/// Lock-free holder for [`ActorState`]. The CREATED→RUNNING transition is
/// an atomic compare-and-swap (guards against double `run()`); the
/// RUNNING→SHUTDOWN transition happens only on the actor's own thread and
/// needs only to be visible to later readers (signal handlers, accessors).
#[derive(Debug, Default)]
pub(crate) struct AtomicState(AtomicU8);

impl Default for ActorState {
    fn default() -> Self {
        ActorState::Created
    }
}

impl AtomicState {
    pub(crate) fn get(&self) -> ActorState {
        ActorState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempts the CREATED→RUNNING transition. Returns `true` if this call
    /// performed the transition, `false` if the actor was already started
    /// (a double-start).
    pub(crate) fn try_start(&self) -> bool {
        self.0
            .compare_exchange(
                ActorState::Created.as_u8(),
                ActorState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Performs the RUNNING→SHUTDOWN transition. Called only from the
    /// actor's own mailbox-loop thread.
    pub(crate) fn shutdown(&self) {
        self.0.store(ActorState::Shutdown.as_u8(), Ordering::Release);
    }

    /// Reverts a just-entered SHUTDOWN back to RUNNING. Used only by the
    /// mailbox loop's `restart()` path: `signal_now` always transitions to
    /// SHUTDOWN before invoking handlers (so handlers observe the actor as
    /// terminated, per `spec.md` §4.1.3), and `restart()` undoes that
    /// transition once the handler chain decides to rebuild rather than
    /// terminate. This is the one documented exception to otherwise
    /// monotonic state transitions.
    pub(crate) fn revive(&self) {
        self.0.store(ActorState::Running.as_u8(), Ordering::Release);
    }
}
