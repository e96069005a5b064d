//! The handle returned by `AsyncScope::fork` (`spec.md` §3.5, §4.3.2).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::ScopeError;

use super::outcome::Outcome;

enum Slot<T> {
    Pending,
    Done(Outcome<T>),
}

pub(super) struct TaskInner<T> {
    slot: Mutex<Slot<T>>,
    condvar: Condvar,
}

enum Wait {
    Ready,
    TimedOut,
    Interrupted,
}

impl<T> TaskInner<T> {
    pub(super) fn new() -> TaskInner<T> {
        TaskInner {
            slot: Mutex::new(Slot::Pending),
            condvar: Condvar::new(),
        }
    }

    pub(super) fn complete(&self, outcome: Outcome<T>) {
        let mut slot = self.slot.lock();
        *slot = Slot::Done(outcome);
        self.condvar.notify_all();
    }

    /// Reads back the outcome recorded by `complete`. Only ever called
    /// after a handle has been observed to be done (e.g. via the
    /// completion channel), so the `Pending` arm never fires in practice.
    pub(super) fn peek_outcome(&self) -> Outcome<T>
    where
        T: Clone,
    {
        match &*self.slot.lock() {
            Slot::Pending => unreachable!("peek_outcome called before completion"),
            Slot::Done(outcome) => outcome.clone(),
        }
    }

    /// Polls in short increments so a cooperative interruption of the
    /// calling thread is observed promptly (`spec.md` §4.3.2, §5), the same
    /// pattern `SignalWaiter::wait` uses.
    fn wait(&self, deadline: Option<Instant>) -> Wait {
        let mut slot = self.slot.lock();
        loop {
            if !matches!(*slot, Slot::Pending) {
                return Wait::Ready;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Wait::TimedOut;
                }
            }
            let poll = Duration::from_millis(20);
            let budget = match deadline {
                Some(deadline) => poll.min(deadline.saturating_duration_since(Instant::now())),
                None => poll,
            };
            let timed_out = self.condvar.wait_for(&mut slot, budget).timed_out();
            if timed_out && crate::interrupt::take_interrupted() {
                crate::interrupt::reassert();
                return Wait::Interrupted;
            }
        }
    }
}

/// A handle to one forked computation (`spec.md` §3.5, §4.3.2).
pub struct AsyncTask<T> {
    pub(super) inner: Arc<TaskInner<T>>,
}

impl<T> Clone for AsyncTask<T> {
    fn clone(&self) -> Self {
        AsyncTask {
            inner: self.inner.clone(),
        }
    }
}

impl<T> AsyncTask<T> {
    pub fn is_done(&self) -> bool {
        !matches!(*self.inner.slot.lock(), Slot::Pending)
    }

    /// Consults the completion state directly rather than any underlying
    /// future's own cancellation flag (`spec.md` §9, Open Questions —
    /// preserved as specified).
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.slot.lock(), Slot::Done(Outcome::Cancelled))
    }

    /// Not supported: cancellation comes only from scope shutdown
    /// (`spec.md` §4.3.2).
    pub fn cancel(&self) -> Result<(), ScopeError> {
        Err(ScopeError::CancelUnsupported)
    }
}

impl<T: Clone> AsyncTask<T> {
    /// Returns the outcome if the task has completed; fails loudly
    /// otherwise (`spec.md` §4.3.2).
    pub fn result(&self) -> Result<Outcome<T>, ScopeError> {
        match &*self.inner.slot.lock() {
            Slot::Pending => Err(ScopeError::NotDone),
            Slot::Done(outcome) => Ok(outcome.clone()),
        }
    }

    /// If done, the value or its failure/cancellation; if not done, fails
    /// loudly rather than blocking (`spec.md` §4.3.2).
    pub fn get_now(&self) -> Result<T, ScopeError> {
        match self.result()? {
            Outcome::Success(value) => Ok(value),
            Outcome::Failed(cause) => Err(ScopeError::TaskFailed(cause)),
            Outcome::Cancelled => Err(ScopeError::Interrupted),
        }
    }

    /// Blocks for the value with no deadline.
    pub fn get(&self) -> Result<T, ScopeError> {
        match self.inner.wait(None) {
            Wait::Ready => self.get_now(),
            Wait::Interrupted => Err(ScopeError::Interrupted),
            Wait::TimedOut => unreachable!("wait() was called without a deadline"),
        }
    }

    /// Blocks for the value, failing with `ScopeError::Timeout` if
    /// `timeout` elapses first (`spec.md` §4.3.2).
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, ScopeError> {
        match self.inner.wait(Some(Instant::now() + timeout)) {
            Wait::Ready => self.get_now(),
            Wait::TimedOut => Err(ScopeError::Timeout),
            Wait::Interrupted => Err(ScopeError::Interrupted),
        }
    }
}
