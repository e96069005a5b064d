//! The completion-ordered lazy sequence produced by `AsyncScope::await_stream`
//! (`spec.md` §3.4, §4.3.3).

use crate::error::ScopeError;

use super::outcome::Outcome;
use super::AsyncScope;

/// A finite, non-restartable sequence of task outcomes in completion order
/// (`spec.md` §4.3.3). Every advance is gated to the scope's owner thread.
pub struct CompletionStream<'scope, T: Send + 'static> {
    pub(super) scope: &'scope AsyncScope<T>,
    pub(super) remaining: usize,
}

impl<'scope, T: Send + 'static> CompletionStream<'scope, T> {
    /// Outstanding elements not yet yielded. Known at construction and
    /// decremented by every successful `next()`. Gated to the owner thread
    /// like every other advance or size query (`spec.md` §4.3.3).
    pub fn len(&self) -> Result<usize, ScopeError> {
        if std::thread::current().id() != self.scope.owner_thread {
            return Err(ScopeError::WrongThread);
        }
        Ok(self.remaining)
    }

    pub fn is_empty(&self) -> Result<bool, ScopeError> {
        Ok(self.len()? == 0)
    }

    /// Blocks for the next task to complete, in completion order. Returns
    /// `Ok(None)` once every forked task has been yielded. A cooperative
    /// interruption observed while waiting ends the sequence early — also
    /// `Ok(None)` — after re-asserting the interrupt flag (`spec.md`
    /// §4.3.3).
    pub fn next(&mut self) -> Result<Option<Outcome<T>>, ScopeError>
    where
        T: Clone,
    {
        if std::thread::current().id() != self.scope.owner_thread {
            return Err(ScopeError::WrongThread);
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        loop {
            match self
                .scope
                .completion_rx
                .recv_timeout(std::time::Duration::from_millis(20))
            {
                Ok(task_inner) => {
                    self.remaining -= 1;
                    return Ok(Some(task_inner.peek_outcome()));
                }
                Err(flume::RecvTimeoutError::Timeout) => {
                    if crate::interrupt::take_interrupted() {
                        crate::interrupt::reassert();
                        return Ok(None);
                    }
                }
                Err(flume::RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}
