//! The structured asynchronous scope (`spec.md` §3.4, §4.3): a bounded
//! group of forked computations whose lifetimes are confined to the scope
//! and which are joined on every exit path.
//!
//! Built on plain `std::thread::spawn` rather than `std::thread::scope`:
//! `AsyncScope` is a long-lived value that callers fork tasks into across
//! multiple method calls, and `std::thread::scope`'s borrowed, invariant
//! lifetime cannot be threaded through a struct field. See `DESIGN.md` for
//! the full writeup of this Open Question resolution.

mod outcome;
mod stream;
mod task;

pub use outcome::{merge_outcomes, MergedOutcome, Outcome};
pub use stream::CompletionStream;
pub use task::AsyncTask;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{ScopeError, UserError};

use task::TaskInner;

#[derive(Debug)]
struct TaskPanicked(String);

impl std::fmt::Display for TaskPanicked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "async task panicked: {}", self.0)
    }
}

impl std::error::Error for TaskPanicked {}

/// Cooperative cancellation signal handed to every forked computation
/// (`spec.md` §4.3.1, §5: "on scope close, any in-flight task is
/// interrupted and reported as CANCELLED"). `std::thread` has no
/// preemptive interruption, so a computation that wants to honor scope
/// shutdown promptly must poll `is_cancelled()` at its own convenient
/// points — the same cooperative pattern `interrupt.rs` uses for the
/// actor half of this crate.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn describe_panic(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A scoped container for N concurrent computations (`spec.md` §3.4).
/// `T` is the value type every forked computation in this scope produces;
/// `spec.md` §4.3.1 notes the source parameterizes a scope by "a single
/// exception variant", which this crate models as the shared `UserError`
/// boxed-dynamic-error type rather than a second generic parameter.
pub struct AsyncScope<T: Send + 'static> {
    owner_thread: ThreadId,
    cancel_requested: Arc<AtomicBool>,
    join_handles: Mutex<Vec<JoinHandle<()>>>,
    completion_tx: flume::Sender<Arc<TaskInner<T>>>,
    completion_rx: flume::Receiver<Arc<TaskInner<T>>>,
    outstanding: AtomicUsize,
    closed: AtomicBool,
}

impl<T: Send + 'static> AsyncScope<T> {
    /// Binds the scope to the constructing thread (`spec.md` §4.3.1).
    pub fn new() -> AsyncScope<T> {
        let (completion_tx, completion_rx) = flume::unbounded();
        AsyncScope {
            owner_thread: std::thread::current().id(),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            join_handles: Mutex::new(Vec::new()),
            completion_tx,
            completion_rx,
            outstanding: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Forks a computation onto its own thread (`spec.md` §4.3.1). Not
    /// gated to the owner thread: forking from an already-forked task is
    /// permitted, matching the underlying task-scope substrate.
    ///
    /// `computation` receives a [`CancelToken`] shared with this scope: it
    /// should poll `is_cancelled()` at any point where it would otherwise
    /// block or loop, so a `close()`/`await_stream()` cancellation is
    /// observed promptly rather than only after the computation finishes
    /// on its own (`spec.md` §5, §8 scenario 2).
    pub fn fork(
        &self,
        computation: impl FnOnce(&CancelToken) -> Result<T, UserError> + Send + 'static,
    ) -> AsyncTask<T> {
        let inner = Arc::new(TaskInner::new());
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let task_inner = inner.clone();
        let completion_tx = self.completion_tx.clone();
        let cancel_requested = self.cancel_requested.clone();
        let handle = std::thread::spawn(move || {
            let token = CancelToken(cancel_requested.clone());
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| computation(&token)));
            let outcome = if cancel_requested.load(Ordering::SeqCst) {
                Outcome::Cancelled
            } else {
                match result {
                    Ok(Ok(value)) => Outcome::Success(value),
                    Ok(Err(cause)) => Outcome::Failed(Arc::new(cause)),
                    Err(panic_payload) => {
                        Outcome::Failed(Arc::new(Box::new(TaskPanicked(describe_panic(panic_payload))) as UserError))
                    }
                }
            };
            task_inner.complete(outcome);
            let _ = completion_tx.send(task_inner);
        });
        self.join_handles.lock().push(handle);
        AsyncTask { inner }
    }

    fn check_owner_thread(&self) -> Result<(), ScopeError> {
        if std::thread::current().id() != self.owner_thread {
            Err(ScopeError::WrongThread)
        } else {
            Ok(())
        }
    }

    /// Owner-thread only. Blocks until every forked task has completed,
    /// then shuts the substrate scope (`spec.md` §4.3.1).
    pub fn await_all(&self) -> Result<(), ScopeError> {
        self.check_owner_thread()?;
        self.join_all();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Owner-thread only. Hands `stream_mapper` a finite lazy sequence of
    /// outcomes in completion order; on return, cancels any still-forked
    /// task, shuts the substrate scope, and joins (`spec.md` §4.3.1,
    /// §4.3.3).
    pub fn await_stream<R>(
        &self,
        stream_mapper: impl FnOnce(&mut CompletionStream<'_, T>) -> R,
    ) -> Result<R, ScopeError> {
        self.check_owner_thread()?;
        let mut stream = CompletionStream {
            scope: self,
            remaining: self.outstanding.load(Ordering::SeqCst),
        };
        let value = stream_mapper(&mut stream);
        self.close();
        if crate::interrupt::is_interrupted() {
            return Err(ScopeError::Interrupted);
        }
        Ok(value)
    }

    /// Releases the substrate scope: requests cancellation of any
    /// still-outstanding task and joins every forked thread. Idempotent
    /// (`spec.md` §9, Open Questions).
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.join_all();
    }

    fn join_all(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.join_handles.lock());
        for handle in handles {
            if let Err(payload) = handle.join() {
                warn!(error = %describe_panic(payload), "forked task thread panicked past its own catch_unwind boundary");
            }
        }
    }
}

impl<T: Send + 'static> Default for AsyncScope<T> {
    fn default() -> Self {
        AsyncScope::new()
    }
}

impl<T: Send + 'static> Drop for AsyncScope<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn parallel_sleeps_complete_concurrently() {
        let scope: AsyncScope<i32> = AsyncScope::new();
        let started = Instant::now();
        let a = scope.fork(|_cancel| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(40)
        });
        let b = scope.fork(|_cancel| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(2)
        });
        scope.await_all().unwrap();
        let elapsed = started.elapsed();
        assert_eq!(a.get_now().unwrap() + b.get_now().unwrap(), 42);
        assert!(elapsed < Duration::from_millis(350), "tasks should run in parallel, took {elapsed:?}");
    }

    /// Proves shutdown-on-first-success actually interrupts the loser
    /// (`spec.md` §8 scenario 2) rather than merely relabeling it once it
    /// finishes sleeping on its own: the "slow" task polls its
    /// `CancelToken` in short increments, so it notices `close()`'s
    /// cancellation request well before its full sleep would have elapsed.
    #[test]
    fn await_stream_yields_first_completion_and_cancels_the_rest() {
        init_tracing();
        let scope: AsyncScope<i32> = AsyncScope::new();
        let slow = scope.fork(|cancel| {
            for _ in 0..30 {
                if cancel.is_cancelled() {
                    return Err("cancelled before finishing".into());
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(1)
        });
        let _fast = scope.fork(|_cancel| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(2)
        });
        let started = Instant::now();
        let winner = scope
            .await_stream(|stream| stream.next().unwrap())
            .unwrap();
        let elapsed = started.elapsed();
        assert!(matches!(winner, Some(Outcome::Success(2))));
        assert!(
            elapsed < Duration::from_millis(150),
            "await_stream should return once the loser notices cancellation, not after its full sleep, took {elapsed:?}"
        );
        assert!(slow.is_cancelled(), "the still-sleeping task should be reported as cancelled, not left to finish");
    }

    #[test]
    fn await_stream_is_gated_to_owner_thread() {
        let scope: Arc<AsyncScope<i32>> = Arc::new(AsyncScope::new());
        let scope_clone = scope.clone();
        let result = std::thread::spawn(move || scope_clone.await_stream(|_stream| ()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(ScopeError::WrongThread)));
    }

    #[test]
    fn failed_task_surfaces_through_get_now() {
        let scope: AsyncScope<i32> = AsyncScope::new();
        let task = scope.fork(|_cancel| Err("boom".into()));
        scope.await_all().unwrap();
        assert!(matches!(task.get_now(), Err(ScopeError::TaskFailed(_))));
    }
}
