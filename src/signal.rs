//! Signals and the signal-message rendezvous (`spec.md` §3.3, §4.1.4).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::UserError;

/// The closed set of termination events (`spec.md` §3.3).
#[derive(Debug, Clone)]
pub enum Signal {
    /// The single canonical termination event.
    Shutdown,
    /// Carries the exception that caused a panic. Cloned across handler
    /// invocations via `Arc`, since the underlying error is not `Clone`.
    Panic(Arc<UserError>),
}

impl Signal {
    pub(crate) fn panic(cause: impl Into<UserError>) -> Signal {
        Signal::Panic(Arc::new(cause.into()))
    }
}

/// The mutex+condvar rendezvous a `SignalMessage` carries, per `spec.md`
/// §4.1.4. `done` starts `false` for synchronous signals (the sender waits
/// for it) and `true` for fire-and-forget signals (no one ever waits).
struct Rendezvous {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// An internal message carrying a [`Signal`]. Never applied to a behavior;
/// encountering one in the mailbox terminates the loop (`spec.md` §3.2).
pub(crate) struct SignalMessage {
    pub(crate) signal: Signal,
    rendezvous: Option<Arc<Rendezvous>>,
}

impl SignalMessage {
    /// Fire-and-forget variant used by `Context::shutdown()`: posted to the
    /// actor's own mailbox, never waited on.
    pub(crate) fn fire_and_forget(signal: Signal) -> SignalMessage {
        SignalMessage {
            signal,
            rendezvous: None,
        }
    }

    /// Synchronous variant used by `HandlerContext::signal(target, ..)`.
    /// Returns the message to post plus a [`SignalWaiter`] the sender
    /// blocks on until the target's handler chain has fully run.
    pub(crate) fn synchronous(signal: Signal) -> (SignalMessage, SignalWaiter) {
        let rendezvous = Arc::new(Rendezvous {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let message = SignalMessage {
            signal: signal.clone(),
            rendezvous: Some(rendezvous.clone()),
        };
        (message, SignalWaiter { rendezvous })
    }

    /// Marks this message as processed, waking any blocked sender. A
    /// no-op for fire-and-forget messages.
    pub(crate) fn mark_done(&self) {
        if let Some(rendezvous) = &self.rendezvous {
            let mut done = rendezvous.done.lock();
            *done = true;
            rendezvous.condvar.notify_all();
        }
    }
}

/// Held by the sender of a synchronous signal; blocks until the target
/// actor's handler chain has completed.
pub(crate) struct SignalWaiter {
    rendezvous: Arc<Rendezvous>,
}

impl SignalWaiter {
    /// Blocks until `mark_done` is called on the paired [`SignalMessage`].
    ///
    /// If the calling thread is interrupted while waiting, the
    /// interruption is remembered and re-asserted once `done` becomes
    /// true, so the caller still observes the target's handlers as having
    /// run before it sees the interruption (`spec.md` §4.1.4).
    pub(crate) fn wait(&self) {
        let mut done = self.rendezvous.done.lock();
        let mut was_interrupted = false;
        while !*done {
            let timed_out = self
                .rendezvous
                .condvar
                .wait_for(&mut done, Duration::from_millis(20))
                .timed_out();
            if timed_out && crate::interrupt::take_interrupted() {
                was_interrupted = true;
            }
        }
        if was_interrupted {
            crate::interrupt::reassert();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fire_and_forget_mark_done_is_harmless() {
        let message = SignalMessage::fire_and_forget(Signal::Shutdown);
        message.mark_done();
    }

    #[test]
    fn synchronous_wait_blocks_until_marked_done() {
        let (message, waiter) = SignalMessage::synchronous(Signal::Shutdown);
        let observed = Arc::new(Mutex::new(false));
        let observed_clone = observed.clone();
        let handle = thread::spawn(move || {
            waiter.wait();
            *observed_clone.lock() = true;
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!*observed.lock());
        message.mark_done();
        handle.join().unwrap();
        assert!(*observed.lock());
    }

    #[test]
    fn interruption_during_wait_is_reasserted_after_done() {
        let (message, waiter) = SignalMessage::synchronous(Signal::Shutdown);
        let handle = thread::spawn(move || {
            crate::interrupt::interrupt_current_thread();
            waiter.wait();
            crate::interrupt::is_interrupted()
        });
        thread::sleep(Duration::from_millis(60));
        message.mark_done();
        assert!(handle.join().unwrap());
    }
}
