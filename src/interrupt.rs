//! Cooperative, thread-local interrupt flag.
//!
//! The source this crate is modeled on runs on a substrate with real
//! preemptive thread interruption (`Thread.interrupt()` in the JDK sense).
//! Rust's `std::thread` offers no equivalent, so blocking operations in this
//! crate (mailbox `take`, the signal rendezvous condvar wait, the scope
//! completion-queue take) cooperate with a flag set explicitly by the
//! caller rather than an OS-delivered signal. This is the substrate
//! primitive `spec.md` §1 calls out as out of scope for respecification; we
//! still need *something* to hang the spec's "interruption" behavior on, so
//! we model it the same way `tokio`'s `CancellationToken` or a `KillSwitch`
//! would: a flag, checked at well-defined points.

use std::cell::Cell;

thread_local! {
    static INTERRUPTED: Cell<bool> = const { Cell::new(false) };
}

/// Marks the calling thread as interrupted. The next blocking operation in
/// this crate that polls the flag on this thread will observe it and
/// unwind with an interrupted error; the flag is cleared at that point,
/// matching `Thread.interrupted()` semantics (test-and-clear).
pub fn interrupt_current_thread() {
    INTERRUPTED.with(|flag| flag.set(true));
}

/// Tests and clears the calling thread's interrupt flag.
pub(crate) fn take_interrupted() -> bool {
    INTERRUPTED.with(|flag| flag.replace(false))
}

/// Tests the calling thread's interrupt flag without clearing it.
pub(crate) fn is_interrupted() -> bool {
    INTERRUPTED.with(|flag| flag.get())
}

/// Re-asserts the interrupt flag on the calling thread, used after a
/// blocking wait that absorbed an interruption but must still let the
/// caller observe it afterwards (`spec.md` §4.1.4).
pub(crate) fn reassert() {
    INTERRUPTED.with(|flag| flag.set(true));
}
