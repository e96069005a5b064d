//! Test-only helpers for starting actors and waiting on their shutdown
//! without assembling a full [`Actor::run`] cohort for every scenario.
//!
//! Mirrors the teacher crate's `ActorContext::for_test` /`Universe` pattern:
//! a small test-local registry that owns the join handles of everything it
//! starts and can be asked to wait for all of them at once.

use std::thread::JoinHandle;

use crate::actor::Actor;
use crate::error::ActorError;
use crate::mailbox::Mailbox;
use crate::signal::{Signal, SignalMessage};

/// A started actor under test: its mailbox plus the join handle for its
/// mailbox-loop thread.
pub struct TestActor<B: 'static> {
    mailbox: Mailbox<B>,
    handle: JoinHandle<()>,
}

impl<B: 'static> TestActor<B> {
    pub fn mailbox(&self) -> &Mailbox<B> {
        &self.mailbox
    }

    /// Posts a user message built from a plain closure, discarding the
    /// `Result` error type tests rarely care about naming explicitly.
    pub fn post(&self, apply: impl FnOnce(&mut B) + Send + 'static) {
        self.mailbox.post_user_message(move |behavior| {
            apply(behavior);
            Ok(())
        });
    }

    /// Posts a shutdown signal and blocks until the actor's thread has
    /// fully joined, i.e. every signal handler has run and the mailbox
    /// loop has exited.
    pub fn shutdown_and_join(self) {
        let (message, waiter) = SignalMessage::synchronous(Signal::Shutdown);
        self.mailbox.post_signal(message);
        waiter.wait();
        let _ = self.handle.join();
    }

    /// Blocks until the actor's thread has joined, without first posting a
    /// shutdown signal — for scenarios where the actor is expected to have
    /// already shut itself down (e.g. via `ctx.shutdown()` or a panic).
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

/// Starts `actor` (which must already have a behavior factory set) on its
/// own thread and returns a handle for posting messages and waiting on
/// shutdown. Bypasses `Actor::run`'s whole-cohort bootstrap, since tests
/// usually want to drive one actor (plus whatever it spawns) directly.
pub fn spawn_for_test<B: 'static>(actor: Actor<B>) -> Result<TestActor<B>, ActorError> {
    let mailbox = actor.mailbox_handle();
    let handle = actor.start()?;
    Ok(TestActor { mailbox, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn spawn_post_and_shutdown_round_trip() {
        let count = Arc::new(AtomicUsize::new(0));
        let actor: Actor<Arc<AtomicUsize>> = Actor::of("testkit-demo").unwrap();
        let count_for_factory = count.clone();
        actor.behavior(move |_ctx| count_for_factory.clone()).unwrap();
        let test_actor = spawn_for_test(actor).unwrap();
        test_actor.post(|counter| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        test_actor.post(|counter| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        test_actor.shutdown_and_join();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
