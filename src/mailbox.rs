//! The actor mailbox (`spec.md` §3.1, §3.2): an unbounded FIFO, blocking on
//! empty, non-blocking on push, multi-producer/single-consumer.
//!
//! Built on `flume`, which this crate's lineage already used for exactly
//! this purpose before later revisions of the teacher crate moved to an
//! async runtime — `flume::Sender::send` never blocks on an unbounded
//! channel, and `flume::Receiver::recv` blocks the calling thread, which is
//! precisely the pair of operations the mailbox needs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::UserError;
use crate::signal::SignalMessage;

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of work applied to a behavior, or an internal signal message
/// (`spec.md` §3.2).
pub(crate) enum Envelope<B> {
    User(Box<dyn FnOnce(&mut B) -> Result<(), UserError> + Send>),
    Signal(SignalMessage),
}

impl<B> fmt::Debug for Envelope<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::User(_) => write!(f, "Envelope::User(..)"),
            Envelope::Signal(_) => write!(f, "Envelope::Signal(..)"),
        }
    }
}

/// The producer handle of an actor's mailbox. Cheap to clone; every clone
/// shares the same underlying queue. Actors, the runtime, and user code all
/// hold clones of a `Mailbox<B>` to post messages.
pub struct Mailbox<B> {
    sender: flume::Sender<Envelope<B>>,
    id: u64,
    name: String,
}

impl<B> Clone for Mailbox<B> {
    fn clone(&self) -> Self {
        Mailbox {
            sender: self.sender.clone(),
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl<B> fmt::Debug for Mailbox<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mailbox({}#{})", self.name, self.id)
    }
}

impl<B> PartialEq for Mailbox<B> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<B> Eq for Mailbox<B> {}

impl<B> Mailbox<B> {
    pub(crate) fn actor_name(&self) -> &str {
        &self.name
    }

    /// Process-wide unique id of the mailbox, assigned at creation.
    /// Distinguishes two actors that happen to share a human-readable
    /// name (used for the `signal(self, ..)` guard).
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking, infallible push of a user message: `post_to` in
    /// `spec.md` §4.1.1. The mailbox is unbounded, so this never fails; if
    /// the actor has already shut down and dropped its receiver, the
    /// message is silently discarded, matching "posting to an already
    /// SHUTDOWN actor never crashes the poster" (`spec.md` §8).
    pub(crate) fn post_user_message(
        &self,
        apply: impl FnOnce(&mut B) -> Result<(), UserError> + Send + 'static,
    ) {
        let _ = self.sender.send(Envelope::User(Box::new(apply)));
    }

    pub(crate) fn post_signal(&self, message: SignalMessage) {
        let _ = self.sender.send(Envelope::Signal(message));
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.sender.is_disconnected()
    }
}

/// The consumer half, held only by the actor's own mailbox-loop thread.
pub(crate) struct Inbox<B> {
    receiver: flume::Receiver<Envelope<B>>,
}

impl<B> Inbox<B> {
    /// Blocks until a message is available. Returns `None` only if every
    /// `Mailbox<B>` sender has been dropped and the queue is drained — the
    /// practical realization, in this substrate, of "taking interrupted"
    /// (`spec.md` §4.1.2 step 2): there is no other source of a blocked
    /// `recv` failing in a thread-per-actor model with no OS-level thread
    /// interruption.
    pub(crate) fn take(&self) -> Option<Envelope<B>> {
        self.receiver.recv().ok()
    }

    /// Non-blocking drain of every message currently queued, used by the
    /// mailbox loop's `restart()` path (`spec.md` §4.1.1, §4.1.2 step 5):
    /// "discard all queued messages and rebuild the behavior".
    pub(crate) fn drain(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

/// Creates a fresh mailbox/inbox pair for an actor named `name`.
pub(crate) fn create_mailbox<B>(name: String) -> (Mailbox<B>, Inbox<B>) {
    let (sender, receiver) = flume::unbounded();
    let id = NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed);
    (Mailbox { sender, id, name }, Inbox { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_delivery_order() {
        let (mailbox, inbox) = create_mailbox::<Vec<i32>>("test".to_string());
        for i in 0..5 {
            mailbox.post_user_message(move |state| {
                state.push(i);
                Ok(())
            });
        }
        let mut state = Vec::new();
        for _ in 0..5 {
            match inbox.take().unwrap() {
                Envelope::User(apply) => apply(&mut state).unwrap(),
                Envelope::Signal(_) => panic!("unexpected signal"),
            }
        }
        assert_eq!(state, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn posting_after_disconnect_does_not_panic() {
        let (mailbox, inbox) = create_mailbox::<()>("test".to_string());
        drop(inbox);
        mailbox.post_user_message(|_| Ok(()));
        assert!(mailbox.is_disconnected());
    }

    #[test]
    fn drain_discards_everything_queued() {
        let (mailbox, inbox) = create_mailbox::<i32>("test".to_string());
        for _ in 0..4 {
            mailbox.post_user_message(|_| Ok(()));
        }
        inbox.drain();
        assert!(matches!(mailbox.sender.len(), 0));
    }
}
