//! The append-only signal-handler chain (`spec.md` §3.1, §4.1.3, §9).
//!
//! "Append-only list, safe for concurrent append and iteration; iteration
//! is safe without locking if each iteration takes a snapshot. A
//! copy-on-write list is appropriate" — this is exactly `arc_swap::ArcSwap`
//! over an immutable `Vec`: appends build a new `Vec` and swap the pointer;
//! iteration loads the current `Arc<Vec<_>>` once and walks a stable
//! snapshot.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::context::HandlerContext;
use crate::signal::Signal;

pub(crate) type SignalHandler<B> = Arc<dyn Fn(&HandlerContext<B>, &Signal) + Send + Sync>;

pub(crate) struct SignalHandlerChain<B> {
    handlers: ArcSwap<Vec<SignalHandler<B>>>,
}

impl<B> Default for SignalHandlerChain<B> {
    fn default() -> Self {
        SignalHandlerChain {
            handlers: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl<B> SignalHandlerChain<B> {
    /// Appends a handler. Safe to call concurrently with `snapshot`; never
    /// observed to lose a concurrently-appended entry, since the
    /// read-modify-write is itself serialized through `rcu`.
    pub(crate) fn append(&self, handler: SignalHandler<B>) {
        self.handlers.rcu(|current| {
            let mut next = (**current).clone();
            next.push(handler.clone());
            next
        });
    }

    /// A stable snapshot of the handlers currently installed, to be
    /// invoked in insertion order.
    pub(crate) fn snapshot(&self) -> Arc<Vec<SignalHandler<B>>> {
        self.handlers.load_full()
    }
}
