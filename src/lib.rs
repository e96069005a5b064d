//! A lightweight actor runtime and structured async scope for thread-per-actor
//! concurrency.
//!
//! The crate has two independent halves that share no state:
//!
//! - the actor engine — identity, mailbox, signal-handler chains, and the
//!   parent/child shutdown cascade. Start with [`Actor`].
//! - the async scope — a bounded group of forked computations joined on
//!   every exit path. Start with [`AsyncScope`].
//!
//! Everything here is synchronous: each actor and each forked task owns one
//! OS thread, and rendezvous happens through blocking queues and
//! mutex/condvar waits. There is no reactor, no executor, no `Future`.

mod actor;
mod context;
mod error;
mod handler;
mod interrupt;
mod mailbox;
mod scope;
mod signal;
mod state;

#[cfg(any(test, feature = "testsuite"))]
pub mod testkit;

pub use actor::Actor;
pub use context::{current_actor, Context, HandlerContext, StartContext};
pub use error::{ActorError, ScopeError, UserError};
pub use interrupt::interrupt_current_thread;
pub use mailbox::Mailbox;
pub use scope::{merge_outcomes, AsyncScope, AsyncTask, CancelToken, CompletionStream, MergedOutcome, Outcome};
pub use signal::Signal;
pub use state::ActorState;
