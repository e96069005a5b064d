//! The single concrete context implementation behind the three
//! capability-narrowed views of `spec.md` §3: `StartContext`, `Context`,
//! and `HandlerContext`. Each view wraps the same `Arc<ContextCore<B>>`
//! and simply exposes a different subset of inherent methods — "the
//! distinction is a capability-narrowing one" (`spec.md` §4.2).

use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::actor::Actor;
use crate::error::{ActorError, UserError};
use crate::handler::SignalHandlerChain;
use crate::mailbox::Mailbox;
use crate::signal::{Signal, SignalMessage};
use crate::state::{ActorState, AtomicState};

thread_local! {
    static CURRENT_ACTOR: RefCell<Option<Arc<dyn Any + Send + Sync>>> = const { RefCell::new(None) };
}

/// RAII guard that binds the thread-local "current actor" for the
/// lifetime of the actor's mailbox-loop thread, and removes it on thread
/// exit, per `spec.md` §5 ("automatically removed on thread exit").
pub(crate) struct CurrentActorGuard;

impl CurrentActorGuard {
    pub(crate) fn bind<B: 'static>(core: Arc<ContextCore<B>>) -> CurrentActorGuard {
        CURRENT_ACTOR.with(|cell| {
            *cell.borrow_mut() = Some(core as Arc<dyn Any + Send + Sync>);
        });
        CurrentActorGuard
    }
}

impl Drop for CurrentActorGuard {
    fn drop(&mut self) {
        CURRENT_ACTOR.with(|cell| {
            *cell.borrow_mut() = None;
        });
    }
}

/// Returns the actor bound to the calling thread, checked against the
/// given behavior type `B` (`spec.md` §4.1.1, `current_actor(type)`).
/// Fails with [`ActorError::NoCurrentActor`] if no actor is bound, or
/// [`ActorError::TypeMismatch`] if the bound actor's behavior type is not
/// `B`.
pub fn current_actor<B: 'static>() -> Result<Context<B>, ActorError> {
    CURRENT_ACTOR.with(|cell| {
        let borrowed = cell.borrow();
        let any_arc = borrowed.as_ref().ok_or(ActorError::NoCurrentActor)?;
        let core = any_arc
            .clone()
            .downcast::<ContextCore<B>>()
            .map_err(|_| ActorError::TypeMismatch)?;
        Ok(Context { core })
    })
}

/// Fields shared by all three context views.
pub(crate) struct ContextCore<B> {
    pub(crate) mailbox: Mailbox<B>,
    pub(crate) owner_thread: ThreadId,
    pub(crate) state: Arc<AtomicState>,
    pub(crate) handlers: Arc<SignalHandlerChain<B>>,
    restart_requested: AtomicBool,
}

impl<B: 'static> ContextCore<B> {
    pub(crate) fn new(
        mailbox: Mailbox<B>,
        owner_thread: ThreadId,
        state: Arc<AtomicState>,
        handlers: Arc<SignalHandlerChain<B>>,
    ) -> ContextCore<B> {
        ContextCore {
            mailbox,
            owner_thread,
            state,
            handlers,
            restart_requested: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ActorState {
        self.state.get()
    }

    pub(crate) fn request_restart(&self) {
        self.restart_requested.store(true, Ordering::Release);
    }

    /// Tests and clears the restart flag; consulted by the mailbox loop
    /// after every handler invocation (`spec.md` §4.1.2 step 5).
    pub(crate) fn take_restart_request(&self) -> bool {
        self.restart_requested.swap(false, Ordering::AcqRel)
    }

    fn post_to<Dest: 'static>(
        &self,
        mailbox: &Mailbox<Dest>,
        apply: impl FnOnce(&mut Dest) -> Result<(), UserError> + Send + 'static,
    ) {
        mailbox.post_user_message(apply);
    }

    /// Posts a fire-and-forget shutdown signal to the current actor's own
    /// mailbox (`spec.md` §4.1.1, §4.1.4).
    fn shutdown(&self) {
        self.mailbox
            .post_signal(SignalMessage::fire_and_forget(Signal::Shutdown));
    }

    /// Synchronously signals another actor and blocks until every one of
    /// its handlers has run (`spec.md` §4.1.1, §4.1.4).
    fn signal<Dest: 'static>(&self, target: &Mailbox<Dest>, signal: Signal) -> Result<(), ActorError> {
        if is_same_actor(&self.mailbox, target) {
            return Err(ActorError::SelfSignal);
        }
        let (message, waiter) = SignalMessage::synchronous(signal);
        target.post_signal(message);
        waiter.wait();
        Ok(())
    }

    fn spawn<C: 'static>(&self, child: Actor<C>) -> Result<Mailbox<C>, ActorError> {
        if child.owner_thread() != self.owner_thread {
            return Err(ActorError::InvalidSpawn(
                child.name().to_string(),
                "child was not constructed by the parent's owner thread",
            ));
        }
        let child_mailbox = child.mailbox_handle();
        // The parent gets a signal handler that forwards ShutdownSignal to
        // the child: on any signal delivered to the parent, synchronously
        // signal the child, so the child is fully shut down before the
        // parent's own handler chain completes (`spec.md` §4.1.5).
        let forwarded_child = child_mailbox.clone();
        self.handlers.append(Arc::new(move |_parent_ctx, _signal| {
            if !forwarded_child.is_disconnected() {
                let (message, waiter) = SignalMessage::synchronous(Signal::Shutdown);
                forwarded_child.post_signal(message);
                waiter.wait();
            }
        }));
        child.start()?;
        Ok(child_mailbox)
    }

    /// Non-returning: aborts current message processing with a panic
    /// carrying `cause` (`spec.md` §4.1.1).
    fn panic_now(&self, cause: impl Into<UserError>) -> ! {
        std::panic::panic_any(PanicCarrier(cause.into()))
    }
}

/// Wraps a user failure so the mailbox loop's `catch_unwind` can recover
/// the original error instead of an opaque `Box<dyn Any>`.
pub(crate) struct PanicCarrier(pub(crate) UserError);

/// Two mailboxes name the same actor only if they share a behavior type
/// and the process-wide unique id assigned at mailbox creation.
fn is_same_actor<B: 'static, Dest: 'static>(a: &Mailbox<B>, b: &Mailbox<Dest>) -> bool {
    match (b as &dyn Any).downcast_ref::<Mailbox<B>>() {
        Some(same_typed) => same_typed.id() == a.id(),
        None => false,
    }
}

/// Capability view available to the bootstrap closure passed to
/// `Actor::run` (`spec.md` §4.1.1). `Actor::run` starts a heterogeneous
/// group of actors (possibly of different behavior types), and no actor is
/// bound on the caller's thread while bootstrap code runs, so
/// `StartContext` is not parameterized on any one behavior type: it only
/// exposes posting messages to whichever mailboxes the bootstrap closure
/// was handed.
#[derive(Clone, Copy, Default)]
pub struct StartContext {
    _private: (),
}

impl StartContext {
    pub(crate) fn new() -> StartContext {
        StartContext { _private: () }
    }

    /// Posts a user message to an actor's mailbox.
    pub fn post_to<Dest: 'static>(
        &self,
        mailbox: &Mailbox<Dest>,
        apply: impl FnOnce(&mut Dest) -> Result<(), UserError> + Send + 'static,
    ) {
        mailbox.post_user_message(apply);
    }

    /// Posts a shutdown signal to an actor's mailbox.
    pub fn shutdown<Dest: 'static>(&self, mailbox: &Mailbox<Dest>) {
        mailbox.post_signal(SignalMessage::fire_and_forget(Signal::Shutdown));
    }
}

/// Capability view available inside a behavior while processing a user
/// message (`spec.md` §3, §4.1.1).
pub struct Context<B> {
    core: Arc<ContextCore<B>>,
}

impl<B> Clone for Context<B> {
    fn clone(&self) -> Self {
        Context {
            core: self.core.clone(),
        }
    }
}

impl<B: 'static> Context<B> {
    pub(crate) fn new(core: Arc<ContextCore<B>>) -> Context<B> {
        Context { core }
    }

    pub(crate) fn core(&self) -> &Arc<ContextCore<B>> {
        &self.core
    }

    pub fn state(&self) -> ActorState {
        self.core.state()
    }

    pub fn mailbox(&self) -> &Mailbox<B> {
        &self.core.mailbox
    }

    pub fn post_to<Dest: 'static>(
        &self,
        mailbox: &Mailbox<Dest>,
        apply: impl FnOnce(&mut Dest) -> Result<(), UserError> + Send + 'static,
    ) {
        self.core.post_to(mailbox, apply);
    }

    /// Posts a shutdown signal to the current actor's own mailbox and
    /// returns immediately (`spec.md` §4.1.1).
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    /// Synchronously signals another actor, blocking until all of its
    /// handlers have run. Fails with [`ActorError::SelfSignal`] if `target`
    /// is the current actor's own mailbox.
    pub fn signal<Dest: 'static>(&self, target: &Mailbox<Dest>, signal: Signal) -> Result<(), ActorError> {
        self.core.signal(target, signal)
    }

    /// Starts a child actor from inside the current actor's behavior
    /// (`spec.md` §4.1.1, §4.1.5).
    pub fn spawn<C: 'static>(&self, child: Actor<C>) -> Result<Mailbox<C>, ActorError> {
        self.core.spawn(child)
    }

    /// Aborts current message processing with a panic carrying `cause`
    /// (`spec.md` §4.1.1). Never returns.
    pub fn panic(&self, cause: impl Into<UserError>) -> ! {
        self.core.panic_now(cause)
    }
}

/// Capability view available inside a signal handler (`spec.md` §3,
/// §4.1.1). Handlers always run on the target actor's own thread, so
/// `restart()` here is sound without any cross-thread synchronization.
pub struct HandlerContext<B> {
    core: Arc<ContextCore<B>>,
}

impl<B> Clone for HandlerContext<B> {
    fn clone(&self) -> Self {
        HandlerContext {
            core: self.core.clone(),
        }
    }
}

impl<B: 'static> HandlerContext<B> {
    pub(crate) fn new(core: Arc<ContextCore<B>>) -> HandlerContext<B> {
        HandlerContext { core }
    }

    pub fn state(&self) -> ActorState {
        self.core.state()
    }

    pub fn post_to<Dest: 'static>(
        &self,
        mailbox: &Mailbox<Dest>,
        apply: impl FnOnce(&mut Dest) -> Result<(), UserError> + Send + 'static,
    ) {
        self.core.post_to(mailbox, apply);
    }

    pub fn signal<Dest: 'static>(&self, target: &Mailbox<Dest>, signal: Signal) -> Result<(), ActorError> {
        self.core.signal(target, signal)
    }

    /// Requests that, once the current handler chain finishes running,
    /// the mailbox loop clear pending messages and rebuild the behavior
    /// from the factory (`spec.md` §4.1.1, §4.1.2 step 5).
    pub fn restart(&self) {
        self.core.request_restart();
    }

    pub fn panic(&self, cause: impl Into<UserError>) -> ! {
        self.core.panic_now(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    struct ManagerState {
        hello: Option<Actor<Vec<String>>>,
        child: Arc<StdMutex<Option<Mailbox<Vec<String>>>>>,
    }

    /// Scenario 4 (`spec.md` §8): a manager spawns a `Hello` child, relays
    /// its mailbox onward, and posts a greeting to it. On the manager's
    /// shutdown, the child must have fully run its own signal handlers
    /// before `Actor::run` returns (`spec.md` §4.1.5).
    #[test]
    fn parent_shutdown_cascades_to_spawned_child() {
        let greetings = Arc::new(StdMutex::new(Vec::new()));
        let child_terminated = Arc::new(AtomicBool::new(false));

        let hello: Actor<Vec<String>> = Actor::of("Hello").unwrap();
        hello.behavior(|_ctx| Vec::new()).unwrap();
        let child_terminated_for_handler = child_terminated.clone();
        hello
            .on_signal(move |_ctx, _signal| {
                child_terminated_for_handler.store(true, Ordering::SeqCst);
            })
            .unwrap();

        let child_slot = Arc::new(StdMutex::new(None));
        let manager: Actor<ManagerState> = Actor::of("Manager").unwrap();
        let hello_cell = StdMutex::new(Some(hello));
        let child_slot_for_factory = child_slot.clone();
        manager
            .behavior(move |_ctx| ManagerState {
                hello: hello_cell.lock().unwrap().take(),
                child: child_slot_for_factory.clone(),
            })
            .unwrap();
        let manager_mailbox = manager.mailbox_handle();

        manager_mailbox.post_user_message(|state: &mut ManagerState| {
            let ctx = current_actor::<ManagerState>().expect("manager is current actor");
            let child = state.hello.take().expect("hello actor present exactly once");
            let child_mailbox = ctx.spawn(child).expect("spawn from owner-thread-created child");
            *state.child.lock().unwrap() = Some(child_mailbox);
            Ok(())
        });
        let greetings_for_message = greetings.clone();
        manager_mailbox.post_user_message(move |state: &mut ManagerState| {
            let child_mailbox = state.child.lock().unwrap().clone().expect("child spawned by prior message");
            let greetings_for_message = greetings_for_message.clone();
            child_mailbox.post_user_message(move |hello_state: &mut Vec<String>| {
                hello_state.push("hi".to_string());
                greetings_for_message.lock().unwrap().push("hi".to_string());
                Ok(())
            });
            Ok(())
        });

        Actor::run(vec![manager], |start| {
            start.shutdown(&manager_mailbox);
        });

        assert_eq!(*greetings.lock().unwrap(), vec!["hi".to_string()]);
        assert!(child_terminated.load(Ordering::SeqCst), "spawned child must be shut down by the parent cascade");
    }

    /// Scenario 5 (`spec.md` §8): after `signal(target, ..)` returns, every
    /// one of the target's handlers has already run — here, one that
    /// sleeps before flipping a flag.
    #[test]
    fn signal_is_a_happens_before_edge_with_respect_to_target_handlers() {
        let flag = Arc::new(AtomicBool::new(false));
        let actor_a: Actor<()> = Actor::of("A").unwrap();
        actor_a.behavior(|_ctx| ()).unwrap();
        let flag_for_handler = flag.clone();
        actor_a
            .on_signal(move |_ctx, _signal| {
                std::thread::sleep(Duration::from_millis(200));
                flag_for_handler.store(true, Ordering::SeqCst);
            })
            .unwrap();
        let mailbox_a = actor_a.mailbox_handle();

        let actor_b: Actor<Mailbox<()>> = Actor::of("B").unwrap();
        actor_b.behavior(move |_ctx| mailbox_a.clone()).unwrap();
        let mailbox_b = actor_b.mailbox_handle();
        mailbox_b.post_user_message(|target: &mut Mailbox<()>| {
            let ctx = current_actor::<Mailbox<()>>().expect("B is current actor");
            ctx.signal(target, Signal::Shutdown).expect("A is not B");
            Ok(())
        });

        mailbox_b.post_signal(crate::signal::SignalMessage::fire_and_forget(Signal::Shutdown));

        // `actor_a` and `actor_b` have different behavior types, and
        // `Actor::run` batches one concrete `Actor<B>` per call; start
        // each directly instead of trying to share one cohort.
        let started = Instant::now();
        let handle_a = actor_a.start().unwrap();
        let handle_b = actor_b.start().unwrap();
        handle_a.join().unwrap();
        handle_b.join().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(190));
        assert!(flag.load(Ordering::SeqCst), "B's signal() must not return before A's handler finished");
    }

    /// Boundary behavior (`spec.md` §8): `signal(self, ..)` must fail with
    /// `ActorError::SelfSignal`.
    #[test]
    fn signaling_self_is_rejected() {
        let observed = Arc::new(StdMutex::new(None));
        let actor: Actor<()> = Actor::of("solo").unwrap();
        actor.behavior(|_ctx| ()).unwrap();
        let mailbox = actor.mailbox_handle();
        let observed_clone = observed.clone();
        let mailbox_for_message = mailbox.clone();
        mailbox.post_user_message(move |_state| {
            let ctx = current_actor::<()>().expect("solo is current actor");
            let result = ctx.signal(&mailbox_for_message, Signal::Shutdown);
            *observed_clone.lock().unwrap() = Some(matches!(result, Err(ActorError::SelfSignal)));
            ctx.shutdown();
            Ok(())
        });
        Actor::run(vec![actor], |_start| {});
        assert_eq!(*observed.lock().unwrap(), Some(true));
    }

    /// Boundary behavior (`spec.md` §8): `current_actor::<WrongType>()`
    /// fails with `ActorError::TypeMismatch`, and calling it from a thread
    /// with nothing bound fails with `ActorError::NoCurrentActor`.
    #[test]
    fn current_actor_type_check_and_unbound_thread() {
        assert!(matches!(current_actor::<()>(), Err(ActorError::NoCurrentActor)));

        let observed = Arc::new(StdMutex::new(None));
        let actor: Actor<()> = Actor::of("typed").unwrap();
        actor.behavior(|_ctx| ()).unwrap();
        let mailbox = actor.mailbox_handle();
        let observed_clone = observed.clone();
        mailbox.post_user_message(move |_state| {
            let mismatch = current_actor::<Vec<i32>>();
            *observed_clone.lock().unwrap() = Some(matches!(mismatch, Err(ActorError::TypeMismatch)));
            Ok(())
        });
        Actor::run(vec![actor], |start| {
            start.shutdown(&mailbox);
        });
        assert_eq!(*observed.lock().unwrap(), Some(true));
    }

    /// Boundary behavior (`spec.md` §8): spawning a child actor that was
    /// constructed on a different thread than the parent's owner thread
    /// must fail with `ActorError::InvalidSpawn`.
    #[test]
    fn spawn_rejects_child_from_a_different_owner_thread() {
        let child: Actor<()> = std::thread::spawn(|| {
            let child = Actor::of("foreign-child").unwrap();
            child.behavior(|_ctx| ()).unwrap();
            child
        })
        .join()
        .unwrap();

        let observed = Arc::new(StdMutex::new(None));
        let child_cell = StdMutex::new(Some(child));
        let parent: Actor<()> = Actor::of("parent").unwrap();
        let observed_for_factory = observed.clone();
        parent
            .behavior(move |ctx| {
                let child = child_cell.lock().unwrap().take().unwrap();
                let result = ctx.spawn(child);
                *observed_for_factory.lock().unwrap() = Some(matches!(result, Err(ActorError::InvalidSpawn(..))));
            })
            .unwrap();
        let mailbox = parent.mailbox_handle();
        Actor::run(vec![parent], |start| {
            start.shutdown(&mailbox);
        });
        assert_eq!(*observed.lock().unwrap(), Some(true));
    }
}
