//! The actor type, its configuration surface, and the mailbox loop
//! (`spec.md` §3.1, §4.1).

use std::any::{type_name, Any};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::context::{Context, ContextCore, CurrentActorGuard, HandlerContext, StartContext};
use crate::error::{ActorError, ControlFlow, UserError};
use crate::handler::SignalHandlerChain;
use crate::mailbox::{create_mailbox, Envelope, Inbox, Mailbox};
use crate::signal::Signal;
use crate::state::{ActorState, AtomicState};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

type BehaviorFactory<B> = Box<dyn Fn(Context<B>) -> B + Send + Sync>;

/// An actor: identity, mailbox, behavior factory, signal-handler chain,
/// and lifecycle state (`spec.md` §3.1). Parameterized over its behavior
/// type `B`, the Rust stand-in for the arbitrary user-defined capability
/// set of the source design (`spec.md` §9).
pub struct Actor<B: 'static> {
    name: String,
    owner_thread: ThreadId,
    state: Arc<AtomicState>,
    mailbox: Mailbox<B>,
    inbox: Mutex<Option<Inbox<B>>>,
    behavior_factory: Mutex<Option<BehaviorFactory<B>>>,
    handlers: Arc<SignalHandlerChain<B>>,
}

impl<B: 'static> fmt::Debug for Actor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Actor({}, {:?})", self.name, self.state.get())
    }
}

/// A generic, unremarkable panic payload is turned into this so the
/// handler chain still receives a real `std::error::Error`.
#[derive(Debug)]
struct ActorPanicked(String);

impl fmt::Display for ActorPanicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor panicked: {}", self.0)
    }
}

impl std::error::Error for ActorPanicked {}

#[derive(Debug)]
struct MailboxDisconnected;

impl fmt::Display for MailboxDisconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor's own mailbox sender was dropped while waiting for a message")
    }
}

impl std::error::Error for MailboxDisconnected {}

impl<B: 'static> Actor<B> {
    /// Creates an actor with an explicit name (`spec.md` §4.1.1,
    /// `Actor::of`). Fails only if `name` is empty.
    pub fn of(name: impl Into<String>) -> Result<Actor<B>, ActorError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ActorError::InvalidName);
        }
        let (mailbox, inbox) = create_mailbox(name.clone());
        Ok(Actor {
            name,
            owner_thread: std::thread::current().id(),
            state: Arc::new(AtomicState::default()),
            mailbox,
            inbox: Mutex::new(Some(inbox)),
            behavior_factory: Mutex::new(None),
            handlers: Arc::new(SignalHandlerChain::default()),
        })
    }

    /// Creates an actor named after its behavior type plus a process-wide
    /// monotonically increasing counter starting at 1 (`spec.md` §3.1).
    pub fn anonymous() -> Actor<B> {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{instance}", short_type_name::<B>());
        Actor::of(name).expect("derived actor name is never empty")
    }

    /// Sets the behavior factory, invoked on start and on every restart to
    /// produce a fresh behavior instance (`spec.md` §3.1, §4.1.1). Fails
    /// off the owner thread, once the actor has left `CREATED`, or if a
    /// factory is already set.
    pub fn behavior<F>(&self, factory: F) -> Result<(), ActorError>
    where
        F: Fn(Context<B>) -> B + Send + Sync + 'static,
    {
        self.guard_configuration()?;
        let mut slot = self.behavior_factory.lock();
        if slot.is_some() {
            return Err(ActorError::NotCreated(self.name.clone()));
        }
        *slot = Some(Box::new(factory));
        Ok(())
    }

    /// Appends a signal handler, invoked in insertion order on termination
    /// (`spec.md` §3.1, §4.1.1). Same preconditions as `behavior()`, except
    /// any number of handlers may be appended.
    pub fn on_signal<F>(&self, handler: F) -> Result<(), ActorError>
    where
        F: Fn(&HandlerContext<B>, &Signal) + Send + Sync + 'static,
    {
        self.guard_configuration()?;
        self.handlers.append(Arc::new(handler));
        Ok(())
    }

    fn guard_configuration(&self) -> Result<(), ActorError> {
        if std::thread::current().id() != self.owner_thread {
            return Err(ActorError::WrongOwnerThread(self.name.clone()));
        }
        if self.state.get() != ActorState::Created {
            return Err(ActorError::NotCreated(self.name.clone()));
        }
        Ok(())
    }

    pub fn state(&self) -> ActorState {
        self.state.get()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    pub(crate) fn mailbox_handle(&self) -> Mailbox<B> {
        self.mailbox.clone()
    }

    pub(crate) fn has_behavior(&self) -> bool {
        self.behavior_factory.lock().is_some()
    }

    /// Validates and performs the CREATED→RUNNING transition, then spawns
    /// the actor's mailbox-loop thread. Used both by `Actor::run` (for the
    /// initial cohort) and by `Context::spawn` (for dynamically spawned
    /// children).
    pub(crate) fn start(self) -> Result<JoinHandle<()>, ActorError> {
        if !self.has_behavior() {
            return Err(ActorError::MissingBehavior(self.name.clone()));
        }
        if !self.state.try_start() {
            return Err(ActorError::AlreadyStarted(self.name.clone()));
        }
        let Actor {
            name,
            owner_thread: _,
            state,
            mailbox,
            inbox,
            behavior_factory,
            handlers,
        } = self;
        let inbox = inbox
            .lock()
            .take()
            .expect("inbox is only ever taken once, guarded by the CREATED->RUNNING CAS");
        let factory = behavior_factory
            .lock()
            .take()
            .expect("has_behavior() was checked above");
        let factory: Arc<BehaviorFactory<B>> = Arc::from(factory);
        let core = Arc::new(ContextCore::new(mailbox, std::thread::current().id(), state, handlers));
        let join_handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || actor_loop(inbox, factory, core))
            .expect("failed to spawn actor thread");
        Ok(join_handle)
    }

    /// Starts this actor on its own thread and blocks until it has fully
    /// terminated. Convenience for single-actor tests and the `testkit`
    /// module; most programs use `Actor::run` for a whole cohort.
    #[cfg(any(test, feature = "testsuite"))]
    pub fn start_and_join(self) -> Result<(), ActorError> {
        let handle = self.start()?;
        handle.join().expect("actor thread panicked past its own catch_unwind boundary");
        Ok(())
    }

    /// Starts every listed actor and hands a [`StartContext`] to
    /// `bootstrap`, then blocks until every started actor has terminated
    /// (`spec.md` §4.1.1). Validates the owner thread and the presence of
    /// a behavior factory for every actor before starting any of them, so
    /// a misconfigured actor late in the list never leaves earlier actors
    /// running orphaned.
    pub fn run(actors: Vec<Actor<B>>, bootstrap: impl FnOnce(&StartContext)) {
        let caller_thread = std::thread::current().id();
        for actor in &actors {
            if actor.owner_thread != caller_thread {
                panic!(
                    "actor `{}` was constructed by a different thread than the one calling Actor::run",
                    actor.name
                );
            }
            if !actor.has_behavior() {
                panic!(
                    "actor `{}` has no behavior factory; call `.behavior(..)` before `Actor::run`",
                    actor.name
                );
            }
        }
        let mut join_handles = Vec::with_capacity(actors.len());
        for actor in actors {
            let name = actor.name.clone();
            match actor.start() {
                Ok(handle) => join_handles.push(handle),
                Err(err) => panic!("actor `{name}` could not be started: {err}"),
            }
        }
        bootstrap(&StartContext::new());
        for handle in join_handles {
            let _ = handle.join();
        }
    }
}

fn short_type_name<B>() -> &'static str {
    let full = type_name::<B>();
    full.rsplit("::").next().unwrap_or(full)
}

fn run_handlers<B: 'static>(core: &Arc<ContextCore<B>>, handler_ctx: &HandlerContext<B>, signal: Signal) {
    core.state.shutdown();
    let snapshot = core.handlers.snapshot();
    for handler in snapshot.iter() {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(handler_ctx, &signal)));
        if let Err(panic_payload) = outcome {
            let cause = describe_panic(panic_payload);
            error!(actor = core.mailbox.actor_name(), error = %cause, "signal handler panicked; continuing with remaining handlers");
        }
    }
}

fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn extract_panic_cause(payload: Box<dyn Any + Send>) -> UserError {
    match payload.downcast::<crate::context::PanicCarrier>() {
        Ok(carrier) => carrier.0,
        Err(payload) => Box::new(ActorPanicked(describe_panic(payload))),
    }
}

/// Consults the restart flag a just-run handler chain may have set and
/// either rebuilds the behavior in place (`ControlFlow::Restart`) or
/// signals that the loop should terminate (`ControlFlow::Continue`, i.e.
/// no further restart — just carry on out of the loop).
fn restart_or_terminate<B: 'static>(
    core: &Arc<ContextCore<B>>,
    inbox: &mut Inbox<B>,
    factory: &Arc<BehaviorFactory<B>>,
    ctx: &Context<B>,
    behavior: &mut B,
) -> ControlFlow {
    if core.take_restart_request() {
        inbox.drain();
        core.state.revive();
        *behavior = factory(ctx.clone());
        ControlFlow::Restart
    } else {
        ControlFlow::Continue
    }
}

/// The mailbox loop (`spec.md` §4.1.2): the heart of the actor engine.
fn actor_loop<B: 'static>(
    mut inbox: Inbox<B>,
    factory: Arc<BehaviorFactory<B>>,
    core: Arc<ContextCore<B>>,
) {
    let _current_actor_guard = CurrentActorGuard::bind(core.clone());
    let ctx = Context::new(core.clone());
    let handler_ctx = HandlerContext::new(core.clone());
    let mut behavior = factory(ctx.clone());
    debug!(actor = core.mailbox.actor_name(), "actor started");

    loop {
        let envelope = match inbox.take() {
            Some(envelope) => envelope,
            None => {
                // No OS-level thread interruption exists in this
                // substrate; a disconnected mailbox (every sender
                // dropped while we were blocked in `take`) is the one
                // naturally occurring realization of "taking interrupted"
                // (`spec.md` §4.1.2 step 2). This path never restarts.
                run_handlers(&core, &handler_ctx, Signal::panic(MailboxDisconnected));
                break;
            }
        };

        let flow = match envelope {
            Envelope::Signal(message) => {
                let signal = message.signal.clone();
                run_handlers(&core, &handler_ctx, signal);
                let flow = restart_or_terminate(&core, &mut inbox, &factory, &ctx, &mut behavior);
                message.mark_done();
                flow
            }
            Envelope::User(apply) => {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| apply(&mut behavior)));
                match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(user_error)) => {
                        run_handlers(&core, &handler_ctx, Signal::panic(user_error));
                        restart_or_terminate(&core, &mut inbox, &factory, &ctx, &mut behavior)
                    }
                    Err(panic_payload) => {
                        run_handlers(&core, &handler_ctx, Signal::panic(extract_panic_cause(panic_payload)));
                        restart_or_terminate(&core, &mut inbox, &factory, &ctx, &mut behavior)
                    }
                }
            }
        };
        match flow {
            ControlFlow::Restart => {
                info!(actor = core.mailbox.actor_name(), "actor restarted");
                continue;
            }
            ControlFlow::Continue => break,
        }
    }
    info!(actor = core.mailbox.actor_name(), "actor terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn hello_actor_prints_via_message_application() {
        let greetings = Arc::new(StdMutex::new(Vec::new()));
        let actor: Actor<Vec<String>> = Actor::of("Hello").unwrap();
        actor.behavior(|_ctx| Vec::new()).unwrap();
        let greetings_for_handler = greetings.clone();
        actor
            .on_signal(move |_ctx, _signal| {
                greetings_for_handler.lock().unwrap().push("terminated".to_string());
            })
            .unwrap();
        let mailbox = actor.mailbox_handle();
        Actor::run(vec![actor], |start| {
            start.post_to(&mailbox, |state: &mut Vec<String>| {
                state.push("Hello world".to_string());
                Ok(())
            });
            start.shutdown(&mailbox);
        });
        assert_eq!(*greetings.lock().unwrap(), vec!["terminated".to_string()]);
    }

    #[test]
    fn start_then_shutdown_joins_cleanly() {
        let actor: Actor<()> = Actor::of("dup").unwrap();
        actor.behavior(|_| ()).unwrap();
        let mailbox = actor.mailbox_handle();
        let handle = actor.start().unwrap();
        mailbox.post_signal(crate::signal::SignalMessage::fire_and_forget(Signal::Shutdown));
        handle.join().unwrap();
        assert_eq!(mailbox.is_disconnected(), true);
    }

    #[test]
    fn missing_behavior_fails_to_start() {
        let actor: Actor<()> = Actor::of("no-behavior").unwrap();
        assert!(matches!(actor.start(), Err(ActorError::MissingBehavior(_))));
    }

    #[test]
    fn configuration_off_owner_thread_is_rejected() {
        let actor: Arc<Actor<()>> = Arc::new(Actor::of("cross-thread").unwrap());
        let actor_clone = actor.clone();
        let result = std::thread::spawn(move || actor_clone.behavior(|_| ()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(ActorError::WrongOwnerThread(_))));
    }

    #[test]
    fn restart_rebuilds_behavior_and_keeps_running() {
        let factory_calls = Arc::new(AtomicUsize::new(0));
        let applied = Arc::new(AtomicUsize::new(0));
        let restarts_left = Arc::new(AtomicUsize::new(1));
        let actor: Actor<()> = Actor::of("Counter").unwrap();
        let factory_calls_for_behavior = factory_calls.clone();
        actor
            .behavior(move |_ctx| {
                factory_calls_for_behavior.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let restarts_left_for_handler = restarts_left.clone();
        actor
            .on_signal(move |ctx, _signal| {
                if restarts_left_for_handler.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    if n > 0 {
                        Some(n - 1)
                    } else {
                        None
                    }
                }).is_ok() {
                    ctx.restart();
                }
            })
            .unwrap();
        let mailbox = actor.mailbox_handle();
        let handle = actor.start().unwrap();

        mailbox.post_user_message(|_| Ok(()));
        let (message, waiter) = crate::signal::SignalMessage::synchronous(Signal::panic(ActorPanicked(
            "trigger restart".to_string(),
        )));
        mailbox.post_signal(message);
        waiter.wait();
        assert_eq!(factory_calls.load(Ordering::SeqCst), 2, "behavior should have been rebuilt once");

        let applied_for_message = applied.clone();
        mailbox.post_user_message(move |_| {
            applied_for_message.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let (shutdown_message, shutdown_waiter) = crate::signal::SignalMessage::synchronous(Signal::Shutdown);
        mailbox.post_signal(shutdown_message);
        shutdown_waiter.wait();
        handle.join().unwrap();

        assert_eq!(applied.load(Ordering::SeqCst), 1, "message posted after restart must still be applied");
        assert_eq!(factory_calls.load(Ordering::SeqCst), 2, "second signal must not restart again");
    }
}
