//! Single-resolution asynchronous results.
//!
//! A [`Deferred`] settles at most once, either fulfilled with a value or
//! rejected with a [`ClientError`]. Any number of observers may be attached
//! before or after settlement; each runs at most once, in subscription
//! order, always as a task on the [`Scheduler`] and never inside the call
//! that settled or subscribed. Progress messages are the exception: they are
//! delivered synchronously, and only while the result is still pending.

use crate::error::{ClientError, ClientResult};
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type FulfilledObserver<T> = Box<dyn FnOnce(T) + Send>;
type RejectedObserver = Box<dyn FnOnce(ClientError) + Send>;
type ProgressObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Observable state of a [`Deferred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredState {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with an error.
    Rejected,
}

enum Outcome<T> {
    Pending,
    Fulfilled(T),
    Rejected(ClientError),
}

struct Shared<T> {
    outcome: Outcome<T>,
    fulfilled: Vec<FulfilledObserver<T>>,
    rejected: Vec<RejectedObserver>,
    progress: Vec<ProgressObserver>,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            outcome: Outcome::Pending,
            fulfilled: Vec::new(),
            rejected: Vec::new(),
            progress: Vec::new(),
        }
    }
}

/// Consumer side of an asynchronous result.
pub struct Deferred<T> {
    shared: Arc<Mutex<Shared<T>>>,
    scheduler: Scheduler,
}

/// Producer side of an asynchronous result.
///
/// Clones settle the same result; the first settlement wins and every later
/// one is ignored.
pub struct Resolver<T> {
    shared: Arc<Mutex<Shared<T>>>,
    scheduler: Scheduler,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Creates a result whose initializer runs on the next tick.
    pub fn new<F>(scheduler: &Scheduler, initializer: F) -> Self
    where
        F: FnOnce(Resolver<T>) + Send + 'static,
    {
        let (deferred, resolver) = Self::channel(scheduler);
        scheduler.schedule(move || initializer(resolver));
        deferred
    }

    /// Creates a pending result and the resolver that settles it.
    pub fn channel(scheduler: &Scheduler) -> (Self, Resolver<T>) {
        let shared = Arc::new(Mutex::new(Shared::new()));
        let deferred = Self {
            shared: Arc::clone(&shared),
            scheduler: scheduler.clone(),
        };
        let resolver = Resolver {
            shared,
            scheduler: scheduler.clone(),
        };
        (deferred, resolver)
    }

    /// Creates an already fulfilled result.
    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        let (deferred, resolver) = Self::channel(scheduler);
        resolver.resolve(value);
        deferred
    }

    /// Creates an already rejected result.
    pub fn rejected(scheduler: &Scheduler, error: ClientError) -> Self {
        let (deferred, resolver) = Self::channel(scheduler);
        resolver.reject(error);
        deferred
    }

    /// Creates a result settled from `result`.
    pub fn from_result(scheduler: &Scheduler, result: ClientResult<T>) -> Self {
        match result {
            Ok(value) => Self::resolved(scheduler, value),
            Err(error) => Self::rejected(scheduler, error),
        }
    }

    /// Returns the scheduler observers are delivered on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns the current state.
    pub fn state(&self) -> DeferredState {
        match self.shared.lock().outcome {
            Outcome::Pending => DeferredState::Pending,
            Outcome::Fulfilled(_) => DeferredState::Fulfilled,
            Outcome::Rejected(_) => DeferredState::Rejected,
        }
    }

    /// Returns true while not settled.
    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }

    /// Returns a copy of the settled result, if any.
    pub fn outcome(&self) -> Option<ClientResult<T>> {
        match &self.shared.lock().outcome {
            Outcome::Pending => None,
            Outcome::Fulfilled(value) => Some(Ok(value.clone())),
            Outcome::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Drives the scheduler until idle and returns the settled result.
    ///
    /// Returns `None` if the result is still pending once no tasks remain,
    /// e.g. while waiting on a passkey prompt.
    pub fn wait(&self) -> Option<ClientResult<T>> {
        self.scheduler.run_until_idle();
        self.outcome()
    }

    /// Adds a fulfillment observer.
    pub fn on_fulfilled<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut guard = self.shared.lock();
        let shared = &mut *guard;
        match &shared.outcome {
            Outcome::Pending => shared.fulfilled.push(Box::new(observer)),
            Outcome::Fulfilled(value) => {
                let value = value.clone();
                self.scheduler.schedule(move || observer(value));
            }
            Outcome::Rejected(_) => {}
        }
        self
    }

    /// Adds a rejection observer.
    pub fn on_rejected<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(ClientError) + Send + 'static,
    {
        let mut guard = self.shared.lock();
        let shared = &mut *guard;
        match &shared.outcome {
            Outcome::Pending => shared.rejected.push(Box::new(observer)),
            Outcome::Rejected(error) => {
                let error = error.clone();
                self.scheduler.schedule(move || observer(error));
            }
            Outcome::Fulfilled(_) => {}
        }
        self
    }

    /// Adds a progress observer. Ignored once settled.
    pub fn on_progress<F>(&self, observer: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut guard = self.shared.lock();
        if matches!(guard.outcome, Outcome::Pending) {
            guard.progress.push(Arc::new(observer));
        }
        self
    }

    /// Adds a fulfillment and a rejection observer in one call.
    pub fn subscribe<F, E>(&self, on_ok: F, on_err: E) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
        E: FnOnce(ClientError) + Send + 'static,
    {
        self.on_fulfilled(on_ok).on_rejected(on_err)
    }

    /// Adds one observer that receives whichever outcome happens.
    pub fn on_settled<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(ClientResult<T>) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(observer)));
        let on_err = Arc::clone(&slot);
        self.subscribe(
            move |value| {
                if let Some(observer) = slot.lock().take() {
                    observer(Ok(value));
                }
            },
            move |error| {
                if let Some(observer) = on_err.lock().take() {
                    observer(Err(error));
                }
            },
        )
    }

    /// Settles `resolver` the same way this result settles, forwarding
    /// progress until then.
    pub fn forward(&self, resolver: Resolver<T>) {
        let progress = resolver.clone();
        self.on_progress(move |message| progress.notify(message));
        self.on_settled(move |result| resolver.settle(result));
    }

    /// Chains an asynchronous step.
    ///
    /// The returned result adopts the result of the step; a rejection skips
    /// the step. Progress of both this result and the step is forwarded.
    pub fn and_then<U, F>(&self, step: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Deferred<U> + Send + 'static,
    {
        let (next, resolver) = Deferred::channel(&self.scheduler);
        let progress = resolver.clone();
        self.on_progress(move |message| progress.notify(message));
        self.on_settled(move |result| match result {
            Ok(value) => step(value).forward(resolver),
            Err(error) => resolver.reject(error),
        });
        next
    }

    /// Maps the fulfilled value.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Maps the fulfilled value with a fallible function.
    pub fn try_map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> ClientResult<U> + Send + 'static,
    {
        let (next, resolver) = Deferred::channel(&self.scheduler);
        let progress = resolver.clone();
        self.on_progress(move |message| progress.notify(message));
        self.on_settled(move |result| resolver.settle(result.and_then(f)));
        next
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    /// Fulfills the result. No-op once settled.
    pub fn resolve(&self, value: T) {
        let observers = {
            let mut guard = self.shared.lock();
            let shared = &mut *guard;
            if !matches!(shared.outcome, Outcome::Pending) {
                return;
            }
            shared.outcome = Outcome::Fulfilled(value.clone());
            shared.rejected.clear();
            shared.progress.clear();
            std::mem::take(&mut shared.fulfilled)
        };
        for observer in observers {
            let value = value.clone();
            self.scheduler.schedule(move || observer(value));
        }
    }

    /// Rejects the result. No-op once settled.
    pub fn reject(&self, error: ClientError) {
        let observers = {
            let mut guard = self.shared.lock();
            let shared = &mut *guard;
            if !matches!(shared.outcome, Outcome::Pending) {
                return;
            }
            shared.outcome = Outcome::Rejected(error.clone());
            shared.fulfilled.clear();
            shared.progress.clear();
            std::mem::take(&mut shared.rejected)
        };
        for observer in observers {
            let error = error.clone();
            self.scheduler.schedule(move || observer(error));
        }
    }

    /// Settles from a `Result`.
    pub fn settle(&self, result: ClientResult<T>) {
        match result {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }

    /// Synchronously delivers a progress message. No-op once settled.
    pub fn notify(&self, message: &str) {
        let observers = {
            let guard = self.shared.lock();
            if !matches!(guard.outcome, Outcome::Pending) {
                return;
            }
            guard.progress.clone()
        };
        for observer in observers {
            observer(message);
        }
    }

    /// Returns true while not settled.
    pub fn is_pending(&self) -> bool {
        matches!(self.shared.lock().outcome, Outcome::Pending)
    }

    /// Returns the consumer side of this result.
    pub fn deferred(&self) -> Deferred<T> {
        Deferred {
            shared: Arc::clone(&self.shared),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.state())
            .finish()
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("pending", &self.is_pending())
            .finish()
    }
}
