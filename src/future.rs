use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    future::Future,
    mem,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use tracing::{trace, warn};

use crate::{
    error::{FutureFailure, TransformError, UsageError},
    scheduler::SchedulerId,
    slot::Slot,
    wakerset::WakerSet,
};

type Transform<V> = Box<dyn FnOnce(V) -> Result<V, String>>;
type Listener<V> = Box<dyn FnOnce(&V) -> Result<(), String>>;
type Hook<V> = Box<dyn FnOnce(Result<&V, &FutureFailure>)>;

/// The return type of a fulfillment listener. Listeners may return `()`, or
/// a `Result` whose error is logged and otherwise ignored.
pub trait ListenerOutcome {
    fn into_outcome(self) -> Result<(), String>;
}

impl ListenerOutcome for () {
    #[inline]
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: Display> ListenerOutcome for Result<(), E> {
    #[inline]
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|err| err.to_string())
    }
}

enum Watcher<V> {
    /// Registered with `when_fulfilled`; only ever sees a final value.
    Listener(Listener<V>),

    /// Crate-internal watcher (used by reduce) that also needs to hear about
    /// failures.
    Hook(Hook<V>),
}

impl<V> Watcher<V> {
    fn notify(self, outcome: Result<&V, &FutureFailure>) {
        match (self, outcome) {
            (Watcher::Listener(listener), Ok(value)) => {
                if let Err(message) = listener(value) {
                    warn!(%message, "fulfillment listener failed");
                }
            }
            (Watcher::Listener(..), Err(..)) => {}
            (Watcher::Hook(hook), outcome) => hook(outcome),
        }
    }
}

enum Status<V> {
    Pending,
    Fulfilled { raw: V, value: V },
    Failed(FutureFailure),
}

struct FutureState<V> {
    parent: SchedulerId,
    status: Status<V>,
    transforms: Vec<Transform<V>>,
    slot: Option<Slot<V>>,
    watchers: Vec<Watcher<V>>,
    wakers: WakerSet,
}

impl<V: Debug> Debug for FutureState<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("BatchFuture");
        s.field("parent", &self.parent);

        match &self.status {
            Status::Pending => s.field("status", &"pending"),
            Status::Fulfilled { raw, value } => s.field("raw", raw).field("value", value),
            Status::Failed(failure) => s.field("failure", failure),
        };

        s.field("transforms", &self.transforms.len())
            .field("bound", &self.slot.is_some())
            .field("watchers", &self.watchers.len())
            .field("wakers", &self.wakers)
            .finish()
    }
}

/// A placeholder for the result of one scheduled operation. A `BatchFuture`
/// is created by a [`Scheduler`][crate::Scheduler], and is fulfilled exactly
/// once, when that scheduler's batch is committed.
///
/// Before fulfillment, a future can be given:
///
/// - A chain of transforms, which turn the raw result into the final value.
/// - A bound [`Slot`], which receives the final value.
/// - Any number of listeners, which are called with the final value.
///
/// On fulfillment, these happen in exactly that order: the transform chain
/// runs, the value is frozen, the slot is written, and then the listeners are
/// called.
///
/// `BatchFuture` is a cheap handle; clones share the same underlying state,
/// and the state lives as long as any handle (including ones captured by
/// listeners) does.
///
/// It also implements [`std::future::Future`], resolving once the future
/// settles. Note that nothing happens by polling it: it only ever makes
/// progress when the batch is committed.
pub struct BatchFuture<V> {
    state: Rc<RefCell<FutureState<V>>>,
}

impl<V> Clone for BatchFuture<V> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<V: Debug> Debug for BatchFuture<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&*self.state.borrow(), f)
    }
}

impl<V> BatchFuture<V> {
    pub(crate) fn new(parent: SchedulerId) -> Self {
        Self {
            state: Rc::new(RefCell::new(FutureState {
                parent,
                status: Status::Pending,
                transforms: Vec::new(),
                slot: None,
                watchers: Vec::new(),
                wakers: WakerSet::default(),
            })),
        }
    }

    /// The scheduler that created this future. This is only an identity; it
    /// can't be used to reach the scheduler itself.
    #[inline]
    pub fn parent(&self) -> SchedulerId {
        self.state.borrow().parent
    }

    /// Check if two handles refer to the same future.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    #[inline]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.state.borrow().status, Status::Fulfilled { .. })
    }

    /// True if this future is fulfilled, or will never be.
    #[inline]
    pub fn is_settled(&self) -> bool {
        !matches!(self.state.borrow().status, Status::Pending)
    }

    /// If this future will never be fulfilled, get the reason why. A future
    /// whose transform chain failed is *not* fulfilled; this is the only way
    /// to tell it apart from one that simply hasn't been committed yet.
    pub fn failure(&self) -> Option<FutureFailure> {
        match &self.state.borrow().status {
            Status::Failed(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Append a transform to this future's chain. Each transform receives the
    /// output of the previous one (the first receives the raw result). If any
    /// transform returns an error, the future is never fulfilled; see
    /// [`failure`][Self::failure].
    ///
    /// Transforms added after the future has settled are discarded.
    pub fn transform<F, E>(&self, transform: F) -> &Self
    where
        F: FnOnce(V) -> Result<V, E> + 'static,
        E: Display,
    {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match state.status {
            Status::Pending => state.transforms.push(Box::new(move |value| {
                transform(value).map_err(|err| err.to_string())
            })),
            _ => trace!("discarding transform on a settled future"),
        }

        self
    }

    /// Append an infallible transform to this future's chain.
    pub fn map<F>(&self, transform: F) -> &Self
    where
        F: FnOnce(V) -> V + 'static,
    {
        #[derive(Debug)]
        enum Never {}

        impl Display for Never {
            fn fmt(&self, _f: &mut Formatter<'_>) -> fmt::Result {
                match *self {}
            }
        }

        self.transform(move |value| -> Result<V, Never> { Ok(transform(value)) })
    }

    /// Bind an external slot to this future. When the future is fulfilled,
    /// its final value is written to the slot. Binding again before
    /// fulfillment replaces the previous slot.
    pub fn bind(&self, slot: &Slot<V>) -> Result<&Self, UsageError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match state.status {
            Status::Pending => {
                state.slot = Some(slot.clone());
                Ok(self)
            }
            _ => Err(UsageError::BindAfterSettle),
        }
    }

    /// Add a listener to be called with the final value when this future is
    /// fulfilled. If it's already fulfilled, the listener is called
    /// immediately. A listener that returns an error doesn't affect the
    /// future or any other listener.
    ///
    /// No ordering between different listeners is guaranteed.
    pub fn when_fulfilled<F, R>(&self, listener: F) -> &Self
    where
        F: FnOnce(&V) -> R + 'static,
        R: ListenerOutcome,
        V: Clone,
    {
        self.watch(Watcher::Listener(Box::new(move |value| {
            listener(value).into_outcome()
        })));
        self
    }

    /// Same as [`when_fulfilled`][Self::when_fulfilled].
    #[inline]
    pub fn on_fulfilled<F, R>(&self, listener: F) -> &Self
    where
        F: FnOnce(&V) -> R + 'static,
        R: ListenerOutcome,
        V: Clone,
    {
        self.when_fulfilled(listener)
    }

    /// Register a hook that is called when this future settles either way.
    pub(crate) fn when_settled(&self, hook: impl FnOnce(Result<&V, &FutureFailure>) + 'static)
    where
        V: Clone,
    {
        self.watch(Watcher::Hook(Box::new(hook)))
    }

    fn watch(&self, watcher: Watcher<V>)
    where
        V: Clone,
    {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let settled = match &state.status {
            Status::Pending => None,
            Status::Fulfilled { value, .. } => Some(Ok(value.clone())),
            Status::Failed(failure) => Some(Err(failure.clone())),
        };

        match settled {
            None => {
                state.watchers.push(watcher);
                trace!(watchers = state.watchers.len(), "registered fulfillment watcher");
            }
            Some(outcome) => {
                trace!("watcher registered on a settled future; notifying now");

                // The watcher may want to look at this future, so release it
                // first.
                drop(guard);
                watcher.notify(outcome.as_ref());
            }
        }
    }

    /// Mark this future as never to be fulfilled. Returns false if it was
    /// already settled.
    pub(crate) fn fail(&self, failure: FutureFailure) -> bool {
        let (watchers, wakers) = {
            let mut state = self.state.borrow_mut();
            if !matches!(state.status, Status::Pending) {
                return false;
            }

            state.status = Status::Failed(failure.clone());
            state.transforms.clear();
            state.slot = None;
            (mem::take(&mut state.watchers), mem::take(&mut state.wakers))
        };

        watchers
            .into_iter()
            .for_each(|watcher| watcher.notify(Err(&failure)));
        wakers.wake_all();
        true
    }
}

impl<V: Clone> BatchFuture<V> {
    /// Get the final value of this future, after all transforms.
    pub fn value(&self) -> Result<V, UsageError> {
        match &self.state.borrow().status {
            Status::Fulfilled { value, .. } => Ok(value.clone()),
            _ => Err(UsageError::NotFulfilled),
        }
    }

    /// Get the result of this future exactly as it was delivered, before any
    /// transforms.
    pub fn raw_value(&self) -> Result<V, UsageError> {
        match &self.state.borrow().status {
            Status::Fulfilled { raw, .. } => Ok(raw.clone()),
            _ => Err(UsageError::NotFulfilled),
        }
    }

    /// Deliver the result for this future. Only the owning scheduler (or the
    /// reduce group that created it) may call this.
    ///
    /// A failure in the transform chain is not an error here: the future is
    /// marked failed and `Ok` is returned, so that one bad transform can't
    /// disrupt the rest of the batch.
    pub(crate) fn fulfill(&self, raw: V) -> Result<(), UsageError> {
        let transforms = {
            let mut state = self.state.borrow_mut();
            if !matches!(state.status, Status::Pending) {
                return Err(UsageError::AlreadyFulfilled);
            }
            mem::take(&mut state.transforms)
        };

        let mut value = raw.clone();
        for (stage, transform) in transforms.into_iter().enumerate() {
            value = match transform(value) {
                Ok(value) => value,
                Err(message) => {
                    let error = TransformError { stage, message };
                    warn!(%error, "transform chain failed; future will not be fulfilled");
                    self.fail(FutureFailure::Transform(error));
                    return Ok(());
                }
            };
        }

        let (slot, watchers, wakers) = {
            let mut state = self.state.borrow_mut();
            state.status = Status::Fulfilled {
                raw,
                value: value.clone(),
            };
            // Anything added to the chain while it was running is inert.
            state.transforms.clear();
            (
                state.slot.take(),
                mem::take(&mut state.watchers),
                mem::take(&mut state.wakers),
            )
        };

        if let Some(slot) = slot {
            slot.set(value.clone());
        }

        watchers
            .into_iter()
            .for_each(|watcher| watcher.notify(Ok(&value)));
        wakers.wake_all();
        Ok(())
    }
}

impl<V: Clone> Future for BatchFuture<V> {
    type Output = Result<V, FutureFailure>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        match &state.status {
            Status::Fulfilled { value, .. } => Poll::Ready(Ok(value.clone())),
            Status::Failed(failure) => Poll::Ready(Err(failure.clone())),
            Status::Pending => {
                state.wakers.register(ctx.waker());
                Poll::Pending
            }
        }
    }
}
