//! Batchfuture lets you build up a batch of commands against a remote store,
//! get a placeholder for each command's result immediately, and work with
//! those placeholders (transforming them, binding them to variables,
//! combining them) before the batch is ever sent. When the batch is
//! committed, every placeholder is fulfilled with its result, in order.
//!
//! ## Overview
//!
//! The entry point is the [`Scheduler`]. A scheduler wraps a
//! [`BatchExecutor`], which is the component that actually talks to the
//! store. Batchfuture doesn't care how the executor works: it might pipeline
//! the whole batch in a single round trip, or run it as a transaction. It
//! only requires that committing returns one result per scheduled
//! operation, in the order they were scheduled.
//!
//! Each call to [`Scheduler::schedule`] returns a [`BatchFuture`]:
//!
//! ```
//! use batchfuture::{MemoryStore, Operation, Scheduler, Slot, Value};
//!
//! let store = MemoryStore::new();
//! store.insert("visits", "41");
//!
//! let mut scheduler = Scheduler::new(store.queued());
//!
//! let visits = scheduler.schedule(Operation::new("INCR").arg("visits")).unwrap();
//! let name = scheduler.schedule(Operation::new("GET").arg("name")).unwrap();
//!
//! // Nothing has been sent yet. The futures can be transformed...
//! name.map(|value| match value {
//!     Value::Nil => Value::from("anonymous"),
//!     value => value,
//! });
//!
//! // ...bound to a slot...
//! let name_slot = Slot::new();
//! name.bind(&name_slot).unwrap();
//!
//! // ...or given listeners.
//! visits.when_fulfilled(|count| println!("visit number {}", count));
//!
//! // Commit runs the batch and fulfills each future.
//! scheduler.commit().unwrap();
//!
//! assert_eq!(visits.value().unwrap(), Value::Int(42));
//! assert_eq!(name.value().unwrap(), "anonymous");
//! assert_eq!(name.raw_value().unwrap(), Value::Nil);
//! assert_eq!(name_slot.get().unwrap(), "anonymous");
//! ```
//!
//! Several futures from the same scheduler can be combined with
//! [`Scheduler::reduce`], which creates a new future for the ordered
//! sequence of their values.
//!
//! ## Design notes
//!
//! ### Single commit
//!
//! A scheduler is committed at most once. The second call to
//! [`Scheduler::commit`] always fails, even if the first one failed; there's
//! no way to retry a batch. If the executor fails, its error is returned
//! unchanged as [`CommitError::Transport`]. If it returns the wrong number of
//! results, that's a [`CommitError::Desync`]: the scheduler and executor
//! disagree about what the batch contained, and no result can be trusted.
//!
//! ### Fulfillment
//!
//! When a future is fulfilled, it stores its raw result, runs its transform
//! chain to get its final value, writes that value to its bound [`Slot`] (if
//! any), and finally calls its listeners. A listener returning an error is
//! logged and otherwise ignored.
//!
//! If any transform fails, the future is *never* fulfilled. This doesn't
//! affect the commit or any other future in the batch; a caller that cares
//! must check [`BatchFuture::is_fulfilled`] or [`BatchFuture::failure`].
//!
//! ### Ownership
//!
//! Futures are reference counted handles, and may be freely cloned into
//! listeners. A future only remembers the *identity* of its scheduler (a
//! [`SchedulerId`]), which is used to check that reduced futures belong
//! together. The scheduler holds onto its futures until the commit is done.
//!
//! Everything here is single threaded: futures and schedulers are not `Send`.
//!
//! ### Atomicity
//!
//! Some executors commit atomically. They advertise this by implementing
//! [`AtomicExecutor`], and a scheduler over one implements [`Atomic`], so
//! that code which depends on all-or-nothing batches can say so in its
//! signature.
//!
//! ### Awaiting
//!
//! [`BatchFuture`] also implements [`std::future::Future`], which resolves
//! once the future settles: with its value, or with a [`FutureFailure`] if it
//! will never be fulfilled. Polling doesn't drive anything; the batch must
//! still be committed.

mod error;
mod executor;
mod future;
mod memory;
mod operation;
mod reduce;
mod scheduler;
mod slot;
mod value;
mod wakerset;

pub use error::{CommitError, FutureFailure, ReduceError, TransformError, UsageError};
pub use executor::{AtomicExecutor, BatchExecutor};
pub use future::{BatchFuture, ListenerOutcome};
pub use memory::{
    CommitStrategy, MemoryExecutor, MemoryStore, Pipelined, Queued, StoreError, StoreRules,
    Transactional,
};
pub use operation::Operation;
pub use scheduler::{Atomic, Scheduler, SchedulerId};
pub use slot::Slot;
pub use value::Value;
