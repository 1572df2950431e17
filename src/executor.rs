use std::error::Error;

use crate::operation::Operation;

/// The component that actually runs a batch against a store. A
/// [`Scheduler`][crate::Scheduler] forwards each scheduled operation here,
/// and calls `commit` exactly once.
///
/// Implementations may pipeline the batch, run it as a transaction, or
/// anything else; the scheduler only depends on this contract:
///
/// - `schedule` queues an operation and must not perform any I/O.
/// - `commit` runs every queued operation and returns exactly one result per
///   `schedule` call, in the same order, or fails. It must never return a
///   partial result list.
pub trait BatchExecutor {
    type Value: Clone + 'static;
    type Error: Error + 'static;

    fn schedule(&mut self, operation: Operation);

    fn commit(&mut self) -> Result<Vec<Self::Value>, Self::Error>;
}

/// Marker for executors whose commit is all-or-nothing. Code that depends on
/// atomicity should require this (usually through
/// [`Atomic`][crate::Atomic]) rather than inspect how an executor works.
pub trait AtomicExecutor: BatchExecutor {}

impl<E: BatchExecutor + ?Sized> BatchExecutor for &mut E {
    type Value = E::Value;
    type Error = E::Error;

    #[inline]
    fn schedule(&mut self, operation: Operation) {
        (**self).schedule(operation)
    }

    #[inline]
    fn commit(&mut self) -> Result<Vec<Self::Value>, Self::Error> {
        (**self).commit()
    }
}

impl<E: AtomicExecutor + ?Sized> AtomicExecutor for &mut E {}

impl<E: BatchExecutor + ?Sized> BatchExecutor for Box<E> {
    type Value = E::Value;
    type Error = E::Error;

    #[inline]
    fn schedule(&mut self, operation: Operation) {
        (**self).schedule(operation)
    }

    #[inline]
    fn commit(&mut self) -> Result<Vec<Self::Value>, Self::Error> {
        (**self).commit()
    }
}

impl<E: AtomicExecutor + ?Sized> AtomicExecutor for Box<E> {}
