//! Fan-in of several sibling futures into one.

use std::{cell::RefCell, mem, rc::Rc};

use tracing::trace;

use crate::{
    error::ReduceError,
    executor::BatchExecutor,
    future::BatchFuture,
    scheduler::{Scheduler, SchedulerId},
};

/// Shared state of a reduce group. Each constituent fills its own slot,
/// which is fixed by its position in the `reduce` call; arrival order
/// doesn't matter.
#[derive(Debug)]
struct ReduceGroup<V> {
    values: Vec<Option<V>>,
    remaining: usize,
}

impl<V> ReduceGroup<V> {
    fn new(size: usize) -> Self {
        Self {
            values: (0..size).map(|_| None).collect(),
            remaining: size,
        }
    }

    /// Record the value for the constituent at `index`. Once every
    /// constituent has reported, returns all of the values in group order.
    fn record(&mut self, index: usize, value: V) -> Option<Vec<V>> {
        let slot = self.values.get_mut(index)?;
        if slot.is_none() {
            self.remaining -= 1;
        }
        *slot = Some(value);

        match self.remaining {
            0 => Some(mem::take(&mut self.values).into_iter().flatten().collect()),
            _ => None,
        }
    }
}

fn validate<V>(parent: SchedulerId, futures: &[BatchFuture<V>]) -> Result<(), ReduceError> {
    if futures.len() < 2 {
        return Err(ReduceError::TooFew {
            count: futures.len(),
        });
    }

    futures.iter().enumerate().try_for_each(|(index, future)| {
        if future.parent() != parent {
            return Err(ReduceError::ForeignFuture { index });
        }

        match futures[..index]
            .iter()
            .position(|other| other.ptr_eq(future))
        {
            Some(first) => Err(ReduceError::Duplicate {
                first,
                second: index,
            }),
            None => Ok(()),
        }
    })
}

impl<E> Scheduler<E>
where
    E: BatchExecutor,
    E::Value: From<Vec<E::Value>>,
{
    /// Combine several futures from this scheduler into one. The derived
    /// future is fulfilled once every constituent is, with the sequence of
    /// their final values, in the order they were passed here.
    ///
    /// ```
    /// use batchfuture::{MemoryStore, Operation, Scheduler, Value};
    ///
    /// let store = MemoryStore::new();
    /// store.insert("a", "1");
    /// store.insert("b", "2");
    ///
    /// let mut scheduler = Scheduler::new(store.pipeline());
    /// let a = scheduler.schedule(Operation::new("GET").arg("a")).unwrap();
    /// let b = scheduler.schedule(Operation::new("GET").arg("b")).unwrap();
    ///
    /// let both = scheduler.reduce(&[b, a]).unwrap();
    /// scheduler.commit().unwrap();
    ///
    /// assert_eq!(both.value().unwrap(), Value::from(vec![Value::from("2"), Value::from("1")]));
    /// ```
    ///
    /// The derived future isn't part of the batch: it doesn't count toward
    /// the commit's results. It can be transformed, bound, listened to, and
    /// reduced again like any other future from this scheduler. If any
    /// constituent fails, the derived future fails the same way.
    ///
    /// Reducing fewer than two futures, the same future twice, or a future
    /// from another scheduler is an error.
    pub fn reduce(
        &self,
        futures: &[BatchFuture<E::Value>],
    ) -> Result<BatchFuture<E::Value>, ReduceError> {
        validate(self.id(), futures)?;

        trace!(scheduler = %self.id(), size = futures.len(), "reducing futures");

        let derived = BatchFuture::new(self.id());
        let group = Rc::new(RefCell::new(ReduceGroup::new(futures.len())));

        for (index, future) in futures.iter().enumerate() {
            let group = Rc::clone(&group);
            let derived = derived.clone();

            future.when_settled(move |outcome| match outcome {
                Ok(value) => {
                    let complete = group.borrow_mut().record(index, value.clone());
                    if let Some(values) = complete {
                        let combined = <E::Value as From<Vec<E::Value>>>::from(values);
                        if let Err(err) = derived.fulfill(combined) {
                            trace!(error = %err, "reduce group completed after it failed");
                        }
                    }
                }
                Err(failure) => {
                    derived.fail(failure.clone());
                }
            });
        }

        Ok(derived)
    }
}
