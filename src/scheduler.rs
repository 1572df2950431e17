use std::{
    fmt::{self, Debug, Display, Formatter},
    mem,
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, error, trace};

use crate::{
    error::{CommitError, FutureFailure, UsageError},
    executor::{AtomicExecutor, BatchExecutor},
    future::BatchFuture,
    operation::Operation,
};

/// An opaque identity for a [`Scheduler`]. Every future remembers the id of
/// the scheduler that created it; this is how sibling futures are recognized.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulerId(NonZeroU64);

impl SchedulerId {
    pub(crate) fn next() -> Self {
        // Ids are an ever-increasing integer; we assume that no process will
        // create 2^64 schedulers.
        static NEXT: AtomicU64 = AtomicU64::new(1);

        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        SchedulerId(NonZeroU64::new(id).unwrap_or(NonZeroU64::MAX))
    }
}

impl Display for SchedulerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum CommitState<V> {
    NotCommitted,
    Succeeded(Vec<V>),
    Failed,
}

/// A scheduler collects the operations for a single batch. Each call to
/// [`schedule`][Self::schedule] hands the operation to the underlying
/// [`BatchExecutor`] and returns a [`BatchFuture`] for its result. A single
/// call to [`commit`][Self::commit] then runs the batch and distributes the
/// results to the futures, in the order they were scheduled.
///
/// ```
/// use batchfuture::{MemoryStore, Operation, Scheduler};
///
/// let store = MemoryStore::new();
/// let mut scheduler = Scheduler::new(store.pipeline());
///
/// let set = scheduler.schedule(Operation::new("SET").args(["k", "v1"])).unwrap();
/// let get = scheduler.schedule(Operation::new("GET").arg("k")).unwrap();
///
/// scheduler.commit().unwrap();
///
/// assert_eq!(set.value().unwrap(), "OK");
/// assert_eq!(get.value().unwrap(), "v1");
/// ```
///
/// A scheduler can be committed at most once, whether or not that commit
/// succeeds.
pub struct Scheduler<E: BatchExecutor> {
    id: SchedulerId,
    executor: E,

    // The scheduler keeps its futures alive until the commit has completed,
    // after which they are owned only by their other holders.
    futures: Outstanding<E::Value>,
    scheduled: usize,
    state: CommitState<E::Value>,
}

impl<E: BatchExecutor> Scheduler<E> {
    pub fn new(executor: E) -> Self {
        let id = SchedulerId::next();
        trace!(scheduler = %id, "created scheduler");

        Self {
            id,
            executor,
            futures: Outstanding(Vec::new()),
            scheduled: 0,
            state: CommitState::NotCommitted,
        }
    }

    #[inline]
    pub fn id(&self) -> SchedulerId {
        self.id
    }

    /// The number of operations scheduled in this batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.scheduled
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scheduled == 0
    }

    #[inline]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    #[inline]
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Take back the executor. If the batch wasn't committed, every future
    /// it handed out is abandoned.
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Add an operation to the batch. The returned future will receive the
    /// result of this operation when the batch is committed. No I/O happens
    /// here.
    ///
    /// Scheduling after the batch was committed is an error.
    pub fn schedule(
        &mut self,
        operation: impl Into<Operation>,
    ) -> Result<BatchFuture<E::Value>, UsageError> {
        if self.has_committed() {
            return Err(UsageError::AlreadyCommitted);
        }

        let operation = operation.into();
        trace!(
            scheduler = %self.id,
            index = self.scheduled,
            %operation,
            "scheduling operation"
        );

        self.executor.schedule(operation);

        let future = BatchFuture::new(self.id);
        self.futures.0.push(future.clone());
        self.scheduled += 1;
        Ok(future)
    }

    /// Run the batch, and fulfill every scheduled future with its result.
    /// Returns the raw results, in scheduling order.
    ///
    /// This can only be called once. If the executor fails, its error is
    /// returned as [`CommitError::Transport`] and every future is abandoned;
    /// the scheduler can't be committed again. A future whose transform chain
    /// fails doesn't cause this to fail; check
    /// [`BatchFuture::is_fulfilled`] if that matters.
    pub fn commit(&mut self) -> Result<&[E::Value], CommitError<E::Error>> {
        if self.has_committed() {
            return Err(CommitError::AlreadyCommitted);
        }

        // Mark the batch as executed before handing it off, so that any
        // failure past this point is still a commit.
        self.state = CommitState::Failed;
        let futures = mem::take(&mut self.futures.0);

        debug!(scheduler = %self.id, operations = futures.len(), "committing batch");

        let results = match self.executor.commit() {
            Ok(results) => results,
            Err(err) => {
                debug!(scheduler = %self.id, error = %err, "batch executor failed");
                abandon(&futures);
                return Err(CommitError::Transport(err));
            }
        };

        if results.len() != futures.len() {
            error!(
                scheduler = %self.id,
                scheduled = futures.len(),
                received = results.len(),
                "batch executor returned the wrong number of results"
            );
            abandon(&futures);
            return Err(CommitError::Desync {
                scheduled: futures.len(),
                received: results.len(),
            });
        }

        for (index, (future, raw)) in futures.iter().zip(&results).enumerate() {
            if let Err(err) = future.fulfill(raw.clone()) {
                // Only this scheduler can fulfill its futures, so this would
                // be a logic error in this crate.
                error!(scheduler = %self.id, index, error = %err, "scheduled future was already settled");
            }
        }

        debug!(scheduler = %self.id, "batch committed");

        self.state = CommitState::Succeeded(results);
        Ok(self.results().unwrap_or_default())
    }

    /// True if `commit` has been called, regardless of its outcome.
    #[inline]
    pub fn has_committed(&self) -> bool {
        !matches!(self.state, CommitState::NotCommitted)
    }

    #[inline]
    pub fn committed_successfully(&self) -> bool {
        matches!(self.state, CommitState::Succeeded(..))
    }

    #[inline]
    pub fn commit_failed(&self) -> bool {
        matches!(self.state, CommitState::Failed)
    }

    /// The raw results of a successful commit.
    pub fn results(&self) -> Option<&[E::Value]> {
        match &self.state {
            CommitState::Succeeded(results) => Some(results.as_slice()),
            _ => None,
        }
    }
}

fn abandon<V>(futures: &[BatchFuture<V>]) {
    futures.iter().for_each(|future| {
        future.fail(FutureFailure::Abandoned);
    });
}

/// The futures of a batch that hasn't been committed yet. Commit empties
/// this; anything still here when it's dropped can never be fulfilled, so
/// it's abandoned (which wakes its tasks and releases its listeners).
struct Outstanding<V>(Vec<BatchFuture<V>>);

impl<V> Drop for Outstanding<V> {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            debug!(
                operations = self.0.len(),
                "uncommitted batch dropped; abandoning its futures"
            );
            abandon(&self.0);
        }
    }
}

impl<E> Debug for Scheduler<E>
where
    E: BatchExecutor + Debug,
    E::Value: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            CommitState::NotCommitted => "not committed",
            CommitState::Succeeded(..) => "succeeded",
            CommitState::Failed => "failed",
        };

        f.debug_struct("Scheduler")
            .field("id", &self.id)
            .field("executor", &self.executor)
            .field("scheduled", &self.scheduled)
            .field("state", &state)
            .field("results", &self.results())
            .finish()
    }
}

/// Marker for schedulers whose batch commits atomically. It's implemented
/// for every `Scheduler` over an [`AtomicExecutor`]; code that relies on
/// all-or-nothing batches should require it:
///
/// ```
/// use batchfuture::{Atomic, BatchExecutor, MemoryStore, Scheduler};
///
/// fn transfer<E: BatchExecutor>(scheduler: &mut Scheduler<E>)
/// where
///     Scheduler<E>: Atomic,
/// {
///     // ...
/// }
///
/// let store = MemoryStore::new();
/// transfer(&mut Scheduler::new(store.transaction()));
/// transfer(&mut Scheduler::new(store.queued()));
/// ```
///
/// ```compile_fail
/// # use batchfuture::{Atomic, BatchExecutor, MemoryStore, Scheduler};
/// # fn transfer<E: BatchExecutor>(scheduler: &mut Scheduler<E>) where Scheduler<E>: Atomic {}
/// let store = MemoryStore::new();
/// transfer(&mut Scheduler::new(store.pipeline()));
/// ```
pub trait Atomic {}

impl<E: AtomicExecutor> Atomic for Scheduler<E> {}
