//! Error types for scheduling, committing, and fulfilling batches.

use thiserror::Error;

/// Invalid use of a [`Scheduler`][crate::Scheduler] or
/// [`BatchFuture`][crate::BatchFuture]. These are always caller defects and
/// are never worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    /// The batch has already been committed. Returned by a second call to
    /// `commit`, or by `schedule` after a commit.
    #[error("batch has already been committed")]
    AlreadyCommitted,

    /// `value` or `raw_value` was called on a future that isn't fulfilled.
    #[error("future has not been fulfilled")]
    NotFulfilled,

    /// A future was handed a second result.
    #[error("future has already been fulfilled")]
    AlreadyFulfilled,

    /// `bind` was called on a future that has already settled.
    #[error("cannot bind a slot to a future that has already settled")]
    BindAfterSettle,
}

/// A set of futures that can't be combined with
/// [`Scheduler::reduce`][crate::Scheduler::reduce].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReduceError {
    /// Fewer than two futures were supplied.
    #[error("reduce needs at least 2 futures, got {count}")]
    TooFew { count: usize },

    /// The same future appears twice in the group.
    #[error("future at position {second} duplicates the one at position {first}")]
    Duplicate { first: usize, second: usize },

    /// The future at `index` was created by a different scheduler.
    #[error("future at position {index} belongs to a different scheduler")]
    ForeignFuture { index: usize },
}

/// Failure of [`Scheduler::commit`][crate::Scheduler::commit].
#[derive(Debug, Error)]
pub enum CommitError<E> {
    /// Commit was already attempted on this scheduler, successfully or not.
    #[error("batch has already been committed")]
    AlreadyCommitted,

    /// The batch executor failed. The error is passed through untouched.
    #[error("batch executor failed: {0}")]
    Transport(#[source] E),

    /// The executor returned a different number of results than operations
    /// were scheduled. This means the executor and the scheduler disagree
    /// about the batch, and is never recoverable.
    #[error("protocol desync: {scheduled} operations scheduled but {received} results returned")]
    Desync { scheduled: usize, received: usize },
}

impl<E> CommitError<E> {
    pub fn is_transport(&self) -> bool {
        matches!(self, CommitError::Transport(..))
    }

    pub fn is_desync(&self) -> bool {
        matches!(self, CommitError::Desync { .. })
    }

    /// Get the executor's error, if this is a transport failure.
    pub fn transport(&self) -> Option<&E> {
        match self {
            CommitError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// A transform in a future's chain returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transform {stage} failed: {message}")]
pub struct TransformError {
    /// Position of the failing transform in the chain, starting at 0.
    pub stage: usize,
    pub message: String,
}

/// Why a [`BatchFuture`][crate::BatchFuture] will never be fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FutureFailure {
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The batch this future belongs to failed to commit.
    #[error("the batch was never delivered")]
    Abandoned,
}
