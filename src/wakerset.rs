use std::task::Waker;

/// Data structure for managing the wakers of every task awaiting a single
/// [`BatchFuture`][crate::BatchFuture]. Unlike a shared batch job, a batch
/// future is never driven by polling; it's fulfilled from the outside during
/// a commit. There's therefore no notion of a "driving" waker here: polling
/// only registers interest, and every registered waker is woken when the
/// future settles.
///
/// Because many clones of the same future can be polled from the same task,
/// wakers are deduplicated with `Waker::will_wake`.
#[derive(Debug, Default)]
pub(crate) struct WakerSet {
    wakers: Vec<Waker>,
}

impl WakerSet {
    /// Register a waker from a poll. If an equivalent waker is already
    /// present this is a no-op.
    pub(crate) fn register(&mut self, waker: &Waker) {
        if !self.wakers.iter().any(|existing| existing.will_wake(waker)) {
            self.wakers.push(waker.clone());
        }
    }

    #[inline]
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }

    pub(crate) fn wake_all(self) {
        self.wakers.into_iter().for_each(Waker::wake);
    }
}
