use std::{
    cell::RefCell,
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

/// An external location that a [`BatchFuture`][crate::BatchFuture] can be
/// bound to. When the future is fulfilled, its final value is written into
/// the slot exactly once.
///
/// Cloning a `Slot` creates another handle to the same location.
pub struct Slot<V> {
    cell: Rc<RefCell<Option<V>>>,
}

impl<V> Slot<V> {
    pub fn new() -> Self {
        Self {
            cell: Rc::new(RefCell::new(None)),
        }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.cell.borrow().is_some()
    }

    /// Take the value out of the slot, leaving it empty.
    pub fn take(&self) -> Option<V> {
        self.cell.borrow_mut().take()
    }

    pub(crate) fn set(&self, value: V) {
        *self.cell.borrow_mut() = Some(value);
    }
}

impl<V: Clone> Slot<V> {
    pub fn get(&self) -> Option<V> {
        self.cell.borrow().clone()
    }
}

impl<V> Clone for Slot<V> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Debug> Debug for Slot<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&self.cell.borrow()).finish()
    }
}
