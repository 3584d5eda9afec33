//! Blackboard cells shared between flight tasks.

use std::sync::{Arc, PoisonError, RwLock};

/// A thread-safe container holding the latest value of one store field.
///
/// Reads and writes are atomic for the whole value, so a reader never sees a
/// half-written record. Nothing is guaranteed across different cells.
#[derive(Debug)]
pub struct DataCell<T> {
    storage: RwLock<T>,
}

impl<T: Clone> DataCell<T> {
    /// Create a new cell with an initial value.
    pub fn new(init: T) -> Self {
        Self {
            storage: RwLock::new(init),
        }
    }

    /// Fetch the latest value.
    pub fn read(&self) -> T {
        self.storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, value: T) {
        let mut guard = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        *guard = value;
    }

    fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// The one handle allowed to write a [`DataCell`].
///
/// Deliberately not `Clone`: whichever task owns the writer is the sole
/// producer of that field.
#[derive(Debug)]
pub struct Writer<T> {
    cell: Arc<DataCell<T>>,
}

impl<T: Clone> Writer<T> {
    pub(crate) fn new(cell: Arc<DataCell<T>>) -> Self {
        Self { cell }
    }

    /// Replace the whole value.
    pub fn publish(&self, value: T) {
        self.cell.update(value);
    }

    /// Update individual fields in place, leaving the rest untouched.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.cell.modify(f)
    }

    /// Read back the current value.
    pub fn read(&self) -> T {
        self.cell.read()
    }
}
