//! Read-only accessor for a bound configuration record.

use std::ops::Deref;
use std::sync::Arc;

/// An immutable, shareable view of a record bound at startup.
///
/// Register with [`ServiceCollection::configure`](crate::ServiceCollection::configure)
/// and resolve `Options<T>` from a request scope. There is no way to mutate
/// the record through the accessor; clones share the same allocation.
#[derive(Debug)]
pub struct Options<T> {
    value: Arc<T>,
}

impl<T> Options<T> {
    pub fn new(value: T) -> Self {
        Self { value: Arc::new(value) }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self { value: Arc::clone(&self.value) }
    }
}

impl<T> Deref for Options<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}
