//! The counter service and the store that owns its shared value.
//!
//! A [`CounterService`] counts its own constructions, but the count does not
//! live in the instance: every service wired to the same [`CounterStore`]
//! bumps and reads the same atomic. Whatever lifetime the container applies
//! (singleton, scoped, transient, keyed), `value()` always reports the total
//! number of constructions so far.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Owner of the process-wide construction count.
///
/// Register one instance in the container and let every
/// [`CounterService`] factory resolve it.
#[derive(Debug, Default)]
pub struct CounterStore {
    constructed: AtomicU64,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of services constructed against this store so far.
    pub fn get(&self) -> u64 {
        self.constructed.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.constructed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A service whose every construction increments the shared store.
#[derive(Debug)]
pub struct CounterService {
    store: Arc<CounterStore>,
}

impl CounterService {
    pub fn new(store: Arc<CounterStore>) -> Self {
        let n = store.bump();
        tracing::debug!(constructed = n, "counter service constructed");
        Self { store }
    }

    /// The current shared count, not this instance's construction number.
    pub fn value(&self) -> u64 {
        self.store.get()
    }
}
