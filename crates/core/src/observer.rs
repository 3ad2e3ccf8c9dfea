//! Multi-subscriber update hooks shared by tasks, nodes and DAGs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A registered update callback
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Append-only list of observers. Subscriptions live as long as the owner.
pub struct Observers<T> {
    callbacks: Mutex<Vec<Callback<T>>>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a closure
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(Arc::new(callback));
    }

    /// Register an already shared callback
    pub fn add(&self, callback: Callback<T>) {
        lock_unpoisoned(&self.callbacks).push(callback);
    }

    /// Invoke every observer in registration order.
    ///
    /// The list is cloned first so observers may subscribe or emit
    /// re-entrantly without deadlocking.
    pub fn emit(&self, value: &T) {
        let callbacks = lock_unpoisoned(&self.callbacks).clone();
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.callbacks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.len())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
