//! Atomically swappable snapshot cell.
//!
//! Readers take an `Arc<T>` without locking and keep a consistent view for
//! as long as they hold it. Writers build the replacement off to the side
//! and publish it with a single pointer store. Writers are serialized so a
//! read-modify-write `update` never loses a concurrent replace.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

pub struct SwapCell<T> {
    current: ArcSwap<T>,
    writer: Mutex<()>,
}

impl<T> SwapCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(value),
            writer: Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Publish `value`, returning the snapshot it replaced.
    pub fn replace(&self, value: T) -> Arc<T> {
        let _guard = self.lock_writer();
        self.current.swap(Arc::new(value))
    }

    /// Derive the next snapshot from the current one and publish it.
    pub fn update<F>(&self, f: F) -> Arc<T>
    where
        F: FnOnce(&T) -> T,
    {
        let _guard = self.lock_writer();
        let next = Arc::new(f(&self.current.load()));
        self.current.store(Arc::clone(&next));
        next
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded section only swaps a pointer; a poisoned lock carries no broken state.
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Default> Default for SwapCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SwapCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SwapCell").field(&self.load()).finish()
    }
}
