//! Concurrency-safe heterogeneous value map.
//!
//! Generalizes the teacher's `DataStore` (a lock-free `DashMap<Arc<str>,
//! TaskResult>` specialized to a single JSON-shaped payload) to a truly
//! heterogeneous store: any `Send + Sync + 'static` value can be stored
//! under a string key and recovered with a typed accessor. A type mismatch
//! between what was stored and what was requested is treated as a miss,
//! never a panic, per `DESIGN.md`'s open-question decision for C2.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

/// A heterogeneous, concurrency-safe map from string identifier to a value
/// of any `'static` type.
#[derive(Default)]
pub struct ValueMap {
    inner: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for ValueMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueMap")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl ValueMap {
    pub fn new() -> Self {
        ValueMap {
            inner: DashMap::new(),
        }
    }

    /// Stores `value` under `key`, overwriting any previous value
    /// (including one of a different type).
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.inner.insert(key.into(), Arc::new(value));
    }

    /// Stores an already-boxed value, used by callers (the runner) that
    /// only hold a type-erased result from an `Arc<dyn AnyTask>` and never
    /// recover the concrete `T` themselves.
    pub fn set_erased(&self, key: impl Into<String>, value: Arc<dyn Any + Send + Sync>) {
        self.inner.insert(key.into(), value);
    }

    /// Returns a clone of the value stored under `key` if it is present and
    /// has the concrete type `T`. A present value of a different type is
    /// reported as `None`, matching a miss.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.inner
            .get(key)
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
            .map(|arc| (*arc).clone())
    }

    /// Returns the `Arc`-shared value itself, avoiding a clone of `T`.
    pub fn get_arc<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.inner
            .get(key)
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    pub fn get_or_default<T: Clone + Send + Sync + Default + 'static>(&self, key: &str) -> T {
        self.get(key).unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
