//! Result cache: memoizes cacheable tasks keyed by `(implementation id,
//! dependency digest)`, single-flight across concurrent callers.
//!
//! Grounded on the teacher's `TaskExecutor::get_rig_provider` /
//! `mcp_client_cache` pattern: a `DashMap` for the atomic get-or-insert of
//! the slot, with a `tokio::sync::OnceCell` inside each slot so a second
//! concurrent caller awaits the first's in-flight computation instead of
//! re-entering the task body (§4.6, testable property 3, scenario S5).

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::{EngineError, Result};
use crate::limits::RunLimits;
use crate::task::CacheDigest;

/// Computes the digest for a value that implements [`CacheDigest`]: the
/// fast path, used when a task's output type advertises its own digest.
pub fn digest_with<T: CacheDigest>(value: &T) -> Vec<u8> {
    value.digest()
}

/// Computes the digest for a value via its canonical JSON encoding, capped
/// by `RunLimits::max_output_bytes` (the open-question decision recorded in
/// `DESIGN.md`). Returns `None` if the encoding exceeds the cap or the value
/// does not serialize. Callers fall back to [`nonce_digest`] in that case,
/// which makes the value effectively non-cacheable.
pub fn digest_json<T: serde::Serialize>(value: &T, limits: &RunLimits) -> Option<Vec<u8>> {
    let bytes = serde_json::to_vec(value).ok()?;
    if bytes.len() > limits.max_output_bytes {
        return None;
    }
    Some(bytes)
}

/// A stable-within-process, never-equal-across-processes digest for output
/// types that implement neither [`CacheDigest`] nor `Serialize`. Every
/// process run gets a fresh nonce per type, so a persisted cache entry keyed
/// on it never hits across runs. The value only benefits from the in-flight
/// single-flight within one run, never from cross-run memoization.
pub fn nonce_digest<T: 'static>() -> Vec<u8> {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::OnceLock;

    static NONCES: OnceLock<DashMap<&'static str, u64>> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let table = NONCES.get_or_init(DashMap::new);
    let nonce = *table
        .entry(std::any::type_name::<T>())
        .or_insert_with(|| COUNTER.fetch_add(1, Ordering::Relaxed));
    nonce.to_le_bytes().to_vec()
}

/// Concatenates per-dependency digests, in declared dependency order, into
/// one cache key per §4.6. Each part is length-prefixed so that, e.g.,
/// `digest("ab") ++ digest("c")` can never collide with
/// `digest("a") ++ digest("bc")`, a risk plain concatenation would carry.
///
/// A task's own `run` closure is the only place that knows every
/// dependency's concrete type (the engine sees them only as
/// `Arc<dyn Any>` via [`crate::value_map::ValueMap`]), so this crate does
/// not offer a generic "wrap any `Task<T>`" helper: the closure calls
/// `digest_with`/`digest_json` on each dependency it reads, combines them
/// here, and passes the result to [`ResultCache::get_or_compute`] itself.
/// See `DESIGN.md` for the reasoning.
pub fn concat_digests(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(&(part.len() as u64).to_le_bytes());
        out.extend_from_slice(part);
    }
    out
}

type Slot<T> = Arc<OnceCell<std::result::Result<T, EngineError>>>;

/// A single-flight cache over `(impl id, dependency digest)`, scoped to
/// whatever lifetime the caller gives it (typically process-wide; see §4.6).
pub struct ResultCache<T> {
    entries: DashMap<(String, Vec<u8>), Slot<T>>,
}

impl<T> Default for ResultCache<T> {
    fn default() -> Self {
        ResultCache {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ResultCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `compute` unless a cached value already exists for `(impl_id,
    /// dependency_digest)`. Concurrent callers racing on the same key share
    /// one in-flight computation (single-flight); if it fails, every waiter
    /// receives a clone of the same [`EngineError::CachePropagatedError`].
    pub async fn get_or_compute<F, Fut>(
        &self,
        impl_id: &str,
        dependency_digest: Vec<u8>,
        compute: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = (impl_id.to_string(), dependency_digest);
        let slot = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = slot
            .get_or_init(|| async { compute().await })
            .await;

        result.clone().map_err(|e| EngineError::CachePropagatedError {
            task: impl_id.to_string(),
            message: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A size-bounded variant of [`ResultCache`] for long-running processes
/// where an unbounded cache would grow without limit. Eviction is the
/// teacher's own `JsonFormatCache` policy (`tui/state.rs`): once over
/// capacity, drop the oldest 10% of entries (minimum one) by insertion
/// order, rather than a true LRU ordered by last access. Single-flight
/// semantics are unaffected; eviction only removes already-settled slots.
pub struct LruResultCache<T> {
    inner: ResultCache<T>,
    order: parking_lot::Mutex<std::collections::VecDeque<(String, Vec<u8>)>>,
    max_entries: usize,
}

impl<T: Clone + Send + Sync + 'static> LruResultCache<T> {
    pub fn new(max_entries: usize) -> Self {
        LruResultCache {
            inner: ResultCache::new(),
            order: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn get_or_compute<F, Fut>(
        &self,
        impl_id: &str,
        dependency_digest: Vec<u8>,
        compute: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = (impl_id.to_string(), dependency_digest.clone());
        let was_present = self.inner.entries.contains_key(&key);
        let result = self
            .inner
            .get_or_compute(impl_id, dependency_digest, compute)
            .await;

        if result.is_ok() && !was_present {
            self.evict_if_needed();
            self.order.lock().push_back(key);
        }
        result
    }

    fn evict_if_needed(&self) {
        if self.inner.len() < self.max_entries {
            return;
        }
        let mut order = self.order.lock();
        let to_remove = (self.max_entries / 10).max(1);
        for _ in 0..to_remove {
            let Some(key) = order.pop_front() else { break };
            self.inner.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
