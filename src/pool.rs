//! The Object Pool (§4.3): a bounded per-kind store of reusable scratch
//! objects with optional reset hooks, plus aggregate hit/miss metrics.
//!
//! Grounded on the teacher's `PureFunctionRegistry` and `PerformanceMonitor`
//! (`pure_function_registry.rs`, `performance_monitoring.rs`): both guard a
//! map of named buckets and track a small metrics struct alongside it. This
//! generalises that same shape from "registered functions" to "recycled,
//! type-erased scratch objects," and swaps their `RwLock` for a `RefCell`
//! per the single-cooperative-owner model (§5, DESIGN.md).

use crate::value::Value;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PoolMetrics {
    pub hits: u64,
    pub misses: u64,
    pub allocations: u64,
    pub returns: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub pool_sizes: IndexMap<String, usize>,
}

#[derive(Default)]
struct Bucket {
    objects: VecDeque<Box<dyn Any + Send>>,
}

struct PoolState {
    buckets: IndexMap<String, Bucket>,
    max_size: usize,
    hits: u64,
    misses: u64,
    allocations: u64,
    returns: u64,
}

/// Bounded per-kind recycler for scratch objects (`ValidationResult`s,
/// error lists, argument vectors) that would otherwise be reallocated on
/// every `validate` call.
pub struct Pool {
    state: RefCell<PoolState>,
}

impl Pool {
    pub fn new(max_size: usize) -> Self {
        Pool {
            state: RefCell::new(PoolState {
                buckets: IndexMap::new(),
                max_size,
                hits: 0,
                misses: 0,
                allocations: 0,
                returns: 0,
            }),
        }
    }

    /// Borrow a reusable object of `kind`, invoking `factory` on a miss.
    /// The returned guard returns the object to the pool when dropped,
    /// guaranteeing scoped acquisition on every exit path (§5).
    pub fn get<T: Any + Send + 'static>(
        &self,
        kind: &str,
        factory: impl FnOnce() -> T,
    ) -> PooledGuard<'_, T> {
        let mut state = self.state.borrow_mut();
        let bucket = state.buckets.entry(kind.to_string()).or_default();
        let popped = bucket.objects.pop_front();
        let (value, hit) = match popped.and_then(|boxed| boxed.downcast::<T>().ok()) {
            Some(boxed) => (*boxed, true),
            None => (factory(), false),
        };
        if hit {
            state.hits += 1;
        } else {
            state.misses += 1;
            state.allocations += 1;
        }
        drop(state);
        PooledGuard {
            pool: self,
            kind: kind.to_string(),
            value: Some(value),
            reset: None,
        }
    }

    fn return_obj<T: Any + Send + 'static>(
        &self,
        kind: String,
        mut obj: T,
        reset: Option<Box<dyn FnOnce(&mut T) + Send>>,
    ) {
        let nullish = (&obj as &dyn Any)
            .downcast_ref::<Value>()
            .map(|v| v.is_null() || v.is_undefined())
            .unwrap_or(false);
        if nullish {
            return;
        }
        let mut state = self.state.borrow_mut();
        let max_size = state.max_size;
        let bucket = state.buckets.entry(kind).or_default();
        if bucket.objects.len() >= max_size {
            return;
        }
        if let Some(reset) = reset {
            reset(&mut obj);
        }
        bucket.objects.push_back(Box::new(obj));
        state.returns += 1;
    }

    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.buckets.clear();
        state.hits = 0;
        state.misses = 0;
        state.allocations = 0;
        state.returns = 0;
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.state.borrow();
        let total_requests = state.hits + state.misses;
        let hit_rate = if total_requests > 0 {
            state.hits as f64 / total_requests as f64
        } else {
            0.0
        };
        let pool_sizes = state
            .buckets
            .iter()
            .map(|(kind, bucket)| (kind.clone(), bucket.objects.len()))
            .collect();
        PoolMetrics {
            hits: state.hits,
            misses: state.misses,
            allocations: state.allocations,
            returns: state.returns,
            total_requests,
            hit_rate,
            pool_sizes,
        }
    }
}

/// RAII handle returned by [`Pool::get`]. Dropping it returns the borrowed
/// object to its pool, applying any reset hook registered via
/// [`PooledGuard::on_return_reset`] first.
pub struct PooledGuard<'p, T: Any + Send + 'static> {
    pool: &'p Pool,
    kind: String,
    value: Option<T>,
    reset: Option<Box<dyn FnOnce(&mut T) + Send>>,
}

impl<'p, T: Any + Send + 'static> PooledGuard<'p, T> {
    /// Register a reset hook to run just before this object is re-enqueued.
    /// Stored per-call rather than per-kind (§9 design note) since reset
    /// logic can depend on the object's particular history.
    pub fn on_return_reset(&mut self, reset: impl FnOnce(&mut T) + Send + 'static) {
        self.reset = Some(Box::new(reset));
    }

    pub fn into_inner(mut self) -> T {
        self.value.take().expect("value present until drop")
    }
}

impl<'p, T: Any + Send + 'static> Deref for PooledGuard<'p, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("value present until drop")
    }
}

impl<'p, T: Any + Send + 'static> DerefMut for PooledGuard<'p, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("value present until drop")
    }
}

impl<'p, T: Any + Send + 'static> Drop for PooledGuard<'p, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.return_obj(self.kind.clone(), value, self.reset.take());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_updates_counters() {
        let pool = Pool::new(4);
        {
            let _guard = pool.get("widget", || 42i32);
        }
        let _guard = pool.get("widget", || 0i32);
        let metrics = pool.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.allocations, 1);
        assert_eq!(metrics.total_requests, 2);
    }

    #[test]
    fn returned_object_is_identical_on_next_get() {
        let pool = Pool::new(4);
        {
            let mut guard = pool.get("widget", || vec![1, 2, 3]);
            guard.push(4);
        }
        let guard = pool.get("widget", Vec::new);
        assert_eq!(*guard, vec![1, 2, 3, 4]);
    }

    #[test]
    fn reset_hook_runs_before_reuse() {
        let pool = Pool::new(4);
        {
            let mut guard = pool.get("widget", || 10i32);
            guard.on_return_reset(|v| *v = 0);
        }
        let guard = pool.get("widget", || -1);
        assert_eq!(*guard, 0);
    }

    #[test]
    fn pool_size_never_exceeds_max_size() {
        let pool = Pool::new(2);
        for i in 0..3 {
            let _ = pool.get("t", || i).into_inner();
        }
        // emulate three successive returns directly
        pool.return_obj("t".to_string(), 1, None);
        pool.return_obj("t".to_string(), 2, None);
        pool.return_obj("t".to_string(), 3, None);
        assert_eq!(pool.metrics().pool_sizes.get("t").copied(), Some(2));
    }

    #[test]
    fn total_requests_equals_hits_plus_misses() {
        let pool = Pool::new(4);
        for _ in 0..5 {
            let _ = pool.get("t", || 0i32);
        }
        let metrics = pool.metrics();
        assert_eq!(metrics.total_requests, metrics.hits + metrics.misses);
    }

    #[test]
    fn clear_empties_queues_and_zeroes_counters() {
        let pool = Pool::new(4);
        let _ = pool.get("t", || 0i32);
        pool.clear();
        let metrics = pool.metrics();
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.misses, 0);
        assert!(metrics.pool_sizes.is_empty());
    }
}
