//! The Data Extractor (§4.4): resolves dotted field paths against a record,
//! memoising the path split.
//!
//! Engine-scoped caches use `RefCell`, not the teacher's `RwLock`, because
//! the engine is a single-cooperative-owner design (§5) — see DESIGN.md's
//! Open Question note on why that's a deliberate divergence, not an
//! oversight.

use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;

/// Coarse FIFO cap on the path cache so long-running streaming workloads
/// over many distinct paths can't grow it unboundedly (§9: cache eviction is
/// under-specified upstream; FIFO-size-cap is the decision recorded in
/// DESIGN.md).
const DEFAULT_PATH_CACHE_CAP: usize = 4096;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

struct PathCache {
    segments: IndexMap<String, Vec<String>>,
    cap: usize,
    metrics: CacheMetrics,
}

impl PathCache {
    fn new(cap: usize) -> Self {
        PathCache {
            segments: IndexMap::new(),
            cap,
            metrics: CacheMetrics::default(),
        }
    }

    fn split(&mut self, path: &str) -> Vec<String> {
        if let Some(segments) = self.segments.get(path) {
            self.metrics.hits += 1;
            return segments.clone();
        }
        self.metrics.misses += 1;
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if self.segments.len() >= self.cap {
            // FIFO eviction: IndexMap preserves insertion order, so the
            // oldest entry is always at index 0.
            self.segments.shift_remove_index(0);
        }
        self.segments.insert(path.to_string(), segments.clone());
        segments
    }

    fn clear(&mut self) {
        self.segments.clear();
        self.metrics = CacheMetrics::default();
    }
}

/// Resolves dotted paths on a `Value` tree, caching the path-to-segments
/// split. Owned by the engine, not shared, so plain `RefCell` interior
/// mutability suffices.
pub struct DataExtractor {
    cache: RefCell<PathCache>,
}

impl DataExtractor {
    pub fn new() -> Self {
        Self::with_cache_cap(DEFAULT_PATH_CACHE_CAP)
    }

    pub fn with_cache_cap(cap: usize) -> Self {
        DataExtractor {
            cache: RefCell::new(PathCache::new(cap)),
        }
    }

    /// Split `path` once (memoised), then descend the record segment by
    /// segment. Any missing segment yields `Value::Undefined`.
    pub fn extract(&self, record: &Value, path: &str) -> Value {
        let segments = self.cache.borrow_mut().split(path);
        Self::descend(record, &segments)
    }

    /// Descend `record` using already-split segments, bypassing the path
    /// cache entirely. The Rule Compiler pre-splits `field` once at compile
    /// time (§4.5 step 3) and hands the segments down via `CompiledRule`, so
    /// the per-record hot path never re-splits or re-looks-up the same
    /// dotted string on every `validate` call.
    pub fn extract_segments(&self, record: &Value, segments: &[String]) -> Value {
        Self::descend(record, segments)
    }

    fn descend(record: &Value, segments: &[String]) -> Value {
        let mut current = record.clone();
        for segment in segments {
            if current.is_undefined() {
                return Value::Undefined;
            }
            current = current.get_segment(segment);
        }
        current
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.cache.borrow().metrics
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.borrow().segments.len()
    }
}

impl Default for DataExtractor {
    fn default() -> Self {
        Self::new()
    }
}
