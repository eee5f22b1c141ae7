//! The Cache Manager (§4.7) and the helper-argument cache (§3) it
//! aggregates alongside the data extractor's path cache.
//!
//! The memory-usage estimate follows the teacher's `estimate_memory_usage`
//! in `lazy_pipeline.rs`: a coarse, monotone byte count rather than a true
//! allocator query — good enough to bound growth under streaming workloads,
//! which is all §9 asks for.

use crate::extractor::{CacheMetrics, DataExtractor};
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::BTreeMap;

const DEFAULT_ARGUMENT_CACHE_CAP: usize = 4096;

/// Memoises `(op, canonicalised params) -> argument vector` so rules sharing
/// an operator and parameter set don't rebuild the same slice repeatedly.
/// The Rule Compiler consults this before falling back to building the
/// vector itself.
pub struct ArgumentCache {
    entries: RefCell<IndexMap<String, Vec<Value>>>,
    cap: usize,
    metrics: RefCell<CacheMetrics>,
}

impl ArgumentCache {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_ARGUMENT_CACHE_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        ArgumentCache {
            entries: RefCell::new(IndexMap::new()),
            cap,
            metrics: RefCell::new(CacheMetrics::default()),
        }
    }

    fn key(op: &str, params: &IndexMap<String, Value>) -> String {
        let canonical: BTreeMap<&str, String> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect();
        format!("{op}|{canonical:?}")
    }

    /// Returns the cached argument vector for `(op, params)`, or runs
    /// `build` on a miss. `build`'s failure (e.g. a missing required
    /// parameter) is never cached.
    pub fn get_or_insert<E>(
        &self,
        op: &str,
        params: &IndexMap<String, Value>,
        build: impl FnOnce() -> Result<Vec<Value>, E>,
    ) -> Result<Vec<Value>, E> {
        let key = Self::key(op, params);
        if let Some(cached) = self.entries.borrow().get(&key) {
            self.metrics.borrow_mut().hits += 1;
            return Ok(cached.clone());
        }
        self.metrics.borrow_mut().misses += 1;
        let built = build()?;
        let mut entries = self.entries.borrow_mut();
        if entries.len() >= self.cap {
            entries.shift_remove_index(0);
        }
        entries.insert(key, built.clone());
        Ok(built)
    }

    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.borrow()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
        *self.metrics.borrow_mut() = CacheMetrics::default();
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

impl Default for ArgumentCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct SubCacheMetrics {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

fn sub_metrics(size: usize, metrics: CacheMetrics) -> SubCacheMetrics {
    let total = metrics.hits + metrics.misses;
    SubCacheMetrics {
        size,
        hits: metrics.hits,
        misses: metrics.misses,
        hit_rate: if total > 0 {
            metrics.hits as f64 / total as f64
        } else {
            0.0
        },
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheManagerMetrics {
    pub path: SubCacheMetrics,
    pub argument: SubCacheMetrics,
    pub total_memory_estimate_bytes: u64,
}

/// Coordinating role, not an owner: the engine owns the `DataExtractor` and
/// `ArgumentCache`; this just reports on them together and clears them (and
/// the rule-compiler cache) as a unit.
pub struct CacheManager;

impl CacheManager {
    pub fn metrics(extractor: &DataExtractor, argument_cache: &ArgumentCache) -> CacheManagerMetrics {
        let path = sub_metrics(extractor_len(extractor), extractor.metrics());
        let argument = sub_metrics(argument_cache.len(), argument_cache.metrics());
        let total_memory_estimate_bytes = estimate_bytes(path.size) + estimate_bytes(argument.size);
        CacheManagerMetrics {
            path,
            argument,
            total_memory_estimate_bytes,
        }
    }

    pub fn clear_caches(
        extractor: &DataExtractor,
        argument_cache: &ArgumentCache,
        compiler: &crate::compiler::RuleCompiler,
    ) {
        extractor.clear();
        argument_cache.clear();
        compiler.clear();
    }
}

/// Rough average bytes per cache entry (key + small value payload), mirroring
/// the teacher's coarse per-item estimate in `PipelineMetrics`.
const BYTES_PER_ENTRY_ESTIMATE: u64 = 96;

fn estimate_bytes(entries: usize) -> u64 {
    entries as u64 * BYTES_PER_ENTRY_ESTIMATE
}

fn extractor_len(extractor: &DataExtractor) -> usize {
    extractor.cache_len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_cache_hits_on_repeated_lookup() {
        let cache = ArgumentCache::new();
        let mut params = IndexMap::new();
        params.insert("value".to_string(), Value::Number(1.0));
        let build = || Ok::<_, ()>(vec![Value::Number(1.0)]);
        cache.get_or_insert("eq", &params, build).unwrap();
        cache.get_or_insert("eq", &params, build).unwrap();
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[test]
    fn failed_build_is_never_cached() {
        let cache = ArgumentCache::new();
        let params = IndexMap::new();
        let fail = || Err::<Vec<Value>, &str>("missing param");
        assert!(cache.get_or_insert("between", &params, fail).is_err());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn memory_estimate_is_monotone_in_cache_size() {
        let extractor = DataExtractor::new();
        let argument_cache = ArgumentCache::new();
        let before = CacheManager::metrics(&extractor, &argument_cache).total_memory_estimate_bytes;
        extractor.extract(&Value::Null, "a.b.c");
        let after = CacheManager::metrics(&extractor, &argument_cache).total_memory_estimate_bytes;
        assert!(after >= before);
    }
}
