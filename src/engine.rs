//! The Engine Orchestrator (§4.6): binds the helper registry, rule compiler,
//! data extractor, caches, object pool, error handler, and callback manager
//! into the public `validate`/`validateAsync`/`validateStream` surface.
//!
//! Grounded on the teacher's `ValidationEngine`/`ValidationConfig` shape in
//! `functional/validation_engine.rs` (construct once from a rule set, expose
//! a handful of `validate*` entry points, report aggregate metrics) and
//! `functional/validation_integration.rs`'s per-field-then-aggregate pattern
//! for the diagnostic-accumulation loop.

use crate::cache::{ArgumentCache, CacheManager, CacheManagerMetrics};
use crate::callback::{CallbackManager, CallbackManagerMetrics, CallbackRef};
use crate::compiler::{CompiledRule, Diagnostic, Rule, RuleCompiler};
use crate::error::{EngineError, EngineResult};
use crate::error_handler::{ErrorHandler, ErrorHandlerMetrics};
use crate::extractor::{CacheMetrics, DataExtractor};
use crate::helpers::{HelperRegistry, Resolver};
use crate::pool::{Pool, PoolMetrics, PooledGuard};
use crate::streaming::StreamingDispatcher;
use crate::value::{Record, Value};
use futures::stream::LocalBoxStream;
use futures::Stream;
use indexmap::IndexMap;
use std::rc::Rc;
use std::sync::Arc;

/// Engine construction/call-site options (§4.6's option table). A plain
/// `Copy` struct with a hand-written `Default`, matching the teacher's
/// `ValidationConfig`/`IteratorConfig`/`LazyConfig` style.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub debug: bool,
    pub silent: bool,
    pub enable_memory_pool: bool,
    pub memory_pool_size: usize,
    pub enable_streaming: bool,
    pub streaming_chunk_size: usize,
    pub fail_fast: bool,
    pub max_errors: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            debug: false,
            silent: false,
            enable_memory_pool: true,
            memory_pool_size: 64,
            enable_streaming: true,
            streaming_chunk_size: 32,
            fail_fast: false,
            max_errors: usize::MAX,
        }
    }
}

/// The outcome of validating one record. `data` is carried as `Arc<Record>`
/// so the "by reference" semantics of §3's data model hold without a
/// borrow-checker lifetime threading through the whole engine: cloning the
/// `Arc` is cheap, and `Arc::ptr_eq` gives the reference-equality invariant
/// of §8 for free.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub data: Arc<Record>,
    pub errors: Option<IndexMap<String, Vec<Diagnostic>>>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        ValidationResult {
            is_valid: true,
            data: Arc::new(Record::new()),
            errors: None,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EngineMetrics {
    pub rule_compiler: crate::compiler::CompilerMetrics,
    pub data_extractor: CacheMetrics,
    pub memory_pool: PoolMetrics,
    pub cache: CacheManagerMetrics,
    pub error_handler: ErrorHandlerMetrics,
    pub callback_manager: CallbackManagerMetrics,
}

/// Per-rule argument-vector scratch: either borrowed from the pool (returned
/// to it on drop) or a plain, unpooled `Vec` when `enableMemoryPool` is
/// false. Transparent `Deref`/`DerefMut` so call sites use it like a
/// `Vec<Value>` without caring which case applies.
enum ArgsScratch<'p> {
    Pooled(PooledGuard<'p, Vec<Value>>),
    Plain(Vec<Value>),
}

impl<'p> std::ops::Deref for ArgsScratch<'p> {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        match self {
            ArgsScratch::Pooled(guard) => guard,
            ArgsScratch::Plain(args) => args,
        }
    }
}

impl<'p> std::ops::DerefMut for ArgsScratch<'p> {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        match self {
            ArgsScratch::Pooled(guard) => guard,
            ArgsScratch::Plain(args) => args,
        }
    }
}

/// Binds every collaborating subsystem. Single-cooperative-owner by design
/// (§5): every field's interior mutability is `RefCell`-based, so `Engine`
/// itself is `!Sync` and cannot be silently shared across threads.
pub struct Engine {
    rules: Vec<Rule>,
    registry: HelperRegistry,
    compiler: RuleCompiler,
    extractor: DataExtractor,
    argument_cache: ArgumentCache,
    pool: Pool,
    error_handler: ErrorHandler,
    callbacks: CallbackManager,
    options: EngineOptions,
}

impl Engine {
    /// `rules` is the ordered sequence honoured by every `validate*` call
    /// (an empty set always validates, §6). `callbacks` pre-registers named
    /// completion callbacks a caller can later reference by name.
    pub fn new(
        rules: Vec<Rule>,
        callbacks: Vec<(String, Rc<dyn Fn(&ValidationResult)>)>,
        options: EngineOptions,
    ) -> Self {
        let callback_manager = CallbackManager::new();
        for (name, callback) in callbacks {
            callback_manager.register_rc(name, callback);
        }
        Engine {
            rules,
            registry: HelperRegistry::new(),
            compiler: RuleCompiler::new(),
            extractor: DataExtractor::new(),
            argument_cache: ArgumentCache::new(),
            pool: Pool::new(options.memory_pool_size),
            error_handler: ErrorHandler::new(),
            callbacks: callback_manager,
            options,
        }
    }

    /// Register a custom helper beyond the built-in 33 before validating
    /// (§4.1 extensibility note).
    pub fn register_helper(
        &mut self,
        name: &'static str,
        description: &'static str,
        example: &'static str,
        category: &'static str,
        params: &'static [&'static str],
        resolver: Resolver,
    ) -> Result<(), crate::helpers::HelperAlreadyExists> {
        self.registry
            .register_helper(name, description, example, category, params, resolver)
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Compile any rule not already cached. Cheap on repeat calls: a cached
    /// rule costs one fingerprint lookup (§4.5).
    fn compiled_rules(&self) -> EngineResult<Vec<Rc<CompiledRule>>> {
        self.rules
            .iter()
            .map(|rule| self.compiler.compile(rule, &self.registry, &self.argument_cache))
            .collect()
    }

    fn log_debug(&self, message: &str) {
        if !self.options.silent && self.options.debug {
            log::debug!(target: "validex::engine", "{message}");
        }
    }

    /// Synchronous validation (§4.6). Fails with `InvalidInput` if `record`
    /// isn't an object mapping, and with `AsyncHelperInSync` if any compiled
    /// rule resolves to an async helper — sync validation never suspends.
    pub fn validate(
        &self,
        record: Arc<Record>,
        callback: Option<CallbackRef>,
    ) -> EngineResult<ValidationResult> {
        let compiled = self.compiled_rules()?;
        if let Some(rule) = compiled.iter().find(|rule| rule.is_async()) {
            return Err(EngineError::async_helper_in_sync(rule.op.clone()));
        }
        self.log_debug(&format!("validating record against {} rule(s)", compiled.len()));
        let result = self.evaluate_sync(record, &compiled);
        if let Some(callback_ref) = &callback {
            self.callbacks.dispatch(callback_ref, &result)?;
        }
        Ok(result)
    }

    /// Convenience entry point for an untyped `Value` rather than an
    /// already-wrapped `Record`; this is where `InvalidInput` is actually
    /// raised (§7 scenario 3: `validate(null)` throws `InvalidInput`).
    pub fn validate_value(
        &self,
        value: Value,
        callback: Option<CallbackRef>,
    ) -> EngineResult<ValidationResult> {
        let record = Record::from_value(value)
            .map_err(|_| EngineError::invalid_input("record is not an object mapping"))?;
        self.validate(Arc::new(record), callback)
    }

    /// Asynchronous validation (§4.6): as `validate`, but async helper
    /// resolvers are permitted and awaited in place.
    pub async fn validate_async(
        &self,
        record: Arc<Record>,
        callback: Option<CallbackRef>,
    ) -> EngineResult<ValidationResult> {
        let compiled = self.compiled_rules()?;
        let result = self.evaluate_async(record, &compiled).await;
        if let Some(callback_ref) = &callback {
            self.callbacks.dispatch(callback_ref, &result)?;
        }
        Ok(result)
    }

    pub async fn validate_value_async(
        &self,
        value: Value,
        callback: Option<CallbackRef>,
    ) -> EngineResult<ValidationResult> {
        let record = Record::from_value(value)
            .map_err(|_| EngineError::invalid_input("record is not an object mapping"))?;
        self.validate_async(Arc::new(record), callback).await
    }

    /// Streaming validation (§4.9) over an owned iterable of records.
    /// Delegates to the `StreamingDispatcher`; falls back to record-by-record
    /// evaluation with a logged warning when `enable_streaming` is false.
    pub fn validate_stream<I>(
        &self,
        source: I,
        options: Option<EngineOptions>,
    ) -> LocalBoxStream<'_, EngineResult<ValidationResult>>
    where
        I: IntoIterator<Item = Value> + 'static,
    {
        let stream = tokio_stream::iter(source);
        StreamingDispatcher::dispatch(self, stream, options.unwrap_or(self.options))
    }

    /// As `validate_stream`, but over an already-constructed `Stream` rather
    /// than a plain iterable (e.g. a source fed by another async task).
    pub fn validate_stream_with<S>(
        &self,
        source: S,
        options: Option<EngineOptions>,
    ) -> LocalBoxStream<'_, EngineResult<ValidationResult>>
    where
        S: Stream<Item = Value> + 'static,
    {
        StreamingDispatcher::dispatch(self, source, options.unwrap_or(self.options))
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        EngineMetrics {
            rule_compiler: self.compiler.metrics(),
            data_extractor: self.extractor.metrics(),
            memory_pool: self.pool.metrics(),
            cache: CacheManager::metrics(&self.extractor, &self.argument_cache),
            error_handler: self.error_handler.metrics(),
            callback_manager: self.callbacks.metrics(),
        }
    }

    /// Resets the path cache, argument cache, and rule-compiler cache as a
    /// unit (§4.7). Does not touch the object pool — pooled scratch objects
    /// aren't a "cache" in the §3 sense and have their own `clear`.
    pub fn clear_caches(&self) {
        CacheManager::clear_caches(&self.extractor, &self.argument_cache, &self.compiler);
        self.error_handler.clear();
    }

    fn evaluate_sync(&self, record: Arc<Record>, compiled: &[Rc<CompiledRule>]) -> ValidationResult {
        if self.options.enable_memory_pool {
            let mut guard = self.pool.get("validation_result", ValidationResult::default);
            guard.on_return_reset(|value| *value = ValidationResult::default());
            guard.is_valid = true;
            guard.data = Arc::clone(&record);
            guard.errors = None;
            self.run_rules(&mut guard, &record, compiled);
            guard.clone()
        } else {
            let mut result = ValidationResult {
                is_valid: true,
                data: Arc::clone(&record),
                errors: None,
            };
            self.run_rules(&mut result, &record, compiled);
            result
        }
    }

    async fn evaluate_async(&self, record: Arc<Record>, compiled: &[Rc<CompiledRule>]) -> ValidationResult {
        if self.options.enable_memory_pool {
            let mut guard = self.pool.get("validation_result", ValidationResult::default);
            guard.on_return_reset(|value| *value = ValidationResult::default());
            guard.is_valid = true;
            guard.data = Arc::clone(&record);
            guard.errors = None;
            self.run_rules_async(&mut guard, &record, compiled).await;
            guard.clone()
        } else {
            let mut result = ValidationResult {
                is_valid: true,
                data: Arc::clone(&record),
                errors: None,
            };
            self.run_rules_async(&mut result, &record, compiled).await;
            result
        }
    }

    /// The per-record algorithm of §4.6, synchronous variant: extract, call,
    /// negate, accumulate, honour `failFast`/`maxErrors`. Every compiled rule
    /// here is guaranteed synchronous — `validate()` already rejected the
    /// rule set otherwise.
    fn run_rules(&self, result: &mut ValidationResult, record: &Arc<Record>, compiled: &[Rc<CompiledRule>]) {
        let record_value = record.as_value();
        let mut errors: IndexMap<String, Vec<Diagnostic>> = IndexMap::new();
        let mut diagnostic_count = 0usize;
        for rule in compiled {
            if self.should_stop(diagnostic_count) {
                break;
            }
            let mut args = self.acquire_args();
            self.prepare_args(&record_value, rule, &mut args);
            let outcome = match &rule.resolver {
                Resolver::Sync(resolver) => resolver(&args),
                Resolver::Async(_) => unreachable!("validate() rejects async rules before reaching run_rules"),
            };
            if let Some(diagnostic) = self.diagnostic_for(rule, outcome) {
                self.field_bucket(&mut errors, &rule.field).push(diagnostic);
                diagnostic_count += 1;
            }
        }
        self.finish(result, errors);
    }

    /// Async counterpart of `run_rules`: identical shape, but awaits each
    /// resolver so host-registered async helpers can suspend mid-record.
    async fn run_rules_async(
        &self,
        result: &mut ValidationResult,
        record: &Arc<Record>,
        compiled: &[Rc<CompiledRule>],
    ) {
        let record_value = record.as_value();
        let mut errors: IndexMap<String, Vec<Diagnostic>> = IndexMap::new();
        let mut diagnostic_count = 0usize;
        for rule in compiled {
            if self.should_stop(diagnostic_count) {
                break;
            }
            let mut args = self.acquire_args();
            self.prepare_args(&record_value, rule, &mut args);
            let outcome = match &rule.resolver {
                Resolver::Sync(resolver) => resolver(&args),
                // Async resolvers take ownership (the boxed future is `'static`
                // and can't borrow from pooled scratch across an `.await`), so
                // the pooled vector is cloned into the call and the original
                // still returns to the pool via `args`'s own `Drop` below.
                Resolver::Async(resolver) => resolver(args.clone()).await,
            };
            if let Some(diagnostic) = self.diagnostic_for(rule, outcome) {
                self.field_bucket(&mut errors, &rule.field).push(diagnostic);
                diagnostic_count += 1;
            }
        }
        self.finish(result, errors);
    }

    fn should_stop(&self, diagnostic_count: usize) -> bool {
        diagnostic_count >= self.options.max_errors || (self.options.fail_fast && diagnostic_count > 0)
    }

    /// Borrow the per-rule argument-vector scratch from the pool (kind
    /// `"argument_vector"`), matching the `validation_result`/
    /// `diagnostic_list` RAII pattern: cleared on return so the next
    /// borrower starts from an empty vector. Bypasses the pool entirely
    /// when `enableMemoryPool` is false, same as the other two pooled
    /// kinds.
    fn acquire_args(&self) -> ArgsScratch<'_> {
        if self.options.enable_memory_pool {
            let mut guard = self.pool.get("argument_vector", Vec::new);
            guard.on_return_reset(|args: &mut Vec<Value>| args.clear());
            ArgsScratch::Pooled(guard)
        } else {
            ArgsScratch::Plain(Vec::new())
        }
    }

    /// Fill `args` with the prepared argument vector: field value in slot 0,
    /// declared parameters thereafter (§4.5/§4.6).
    fn prepare_args(&self, record_value: &Value, rule: &CompiledRule, args: &mut Vec<Value>) {
        args.clear();
        let field_value = self
            .extractor
            .extract_segments(record_value, &rule.field_segments);
        args.reserve(rule.param_values.len() + 1);
        args.push(field_value);
        args.extend(rule.param_values.iter().cloned());
    }

    /// Apply negation and turn a failing outcome into a `Diagnostic`, or
    /// `None` when the rule passed.
    fn diagnostic_for(&self, rule: &CompiledRule, outcome: Result<bool, String>) -> Option<Diagnostic> {
        match outcome {
            Ok(verdict) => {
                let passed = if rule.negative { !verdict } else { verdict };
                if passed {
                    None
                } else {
                    Some(self.error_handler.build_diagnostic(rule, None))
                }
            }
            Err(cause) => Some(self.error_handler.build_diagnostic(rule, Some(cause))),
        }
    }

    /// Fetch (creating on first use) the diagnostic list for `field`. Drawn
    /// from the pool when enabled, matching §4.6 step 2 ("borrow an
    /// error-list scratch per failing field on demand") — the vector leaves
    /// the pool for good once it's attached to a returned `ValidationResult`,
    /// the same "clone/give away on exit" trade-off the result object itself
    /// makes (§3's `ValidationResult` lifecycle note).
    fn field_bucket<'a>(
        &self,
        errors: &'a mut IndexMap<String, Vec<Diagnostic>>,
        field: &str,
    ) -> &'a mut Vec<Diagnostic> {
        errors.entry(field.to_string()).or_insert_with(|| {
            if self.options.enable_memory_pool {
                self.pool.get("diagnostic_list", Vec::new).into_inner()
            } else {
                Vec::new()
            }
        })
    }

    fn finish(&self, result: &mut ValidationResult, errors: IndexMap<String, Vec<Diagnostic>>) {
        result.is_valid = errors.is_empty();
        result.errors = if result.is_valid { None } else { Some(errors) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Rule;
    use indexmap::IndexMap as Map;

    fn engine_with(rules: Vec<Rule>, options: EngineOptions) -> Engine {
        Engine::new(rules, Vec::new(), options)
    }

    fn record(fields: &[(&str, Value)]) -> Arc<Record> {
        let mut record = Record::new();
        for (key, value) in fields {
            record.insert(*key, value.clone());
        }
        Arc::new(record)
    }

    #[test]
    fn empty_rule_set_always_validates() {
        let engine = engine_with(Vec::new(), EngineOptions::default());
        let result = engine.validate(record(&[]), None).unwrap();
        assert!(result.is_valid);
        assert!(result.errors.is_none());
    }

    #[test]
    fn data_is_reference_equal_to_input_arc() {
        let engine = engine_with(Vec::new(), EngineOptions::default());
        let input = record(&[]);
        let result = engine.validate(Arc::clone(&input), None).unwrap();
        assert!(Arc::ptr_eq(&input, &result.data));
    }

    #[test]
    fn invalid_input_on_non_object_value() {
        let engine = engine_with(Vec::new(), EngineOptions::default());
        let err = engine.validate_value(Value::Null, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn fail_fast_stops_after_first_diagnostic() {
        let rules = vec![
            Rule::new("isEmail", "email"),
            Rule::new("gte", "age").with_params({
                let mut params = Map::new();
                params.insert("value".to_string(), Value::Number(18.0));
                params
            }),
        ];
        let mut options = EngineOptions::default();
        options.fail_fast = true;
        let engine = engine_with(rules, options);
        let result = engine
            .validate(record(&[("email", Value::from("not-an-email")), ("age", Value::Number(5.0))]), None)
            .unwrap();
        assert_eq!(result.errors.as_ref().map(crate::error_handler::total_diagnostics), Some(1));
    }

    #[test]
    fn max_errors_caps_diagnostics() {
        let rules = vec![
            Rule::new("isEmail", "email"),
            Rule::new("isString", "age"),
        ];
        let mut options = EngineOptions::default();
        options.max_errors = 1;
        let engine = engine_with(rules, options);
        let result = engine
            .validate(record(&[("email", Value::from("bad")), ("age", Value::Number(5.0))]), None)
            .unwrap();
        assert_eq!(result.errors.as_ref().map(crate::error_handler::total_diagnostics), Some(1));
    }

    #[test]
    fn negative_inverts_helper_verdict() {
        let rule = Rule::new("isEmpty", "name").negated();
        let engine = engine_with(vec![rule], EngineOptions::default());
        let valid = engine.validate(record(&[("name", Value::from("Ana"))]), None).unwrap();
        assert!(valid.is_valid);
        let invalid = engine.validate(record(&[("name", Value::from(""))]), None).unwrap();
        assert!(!invalid.is_valid);
    }

    #[test]
    fn async_rule_in_sync_validate_errors() {
        let resolver: crate::helpers::AsyncResolver = std::sync::Arc::new(|_args| {
            Box::pin(async { Ok(true) })
        });
        let mut engine = engine_with(Vec::new(), EngineOptions::default());
        engine
            .register_helper("customAsync", "", "", "custom", &[], Resolver::Async(resolver))
            .unwrap();
        engine.rules.push(Rule::new("customAsync", "field"));
        let err = engine.validate(record(&[("field", Value::Null)]), None).unwrap_err();
        assert!(matches!(err, EngineError::AsyncHelperInSync { .. }));
    }

    #[tokio::test]
    async fn async_validate_awaits_async_helper() {
        let resolver: crate::helpers::AsyncResolver = std::sync::Arc::new(|args| {
            Box::pin(async move { Ok(!args[0].is_undefined()) })
        });
        let mut engine = engine_with(Vec::new(), EngineOptions::default());
        engine
            .register_helper("customAsync", "", "", "custom", &[], Resolver::Async(resolver))
            .unwrap();
        engine.rules.push(Rule::new("customAsync", "field"));
        let result = engine
            .validate_async(record(&[("field", Value::from("present"))]), None)
            .await
            .unwrap();
        assert!(result.is_valid);
    }

    #[test]
    fn callback_not_found_surfaces_from_validate() {
        let engine = engine_with(Vec::new(), EngineOptions::default());
        let err = engine
            .validate(record(&[]), Some(CallbackRef::named("missing")))
            .unwrap_err();
        assert!(matches!(err, EngineError::CallbackNotFound { .. }));
    }

    #[test]
    fn argument_vector_is_returned_to_the_pool_and_cleared_on_reuse() {
        let engine = engine_with(Vec::new(), EngineOptions::default());
        {
            let mut args = engine.acquire_args();
            args.push(Value::from("leftover"));
        }
        assert_eq!(
            engine.pool.metrics().pool_sizes.get("argument_vector").copied(),
            Some(1)
        );
        let args = engine.acquire_args();
        assert!(args.is_empty(), "reset hook must clear the vector before reuse");
    }

    #[test]
    fn disabling_memory_pool_bypasses_argument_vector_pooling() {
        let rules = vec![Rule::new("isEmail", "email")];
        let mut options = EngineOptions::default();
        options.enable_memory_pool = false;
        let engine = engine_with(rules, options);
        engine
            .validate(record(&[("email", Value::from("a@example.com"))]), None)
            .unwrap();
        assert!(engine.pool.metrics().pool_sizes.get("argument_vector").is_none());
    }
}
