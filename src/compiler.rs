//! The Rule Compiler (§4.5): normalises user `Rule`s into executable
//! `CompiledRule`s, keyed by a structural fingerprint so the same rule
//! compiled twice returns the cached representation (§8's idempotence
//! invariant).

use crate::cache::ArgumentCache;
use crate::error::EngineError;
use crate::helpers::{HelperRegistry, Resolver};
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A user-supplied validation rule: an operator name, a dotted field path,
/// optional positional parameters, and an optional negation/message
/// override.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub op: String,
    pub field: String,
    pub params: Option<IndexMap<String, Value>>,
    pub negative: bool,
    pub message: Option<String>,
}

impl Rule {
    pub fn new(op: impl Into<String>, field: impl Into<String>) -> Self {
        Rule {
            op: op.into(),
            field: field.into(),
            params: None,
            negative: false,
            message: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: IndexMap<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negative = true;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Structural identity used for compiled-rule caching: op + field +
    /// canonicalised params + negative. Canonicalisation sorts params by key
    /// so insertion order doesn't affect cache identity.
    fn fingerprint(&self) -> String {
        let canonical_params: BTreeMap<&str, String> = self
            .params
            .as_ref()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.as_str(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        format!(
            "{}|{}|{:?}|{}",
            self.op, self.field, canonical_params, self.negative
        )
    }
}

/// A diagnostic describing a single failed rule for a single record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Diagnostic {
    pub op: String,
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<IndexMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// A `Rule` materialised for execution: pre-resolved helper reference,
/// pre-split field path, and the parameter slots in the helper's declared
/// order (the field value itself is supplied at invocation time as slot 0).
pub struct CompiledRule {
    pub op: String,
    pub field: String,
    pub field_segments: Vec<String>,
    pub param_values: Vec<Value>,
    pub negative: bool,
    pub message_template: Option<String>,
    pub resolver: Resolver,
    pub params_echo: Option<IndexMap<String, Value>>,
}

impl CompiledRule {
    pub fn is_async(&self) -> bool {
        self.resolver.is_async()
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct CompilerMetrics {
    pub compiled_rules_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Compiles and caches `Rule`s. Owned by an `Engine`; `Rc` (not `Arc`) is
/// enough since the engine is single-cooperative-owner (§5) and never
/// shares a `CompiledRule` across threads.
pub struct RuleCompiler {
    cache: RefCell<IndexMap<String, Rc<CompiledRule>>>,
    metrics: RefCell<CompilerMetrics>,
}

impl RuleCompiler {
    pub fn new() -> Self {
        RuleCompiler {
            cache: RefCell::new(IndexMap::new()),
            metrics: RefCell::new(CompilerMetrics::default()),
        }
    }

    pub fn compile(
        &self,
        rule: &Rule,
        registry: &HelperRegistry,
        argument_cache: &ArgumentCache,
    ) -> Result<Rc<CompiledRule>, EngineError> {
        let fingerprint = rule.fingerprint();
        if let Some(existing) = self.cache.borrow().get(&fingerprint) {
            self.metrics.borrow_mut().cache_hits += 1;
            return Ok(Rc::clone(existing));
        }

        let schema = registry
            .resolver_schema_for(&rule.op)
            .map_err(|_| EngineError::unknown_helper(rule.op.clone()))?;

        let empty_params = IndexMap::new();
        let supplied = rule.params.as_ref().unwrap_or(&empty_params);
        let op = rule.op.clone();
        let param_names = schema.params.clone();
        let param_values = argument_cache.get_or_insert(&rule.op, supplied, || {
            let mut values = Vec::with_capacity(param_names.len());
            for name in &param_names {
                match supplied.get(name) {
                    Some(value) => values.push(value.clone()),
                    None => {
                        return Err(EngineError::invalid_rule(
                            op.clone(),
                            format!("missing required parameter '{name}'"),
                        ))
                    }
                }
            }
            Ok(values)
        })?;

        // `regexMatch`'s pattern is user-supplied but fixed per rule, so a
        // malformed pattern is a rule-authoring mistake, not a per-record
        // data-quality failure: validate it eagerly here so it fails compile
        // with `InvalidRule` (§7) rather than surfacing as an accumulated
        // diagnostic on every record that happens to hit this rule.
        if rule.op == "regexMatch" {
            if let Some(pattern) = param_values.first().and_then(Value::as_str) {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(EngineError::invalid_rule(
                        rule.op.clone(),
                        format!("bad regex pattern '{pattern}': {e}"),
                    ));
                }
            }
        }

        let field_segments: Vec<String> = rule.field.split('.').map(str::to_string).collect();

        let compiled = Rc::new(CompiledRule {
            op: rule.op.clone(),
            field: rule.field.clone(),
            field_segments,
            param_values,
            negative: rule.negative,
            message_template: rule.message.clone(),
            resolver: schema.resolver,
            params_echo: rule.params.clone(),
        });

        self.cache
            .borrow_mut()
            .insert(fingerprint, Rc::clone(&compiled));
        let mut metrics = self.metrics.borrow_mut();
        metrics.cache_misses += 1;
        metrics.compiled_rules_count += 1;
        Ok(compiled)
    }

    pub fn metrics(&self) -> CompilerMetrics {
        *self.metrics.borrow()
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
        *self.metrics.borrow_mut() = CompilerMetrics::default();
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_op_is_unknown_helper_not_helper_not_found() {
        let compiler = RuleCompiler::new();
        let registry = HelperRegistry::new();
        let arg_cache = ArgumentCache::new();
        let rule = Rule::new("frobnicate", "name");
        let err = compiler.compile(&rule, &registry, &arg_cache).unwrap_err();
        assert!(matches!(err, EngineError::UnknownHelper { .. }));
    }

    #[test]
    fn missing_required_param_is_invalid_rule() {
        let compiler = RuleCompiler::new();
        let registry = HelperRegistry::new();
        let arg_cache = ArgumentCache::new();
        let rule = Rule::new("gte", "age");
        let err = compiler.compile(&rule, &registry, &arg_cache).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRule { .. }));
    }

    #[test]
    fn compiling_same_rule_twice_hits_cache() {
        let compiler = RuleCompiler::new();
        let registry = HelperRegistry::new();
        let arg_cache = ArgumentCache::new();
        let rule = Rule::new("isEmail", "email");
        let first = compiler.compile(&rule, &registry, &arg_cache).unwrap();
        let second = compiler.compile(&rule, &registry, &arg_cache).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        let metrics = compiler.metrics();
        assert_eq!(metrics.compiled_rules_count, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
    }

    #[test]
    fn param_order_follows_params_not_insertion() {
        let compiler = RuleCompiler::new();
        let registry = HelperRegistry::new();
        let arg_cache = ArgumentCache::new();
        let mut params = IndexMap::new();
        params.insert("max".to_string(), Value::Number(65.0));
        params.insert("min".to_string(), Value::Number(18.0));
        let rule = Rule::new("between", "age").with_params(params);
        let compiled = compiler.compile(&rule, &registry, &arg_cache).unwrap();
        assert_eq!(compiled.param_values, vec![Value::Number(18.0), Value::Number(65.0)]);
    }

    #[test]
    fn malformed_regex_pattern_fails_compile_as_invalid_rule() {
        let compiler = RuleCompiler::new();
        let registry = HelperRegistry::new();
        let arg_cache = ArgumentCache::new();
        let mut params = IndexMap::new();
        params.insert("pattern".to_string(), Value::from("[unclosed"));
        let rule = Rule::new("regexMatch", "code").with_params(params);
        let err = compiler.compile(&rule, &registry, &arg_cache).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRule { .. }));
    }

    #[test]
    fn well_formed_regex_pattern_compiles_fine() {
        let compiler = RuleCompiler::new();
        let registry = HelperRegistry::new();
        let arg_cache = ArgumentCache::new();
        let mut params = IndexMap::new();
        params.insert("pattern".to_string(), Value::from("^[A-Z]{3}$"));
        let rule = Rule::new("regexMatch", "code").with_params(params);
        assert!(compiler.compile(&rule, &registry, &arg_cache).is_ok());
    }

    #[test]
    fn compiled_rule_presplits_field_segments() {
        let compiler = RuleCompiler::new();
        let registry = HelperRegistry::new();
        let arg_cache = ArgumentCache::new();
        let rule = Rule::new("isEmail", "contact.email");
        let compiled = compiler.compile(&rule, &registry, &arg_cache).unwrap();
        assert_eq!(compiled.field_segments, vec!["contact".to_string(), "email".to_string()]);
    }
}
