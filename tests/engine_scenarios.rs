//! End-to-end scenarios exercised over the public `Engine` surface only (§8
//! of the design: the six literal scenarios), mirroring the teacher's split
//! between `tests/functional_tests.rs` for public-API coverage and
//! in-module `#[cfg(test)]` blocks for component-level invariants.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use validex::cache::ArgumentCache;
use validex::callback::CallbackRef;
use validex::engine::{Engine, EngineOptions};
use validex::error::EngineError;
use validex::extractor::DataExtractor;
use validex::pool::Pool;
use validex::value::{Record, Value};
use validex::Rule;

fn age_email_name_rules() -> Vec<Rule> {
    let mut age_params = IndexMap::new();
    age_params.insert("value".to_string(), Value::Number(18.0));
    vec![
        Rule::new("isEmail", "email"),
        Rule::new("gte", "age").with_params(age_params),
        Rule::new("isEmpty", "name").negated(),
    ]
}

fn record(email: &str, age: f64, name: &str) -> Arc<Record> {
    let mut record = Record::new();
    record.insert("email", email);
    record.insert("age", age);
    record.insert("name", name);
    Arc::new(record)
}

#[test]
fn scenario_1_fully_valid_record_has_no_errors() {
    let engine = Engine::new(age_email_name_rules(), Vec::new(), EngineOptions::default());
    let result = engine
        .validate(record("user@example.com", 25.0, "Ana"), None)
        .unwrap();
    assert!(result.is_valid);
    assert!(result.errors.is_none());
}

#[test]
fn scenario_2_invalid_record_reports_all_three_fields() {
    let engine = Engine::new(age_email_name_rules(), Vec::new(), EngineOptions::default());
    let result = engine
        .validate(record("no-email", 15.0, ""), None)
        .unwrap();
    assert!(!result.is_valid);
    let errors = result.errors.expect("invalid record must carry errors");
    assert_eq!(errors.len(), 3);
    assert!(errors.contains_key("email"));
    assert!(errors.contains_key("age"));
    assert!(errors.contains_key("name"));
}

#[test]
fn scenario_3_validating_a_non_object_is_invalid_input() {
    let engine = Engine::new(age_email_name_rules(), Vec::new(), EngineOptions::default());
    let err = engine.validate_value(Value::Null, None).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput { .. }));
}

#[test]
fn scenario_4_named_callback_dispatch_and_missing_name() {
    let invocations = Rc::new(RefCell::new(0));
    let invocations_clone = Rc::clone(&invocations);
    let callbacks = vec![(
        "onComplete".to_string(),
        Rc::new(move |_: &validex::ValidationResult| {
            *invocations_clone.borrow_mut() += 1;
        }) as Rc<dyn Fn(&validex::ValidationResult)>,
    )];
    let engine = Engine::new(age_email_name_rules(), callbacks, EngineOptions::default());

    engine
        .validate(
            record("user@example.com", 25.0, "Ana"),
            Some(CallbackRef::named("onComplete")),
        )
        .unwrap();
    assert_eq!(*invocations.borrow(), 1);

    let err = engine
        .validate(
            record("user@example.com", 25.0, "Ana"),
            Some(CallbackRef::named("missing")),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::CallbackNotFound { .. }));
}

#[test]
fn scenario_5_helper_catalogue_surface() {
    let engine = Engine::new(Vec::new(), Vec::new(), EngineOptions::default());
    let helpers = validex::helpers::HelperRegistry::new();
    assert_eq!(helpers.list_helpers().len(), 33);

    let schema = helpers.resolver_schema_for("eq").unwrap();
    assert!(!schema.is_async);
    assert_eq!(schema.params, vec!["value".to_string()]);

    let err = helpers.resolver_schema_for("__missing__").unwrap_err();
    assert!(matches!(err, EngineError::HelperNotFound { .. }));

    // also reachable through a constructed engine, since list_helpers is a
    // pure function of the (process-wide-shared) built-in catalogue
    drop(engine);
}

#[test]
fn scenario_6_pool_drops_third_return_past_max_size() {
    // Three successive *returns*, per the §8 literal scenario: acquire all
    // three guards first (so the bucket stays empty and every `get` is a
    // miss) then drop them in order, so each drop is a genuine return rather
    // than popping and immediately repushing the same slot.
    let pool = Pool::new(2);
    let first = pool.get("t", || 1i32);
    let second = pool.get("t", || 2i32);
    let third = pool.get("t", || 3i32);
    drop(first);
    drop(second);
    drop(third);
    assert_eq!(pool.metrics().pool_sizes.get("t").copied(), Some(2));
}

// Exercises the boundary behaviours from §8 alongside the six literal
// scenarios, since they're public-surface invariants too.

#[test]
fn empty_rule_set_boundary_validates_everything() {
    let engine = Engine::new(Vec::new(), Vec::new(), EngineOptions::default());
    let result = engine.validate(record("anything", -1.0, ""), None).unwrap();
    assert!(result.is_valid);
}

#[test]
fn max_errors_one_caps_diagnostics_at_one() {
    let mut options = EngineOptions::default();
    options.max_errors = 1;
    let engine = Engine::new(age_email_name_rules(), Vec::new(), options);
    let result = engine.validate(record("no-email", 15.0, ""), None).unwrap();
    let errors = result.errors.unwrap();
    let total: usize = errors.values().map(Vec::len).sum();
    assert_eq!(total, 1);
}

#[test]
fn path_extractor_round_trips_present_fields() {
    let extractor = DataExtractor::new();
    let mut record = Record::new();
    record.insert("email", "user@example.com");
    let value = record.as_value();
    assert_eq!(extractor.extract(&value, "email"), Value::from("user@example.com"));
}

#[test]
fn argument_cache_survives_repeated_lookups_for_same_params() {
    let cache = ArgumentCache::new();
    let mut params = IndexMap::new();
    params.insert("value".to_string(), Value::Number(18.0));
    let first = cache
        .get_or_insert("gte", &params, || Ok::<_, ()>(vec![Value::Number(18.0)]))
        .unwrap();
    let second = cache
        .get_or_insert("gte", &params, || Ok::<_, ()>(vec![Value::Number(18.0)]))
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.metrics().hits, 1);
}
