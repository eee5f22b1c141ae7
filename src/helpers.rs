//! The Helper Registry (§4.1): the catalogue of named validation operators.
//!
//! Grounded on the teacher's [`crate::functional`] registry family —
//! `PureFunctionRegistry`'s guarded map of named, categorised, looked-up
//! callables, and `function_traits::FunctionContainer`'s type-erased-callable
//! idiom — generalised from "stored pure functions" to "stored validation
//! resolvers" keyed by a fixed DSL name instead of a type signature.

use crate::value::Value;
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A synchronous resolver: a pure function of the argument vector (field
/// value in slot 0, declared parameters thereafter) to a boolean verdict or
/// a structured failure message.
pub type SyncResolver = fn(&[Value]) -> Result<bool, String>;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// An asynchronous resolver, for host-registered helpers only — none of the
/// 33 built-ins are async (§4.1: "All 33 catalogue helpers above are
/// synchronous").
pub type AsyncResolver = Arc<dyn Fn(Vec<Value>) -> BoxFuture<Result<bool, String>> + Send + Sync>;

#[derive(Clone)]
pub enum Resolver {
    Sync(SyncResolver),
    Async(AsyncResolver),
}

impl Resolver {
    pub fn is_async(&self) -> bool {
        matches!(self, Resolver::Async(_))
    }
}

/// The public metadata surface returned by `list_helpers` — no resolver or
/// parameter names leak, per the §4.1 invariant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HelperMetadata {
    pub name: String,
    pub description: String,
    pub example: String,
    pub category: String,
}

/// The resolution surface returned by `resolver_schema_for` — the inverse
/// cut: resolver/async/params, but not description/example/category.
#[derive(Clone)]
pub struct ResolverSchema {
    pub resolver: Resolver,
    pub is_async: bool,
    pub params: Vec<String>,
}

#[derive(Clone)]
struct HelperEntry {
    name: &'static str,
    description: &'static str,
    example: &'static str,
    category: &'static str,
    params: &'static [&'static str],
    resolver: Resolver,
}

impl HelperEntry {
    fn metadata(&self) -> HelperMetadata {
        HelperMetadata {
            name: self.name.to_string(),
            description: self.description.to_string(),
            example: self.example.to_string(),
            category: self.category.to_string(),
        }
    }

    fn schema(&self) -> ResolverSchema {
        ResolverSchema {
            resolver: self.resolver.clone(),
            is_async: self.resolver.is_async(),
            params: self.params.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_mismatch(op: &str) -> String {
    format!("TypeMismatch: '{op}' received incomparable or wrongly-shaped arguments")
}

fn resolve_eq(args: &[Value]) -> Result<bool, String> {
    Ok(args[0] == args[1])
}

fn resolve_neq(args: &[Value]) -> Result<bool, String> {
    Ok(args[0] != args[1])
}

fn resolve_gt(args: &[Value]) -> Result<bool, String> {
    compare(&args[0], &args[1])
        .map(|ord| ord == Ordering::Greater)
        .ok_or_else(|| type_mismatch("gt"))
}

fn resolve_gte(args: &[Value]) -> Result<bool, String> {
    compare(&args[0], &args[1])
        .map(|ord| ord != Ordering::Less)
        .ok_or_else(|| type_mismatch("gte"))
}

fn resolve_lt(args: &[Value]) -> Result<bool, String> {
    compare(&args[0], &args[1])
        .map(|ord| ord == Ordering::Less)
        .ok_or_else(|| type_mismatch("lt"))
}

fn resolve_lte(args: &[Value]) -> Result<bool, String> {
    compare(&args[0], &args[1])
        .map(|ord| ord != Ordering::Greater)
        .ok_or_else(|| type_mismatch("lte"))
}

fn resolve_between(args: &[Value]) -> Result<bool, String> {
    let above_min = compare(&args[0], &args[1]).ok_or_else(|| type_mismatch("between"))?;
    let below_max = compare(&args[0], &args[2]).ok_or_else(|| type_mismatch("between"))?;
    Ok(above_min != Ordering::Less && below_max != Ordering::Greater)
}

fn resolve_is_email(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_email(&args[0]))
}

/// The pattern itself is validated eagerly by `RuleCompiler::compile`, which
/// fails the rule with `EngineError::InvalidRule` before any record ever
/// reaches this resolver. The fallible path below stays as a defensive
/// fallback only — its message carries no "InvalidRule" label, since a
/// failure here surfaces as an ordinary accumulated diagnostic, not the
/// fatal compile-time error.
fn resolve_regex_match(args: &[Value]) -> Result<bool, String> {
    let value = args[0].as_str().ok_or_else(|| type_mismatch("regexMatch"))?;
    let pattern = args[1].as_str().ok_or_else(|| type_mismatch("regexMatch"))?;
    regex::Regex::new(pattern)
        .map(|re| re.is_match(value))
        .map_err(|e| format!("bad regex pattern '{pattern}': {e}"))
}

fn resolve_min_length(args: &[Value]) -> Result<bool, String> {
    let value = args[0].as_str().ok_or_else(|| type_mismatch("minLength"))?;
    let min = args[1].as_f64().ok_or_else(|| type_mismatch("minLength"))?;
    Ok(value.chars().count() as f64 >= min)
}

fn resolve_max_length(args: &[Value]) -> Result<bool, String> {
    let value = args[0].as_str().ok_or_else(|| type_mismatch("maxLength"))?;
    let max = args[1].as_f64().ok_or_else(|| type_mismatch("maxLength"))?;
    Ok(value.chars().count() as f64 <= max)
}

fn resolve_is_empty(args: &[Value]) -> Result<bool, String> {
    crate::predicates::is_empty(&args[0]).ok_or_else(|| type_mismatch("isEmpty"))
}

fn resolve_contains(args: &[Value]) -> Result<bool, String> {
    crate::predicates::contains(&args[0], &args[1]).ok_or_else(|| type_mismatch("contains"))
}

fn resolve_has_property(args: &[Value]) -> Result<bool, String> {
    let property = args[1].as_str().ok_or_else(|| type_mismatch("hasProperty"))?;
    crate::predicates::has_property(&args[0], property).ok_or_else(|| type_mismatch("hasProperty"))
}

fn resolve_is_string(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_string(&args[0]))
}

fn resolve_is_number(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_number(&args[0]))
}

fn resolve_is_boolean(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_boolean(&args[0]))
}

fn resolve_is_array(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_array(&args[0]))
}

fn resolve_is_object(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_object(&args[0]))
}

fn resolve_is_date(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_date(&args[0]))
}

fn resolve_required(args: &[Value]) -> Result<bool, String> {
    Ok(!args[0].is_undefined())
}

fn resolve_not_empty(args: &[Value]) -> Result<bool, String> {
    crate::predicates::is_empty(&args[0])
        .map(|empty| !empty)
        .ok_or_else(|| type_mismatch("notEmpty"))
}

fn resolve_one_of(args: &[Value]) -> Result<bool, String> {
    let choices = args[1].as_array().ok_or_else(|| type_mismatch("oneOf"))?;
    Ok(choices.contains(&args[0]))
}

fn resolve_not_one_of(args: &[Value]) -> Result<bool, String> {
    resolve_one_of(args).map(|found| !found)
}

fn resolve_is_integer(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_integer(&args[0]))
}

fn resolve_is_positive(args: &[Value]) -> Result<bool, String> {
    args[0]
        .as_f64()
        .map(|n| n > 0.0)
        .ok_or_else(|| type_mismatch("isPositive"))
}

fn resolve_is_negative(args: &[Value]) -> Result<bool, String> {
    args[0]
        .as_f64()
        .map(|n| n < 0.0)
        .ok_or_else(|| type_mismatch("isNegative"))
}

fn resolve_starts_with(args: &[Value]) -> Result<bool, String> {
    let value = args[0].as_str().ok_or_else(|| type_mismatch("startsWith"))?;
    let prefix = args[1].as_str().ok_or_else(|| type_mismatch("startsWith"))?;
    Ok(value.starts_with(prefix))
}

fn resolve_ends_with(args: &[Value]) -> Result<bool, String> {
    let value = args[0].as_str().ok_or_else(|| type_mismatch("endsWith"))?;
    let suffix = args[1].as_str().ok_or_else(|| type_mismatch("endsWith"))?;
    Ok(value.ends_with(suffix))
}

fn resolve_is_url(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_url(&args[0]))
}

fn resolve_is_uuid(args: &[Value]) -> Result<bool, String> {
    Ok(crate::predicates::is_uuid(&args[0]))
}

fn resolve_min_items(args: &[Value]) -> Result<bool, String> {
    let items = args[0].as_array().ok_or_else(|| type_mismatch("minItems"))?;
    let min = args[1].as_f64().ok_or_else(|| type_mismatch("minItems"))?;
    Ok(items.len() as f64 >= min)
}

fn resolve_max_items(args: &[Value]) -> Result<bool, String> {
    let items = args[0].as_array().ok_or_else(|| type_mismatch("maxItems"))?;
    let max = args[1].as_f64().ok_or_else(|| type_mismatch("maxItems"))?;
    Ok(items.len() as f64 <= max)
}

macro_rules! builtin {
    ($name:expr, $desc:expr, $example:expr, $category:expr, $params:expr, $resolver:expr) => {
        HelperEntry {
            name: $name,
            description: $desc,
            example: $example,
            category: $category,
            params: $params,
            resolver: Resolver::Sync($resolver),
        }
    };
}

/// The 33-entry built-in catalogue, in registration order. `listHelpers()`
/// preserves this order and its length is pinned by tests (§8 scenario 5).
static BUILTINS: Lazy<Vec<HelperEntry>> = Lazy::new(|| {
    vec![
        builtin!("eq", "Value strictly equals the 'value' parameter.", "{op:'eq', field:'status', params:{value:'active'}}", "equality", &["value"], resolve_eq),
        builtin!("neq", "Value does not equal the 'value' parameter.", "{op:'neq', field:'status', params:{value:'banned'}}", "equality", &["value"], resolve_neq),
        builtin!("gt", "Value is strictly greater than 'value'.", "{op:'gt', field:'age', params:{value:17}}", "ordering", &["value"], resolve_gt),
        builtin!("gte", "Value is greater than or equal to 'value'.", "{op:'gte', field:'age', params:{value:18}}", "ordering", &["value"], resolve_gte),
        builtin!("lt", "Value is strictly less than 'value'.", "{op:'lt', field:'age', params:{value:65}}", "ordering", &["value"], resolve_lt),
        builtin!("lte", "Value is less than or equal to 'value'.", "{op:'lte', field:'age', params:{value:64}}", "ordering", &["value"], resolve_lte),
        builtin!("between", "Value lies within ['min','max'] inclusive.", "{op:'between', field:'age', params:{min:18,max:65}}", "ordering", &["min", "max"], resolve_between),
        builtin!("isEmail", "Value is a syntactically valid email address.", "{op:'isEmail', field:'email'}", "string", &[], resolve_is_email),
        builtin!("regexMatch", "Value matches the 'pattern' regular expression.", "{op:'regexMatch', field:'code', params:{pattern:'^[A-Z]{3}$'}}", "string", &["pattern"], resolve_regex_match),
        builtin!("minLength", "String has at least 'min' characters.", "{op:'minLength', field:'name', params:{min:1}}", "string", &["min"], resolve_min_length),
        builtin!("maxLength", "String has at most 'max' characters.", "{op:'maxLength', field:'name', params:{max:100}}", "string", &["max"], resolve_max_length),
        builtin!("isEmpty", "Value is empty (string/array/object) or null/undefined.", "{op:'isEmpty', field:'name', negative:true}", "string", &[], resolve_is_empty),
        builtin!("contains", "Collection/string contains 'value'.", "{op:'contains', field:'tags', params:{value:'admin'}}", "collection", &["value"], resolve_contains),
        builtin!("hasProperty", "Object has the named property, or array has the index.", "{op:'hasProperty', field:'address', params:{property:'zip'}}", "collection", &["property"], resolve_has_property),
        builtin!("isString", "Value is a string.", "{op:'isString', field:'name'}", "type", &[], resolve_is_string),
        builtin!("isNumber", "Value is a number (excludes NaN).", "{op:'isNumber', field:'age'}", "type", &[], resolve_is_number),
        builtin!("isBoolean", "Value is a boolean.", "{op:'isBoolean', field:'active'}", "type", &[], resolve_is_boolean),
        builtin!("isArray", "Value is an array.", "{op:'isArray', field:'tags'}", "type", &[], resolve_is_array),
        builtin!("isObject", "Value is an object (excludes arrays and null).", "{op:'isObject', field:'address'}", "type", &[], resolve_is_object),
        builtin!("isDate", "Value is an RFC 3339 date/time string.", "{op:'isDate', field:'createdAt'}", "type", &[], resolve_is_date),
        builtin!("required", "Field is present (not the undefined sentinel).", "{op:'required', field:'email'}", "presence", &[], resolve_required),
        builtin!("notEmpty", "Inverse framing of isEmpty for negation-free rules.", "{op:'notEmpty', field:'name'}", "presence", &[], resolve_not_empty),
        builtin!("oneOf", "Value is a member of the 'values' parameter list.", "{op:'oneOf', field:'role', params:{values:['admin','user']}}", "membership", &["values"], resolve_one_of),
        builtin!("notOneOf", "Value is not a member of the 'values' parameter list.", "{op:'notOneOf', field:'role', params:{values:['banned']}}", "membership", &["values"], resolve_not_one_of),
        builtin!("isInteger", "Value is a number with no fractional part.", "{op:'isInteger', field:'count'}", "type", &[], resolve_is_integer),
        builtin!("isPositive", "Value is a number greater than zero.", "{op:'isPositive', field:'amount'}", "ordering", &[], resolve_is_positive),
        builtin!("isNegative", "Value is a number less than zero.", "{op:'isNegative', field:'delta'}", "ordering", &[], resolve_is_negative),
        builtin!("startsWith", "String starts with the 'prefix' parameter.", "{op:'startsWith', field:'sku', params:{prefix:'SKU-'}}", "string", &["prefix"], resolve_starts_with),
        builtin!("endsWith", "String ends with the 'suffix' parameter.", "{op:'endsWith', field:'file', params:{suffix:'.csv'}}", "string", &["suffix"], resolve_ends_with),
        builtin!("isUrl", "Value looks structurally like a URL.", "{op:'isUrl', field:'website'}", "string", &[], resolve_is_url),
        builtin!("isUuid", "Value is a UUID-shaped string.", "{op:'isUuid', field:'id'}", "string", &[], resolve_is_uuid),
        builtin!("minItems", "Array has at least 'min' elements.", "{op:'minItems', field:'tags', params:{min:1}}", "collection", &["min"], resolve_min_items),
        builtin!("maxItems", "Array has at most 'max' elements.", "{op:'maxItems', field:'tags', params:{max:10}}", "collection", &["max"], resolve_max_items),
    ]
});

/// Catalogue of named operators, built from a static table at construction.
/// Host additions via [`HelperRegistry::register_helper`] are instance-local
/// so they never leak between unrelated engines.
pub struct HelperRegistry {
    entries: indexmap::IndexMap<String, HelperEntry>,
}

#[derive(Debug, thiserror::Error)]
#[error("helper '{0}' is already registered")]
pub struct HelperAlreadyExists(pub String);

impl HelperRegistry {
    pub fn new() -> Self {
        let entries = BUILTINS
            .iter()
            .map(|entry| (entry.name.to_string(), entry.clone()))
            .collect();
        HelperRegistry { entries }
    }

    /// Register a custom helper beyond the built-in 33. Grounded on
    /// `PureFunctionRegistry::register`'s dedup-then-insert shape.
    pub fn register_helper(
        &mut self,
        name: &'static str,
        description: &'static str,
        example: &'static str,
        category: &'static str,
        params: &'static [&'static str],
        resolver: Resolver,
    ) -> Result<(), HelperAlreadyExists> {
        if self.entries.contains_key(name) {
            return Err(HelperAlreadyExists(name.to_string()));
        }
        self.entries.insert(
            name.to_string(),
            HelperEntry {
                name,
                description,
                example,
                category,
                params,
                resolver,
            },
        );
        Ok(())
    }

    pub fn list_helpers(&self) -> Vec<HelperMetadata> {
        self.entries.values().map(HelperEntry::metadata).collect()
    }

    pub fn resolver_schema_for(
        &self,
        name: &str,
    ) -> Result<ResolverSchema, crate::error::EngineError> {
        self.entries
            .get(name)
            .map(HelperEntry::schema)
            .ok_or_else(|| crate::error::EngineError::helper_not_found(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::new()
    }
}
