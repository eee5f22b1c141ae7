//! Type and collection guards (§4.2) shared by the built-in helper catalogue
//! and usable standalone by the data extractor's callers.
//!
//! These answer narrowly, the way the design calls for: `is_number` excludes
//! NaN, `is_object` excludes arrays and the null sentinel, `is_date` is a
//! stricter grammar layered on top of `is_string` rather than a distinct
//! `Value` variant (see DESIGN.md's Open Question decision).

use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;

pub fn is_string(value: &Value) -> bool {
    matches!(value, Value::String(_))
}

pub fn is_number(value: &Value) -> bool {
    matches!(value, Value::Number(n) if !n.is_nan())
}

pub fn is_boolean(value: &Value) -> bool {
    matches!(value, Value::Bool(_))
}

pub fn is_array(value: &Value) -> bool {
    matches!(value, Value::Array(_))
}

pub fn is_object(value: &Value) -> bool {
    matches!(value, Value::Object(_))
}

pub fn is_date(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
        .unwrap_or(false)
}

pub fn is_integer(value: &Value) -> bool {
    matches!(value, Value::Number(n) if !n.is_nan() && n.fract() == 0.0)
}

/// Whether `value` is "empty": empty string, empty array, empty object, or
/// the undefined/null sentinels. Any other shape is a [`TypeMismatch`]-style
/// caller error, signalled here by returning `None`.
///
/// [`TypeMismatch`]: crate::error::EngineError::InvalidRule
pub fn is_empty(value: &Value) -> Option<bool> {
    match value {
        Value::String(s) => Some(s.is_empty()),
        Value::Array(items) => Some(items.is_empty()),
        Value::Object(map) => Some(map.is_empty()),
        Value::Null | Value::Undefined => Some(true),
        _ => None,
    }
}

/// Whether `haystack` contains `needle`: substring for strings, element
/// membership for arrays, key presence for objects. `None` for any other
/// haystack shape.
pub fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)),
        Value::Array(items) => Some(items.contains(needle)),
        Value::Object(map) => needle.as_str().map(|key| map.contains_key(key)),
        _ => None,
    }
}

/// Whether an object has the named property, or an array has the given
/// numeric index in range. `None` for any other haystack shape.
pub fn has_property(haystack: &Value, property: &str) -> Option<bool> {
    match haystack {
        Value::Object(map) => Some(map.contains_key(property)),
        Value::Array(items) => Some(
            property
                .parse::<usize>()
                .map(|i| i < items.len())
                .unwrap_or(false),
        ),
        _ => None,
    }
}

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
        .expect("static email regex is valid")
});

pub fn is_email(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| EMAIL_REGEX.is_match(s))
        .unwrap_or(false)
}

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static uuid regex is valid")
});

pub fn is_uuid(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| UUID_REGEX.is_match(s))
        .unwrap_or(false)
}

/// Structural `scheme://host[...]` check rather than a full parse — the one
/// caller that needs URL shape doesn't need a dedicated URL-parsing crate
/// (see DESIGN.md's dropped-dependency note for `url`).
static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://\S+$").expect("static url regex is valid"));

pub fn is_url(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| URL_REGEX.is_match(s))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_excludes_nan() {
        assert!(is_number(&Value::Number(1.0)));
        assert!(!is_number(&Value::Number(f64::NAN)));
    }

    #[test]
    fn object_excludes_arrays_and_null() {
        assert!(!is_object(&Value::Array(vec![])));
        assert!(!is_object(&Value::Null));
    }

    #[test]
    fn is_empty_rejects_non_collection_shapes() {
        assert_eq!(is_empty(&Value::Bool(true)), None);
        assert_eq!(is_empty(&Value::String(String::new())), Some(true));
    }

    #[test]
    fn email_predicate() {
        assert!(is_email(&Value::from("user@example.com")));
        assert!(!is_email(&Value::from("no-email")));
    }

    #[test]
    fn uuid_predicate() {
        assert!(is_uuid(&Value::from("550e8400-e29b-41d4-a716-446655440000")));
        assert!(!is_uuid(&Value::from("not-a-uuid")));
    }
}
