use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

/// A stored document: field name to JSON value.
pub type Document = Map<String, JsonValue>;

/// Key of the native date wrapper used by the document store (`{"$date": millis}`).
pub const DATE_KEY: &str = "$date";

/// Compare two stored values.
///
/// Only values of the same kind are ordered: numbers (with integer/float
/// coercion), strings, booleans and native dates. Everything else, including
/// `null`, has no ordering and range predicates never match it.
pub fn compare_values(left: &JsonValue, right: &JsonValue) -> Option<Ordering> {
    match (left, right) {
        // ========================================
        // Numbers (integer/float coercion)
        // ========================================
        (JsonValue::Number(a), JsonValue::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Some(a.cmp(&b));
            }
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }

        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),

        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),

        // ========================================
        // Native dates
        // ========================================
        (JsonValue::Object(_), JsonValue::Object(_)) => {
            let a = date_millis(left)?;
            let b = date_millis(right)?;
            Some(a.cmp(&b))
        }

        _ => None,
    }
}

/// Equality used by filters: numeric coercion, structural for arrays and objects.
pub fn values_equal(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(_), JsonValue::Number(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Resolve a dotted path (`a.b.c`) inside a document. Missing segments yield `None`.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Canonical string form of a key value, used for hashing identifiers.
///
/// Numbers that [`values_equal`] treats as equal share one key, so `1` and
/// `1.0` collide.
pub fn canonical_key(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => format!("s:{}", s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                format!("n:{}", i)
            } else if let Some(u) = n.as_u64() {
                format!("n:{}", u)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        format!("n:{}", f as i64)
                    }
                    Some(f) => format!("n:{}", f),
                    None => format!("j:{}", n),
                }
            }
        }
        other => format!("j:{}", other),
    }
}

pub fn is_null_or_missing(value: Option<&JsonValue>) -> bool {
    matches!(value, None | Some(JsonValue::Null))
}

// ========================================
// Native date wrapper
// ========================================

pub fn native_date(millis: i64) -> JsonValue {
    let mut map = Map::new();
    map.insert(DATE_KEY.to_string(), JsonValue::from(millis));
    JsonValue::Object(map)
}

pub fn date_millis(value: &JsonValue) -> Option<i64> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(DATE_KEY)?.as_i64()
}

/// RFC 3339 text to the native date wrapper. Non-date text is returned unchanged.
///
/// The wrapper holds whole milliseconds; anything finer is truncated, so an
/// instant with sub-millisecond digits reads back at millisecond precision.
pub fn text_to_native_date(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(text) => match DateTime::parse_from_rfc3339(text) {
            Ok(parsed) => native_date(parsed.with_timezone(&Utc).timestamp_millis()),
            Err(_) => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Native date wrapper back to RFC 3339 text. Other values are returned unchanged.
pub fn native_date_to_text(value: &JsonValue) -> JsonValue {
    match date_millis(value).and_then(|millis| Utc.timestamp_millis_opt(millis).single()) {
        Some(instant) => JsonValue::String(instant.to_rfc3339()),
        None => value.clone(),
    }
}
