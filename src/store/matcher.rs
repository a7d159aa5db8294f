//! Evaluates native document filters in memory.

use crate::core::value::{DATE_KEY, compare_values, get_path, values_equal};
use crate::core::{Document, StoreError, StoreResult};
use crate::query::SearchQuery;
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const REGEX_CACHE_SIZE: usize = 200;

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Mutex<LruCache<(String, bool), Arc<Regex>>> =
        Mutex::new(LruCache::new(
            NonZeroUsize::new(REGEX_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
        ));
}

fn cached_regex(pattern: &str, case_insensitive: bool) -> StoreResult<Arc<Regex>> {
    let key = (pattern.to_string(), case_insensitive);
    {
        let mut cache = REGEX_LRU_CACHE
            .lock()
            .map_err(|e| StoreError::Driver(format!("regex cache poisoned: {}", e)))?;
        if let Some(regex) = cache.get(&key) {
            return Ok(Arc::clone(regex));
        }
    }

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| StoreError::Driver(format!("invalid $regex '{}': {}", pattern, e)))?;
    let regex = Arc::new(regex);

    if let Ok(mut cache) = REGEX_LRU_CACHE.lock() {
        cache.put(key, Arc::clone(&regex));
    }
    Ok(regex)
}

/// Filter evaluation for one collection.
///
/// `text_fields` are the members of the collection's text index; `$text`
/// fails when there are none.
pub struct Matcher<'a> {
    text_fields: &'a [String],
}

impl<'a> Matcher<'a> {
    pub fn new(text_fields: &'a [String]) -> Self {
        Self { text_fields }
    }

    pub fn matches(&self, document: &Document, filter: &Document) -> StoreResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for clause in clauses(key, condition)? {
                        if !self.matches(document, clause)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => {
                    let mut any = false;
                    for clause in clauses(key, condition)? {
                        if self.matches(document, clause)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$nor" => {
                    let mut none = true;
                    for clause in clauses(key, condition)? {
                        if self.matches(document, clause)? {
                            none = false;
                            break;
                        }
                    }
                    none
                }
                "$text" => self.text_score(document, search_text(condition)?)?.is_some(),
                op if op.starts_with('$') => {
                    return Err(StoreError::Driver(format!("unknown top-level operator '{}'", op)));
                }
                field => field_matches(get_path(document, field), condition)?,
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Relevance of `document` for a `$text` search, `None` when it does not match.
    pub fn text_score(&self, document: &Document, search: &str) -> StoreResult<Option<f64>> {
        if self.text_fields.is_empty() {
            return Err(StoreError::Driver(
                "$text query requires a text index".to_string(),
            ));
        }
        let mut texts = Vec::new();
        for field in self.text_fields {
            match get_path(document, field) {
                Some(JsonValue::String(text)) => texts.push(text.as_str()),
                Some(JsonValue::Array(items)) => {
                    texts.extend(items.iter().filter_map(JsonValue::as_str))
                }
                _ => {}
            }
        }
        Ok(SearchQuery::parse(search).score(texts))
    }
}

/// The `$search` text of the first `$text` clause at the top level or inside a top-level `$and`.
pub fn find_text_search(filter: &Document) -> Option<&str> {
    if let Some(condition) = filter.get("$text") {
        return condition.get("$search").and_then(JsonValue::as_str);
    }
    filter
        .get("$and")?
        .as_array()?
        .iter()
        .filter_map(JsonValue::as_object)
        .find_map(find_text_search)
}

fn clauses<'v>(key: &str, condition: &'v JsonValue) -> StoreResult<Vec<&'v Document>> {
    condition
        .as_array()
        .ok_or_else(|| StoreError::Driver(format!("{} expects an array", key)))?
        .iter()
        .map(|clause| {
            clause
                .as_object()
                .ok_or_else(|| StoreError::Driver(format!("{} clauses must be documents", key)))
        })
        .collect()
}

fn search_text(condition: &JsonValue) -> StoreResult<&str> {
    condition
        .get("$search")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| StoreError::Driver("$text expects {\"$search\": <text>}".to_string()))
}

/// An operator document has only `$`-prefixed keys and is not a native date.
fn is_operator_document(condition: &JsonValue) -> bool {
    match condition.as_object() {
        Some(map) => {
            !map.is_empty()
                && map.keys().all(|key| key.starts_with('$'))
                && !(map.len() == 1 && map.contains_key(DATE_KEY))
        }
        None => false,
    }
}

fn field_matches(actual: Option<&JsonValue>, condition: &JsonValue) -> StoreResult<bool> {
    let Some(operators) = condition.as_object().filter(|_| is_operator_document(condition)) else {
        // implicit equality
        return Ok(values_equal(actual.unwrap_or(&JsonValue::Null), condition));
    };

    let case_insensitive = operators
        .get("$options")
        .and_then(JsonValue::as_str)
        .is_some_and(|options| options.contains('i'));

    for (op, operand) in operators {
        let value = actual.unwrap_or(&JsonValue::Null);
        let matched = match op.as_str() {
            "$eq" => values_equal(value, operand),
            "$ne" => !values_equal(value, operand),
            "$gt" => actual.and_then(|a| compare_values(a, operand)) == Some(Ordering::Greater),
            "$gte" => matches!(
                actual.and_then(|a| compare_values(a, operand)),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "$lt" => actual.and_then(|a| compare_values(a, operand)) == Some(Ordering::Less),
            "$lte" => matches!(
                actual.and_then(|a| compare_values(a, operand)),
                Some(Ordering::Less | Ordering::Equal)
            ),
            "$in" => operand_array(op, operand)?
                .iter()
                .any(|item| values_equal(value, item)),
            "$nin" => !operand_array(op, operand)?
                .iter()
                .any(|item| values_equal(value, item)),
            "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| StoreError::Driver("$regex expects a string".to_string()))?;
                match value.as_str() {
                    Some(text) => cached_regex(pattern, case_insensitive)?.is_match(text),
                    None => false,
                }
            }
            "$options" => true,
            other => {
                return Err(StoreError::Driver(format!("unknown field operator '{}'", other)));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operand_array<'v>(op: &str, operand: &'v JsonValue) -> StoreResult<&'v Vec<JsonValue>> {
    operand
        .as_array()
        .ok_or_else(|| StoreError::Driver(format!("{} expects an array", op)))
}

/// Sort order across mixed value kinds: missing/null first, then numbers,
/// strings, objects, arrays, booleans, dates.
pub fn sort_compare(left: Option<&JsonValue>, right: Option<&JsonValue>) -> Ordering {
    let left = left.unwrap_or(&JsonValue::Null);
    let right = right.unwrap_or(&JsonValue::Null);
    let rank = |value: &JsonValue| match value {
        JsonValue::Null => 0,
        JsonValue::Number(_) => 1,
        JsonValue::String(_) => 2,
        JsonValue::Object(map) if map.len() == 1 && map.contains_key(DATE_KEY) => 6,
        JsonValue::Object(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Bool(_) => 5,
    };
    rank(left)
        .cmp(&rank(right))
        .then_with(|| compare_values(left, right).unwrap_or(Ordering::Equal))
}
