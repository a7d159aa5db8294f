//! Naive in-memory evaluation of filter trees over entity records.
//!
//! Records are member-keyed JSON objects (the serde form of an entity). This
//! is the reference semantics the compiled native filters must agree with.

use super::filter::{FilterNode, FilterOperator};
use super::translator::{LeafTarget, encode_operand, resolve_leaf};
use crate::core::value::{compare_values, values_equal};
use crate::core::{Document, Result};
use crate::schema::EntityDescriptor;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Does `record` satisfy `filter`? Extended leaves read from `extension`.
pub fn evaluate(
    filter: &FilterNode,
    descriptor: &EntityDescriptor,
    record: &Document,
    extension: Option<&Document>,
) -> Result<bool> {
    match filter {
        FilterNode::And(children) => {
            for child in children {
                if !evaluate(child, descriptor, record, extension)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        FilterNode::Or(children) => {
            for child in children {
                if evaluate(child, descriptor, record, extension)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        FilterNode::Not(child) => Ok(!evaluate(child, descriptor, record, extension)?),
        FilterNode::Leaf(leaf) => {
            let target = resolve_leaf(leaf, descriptor)?;
            let actual = match target {
                LeafTarget::Attribute(attr) => {
                    attr.encode_value(record.get(attr.name()).unwrap_or(&JsonValue::Null))
                }
                LeafTarget::Extended(name) => extension
                    .and_then(|ext| ext.get(name))
                    .cloned()
                    .unwrap_or(JsonValue::Null),
            };
            let operand = encode_operand(target, leaf.operator, &leaf.value);
            Ok(compare(&actual, leaf.operator, &operand))
        }
    }
}

/// Apply one operator to an already encoded stored value.
pub(crate) fn compare(actual: &JsonValue, operator: FilterOperator, operand: &JsonValue) -> bool {
    match operator {
        FilterOperator::Equals => values_equal(actual, operand),
        FilterOperator::NotEquals => !values_equal(actual, operand),
        FilterOperator::GreaterThan => compare_values(actual, operand) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::LessThan => compare_values(actual, operand) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
            match (actual.as_str(), operand.as_str()) {
                (Some(text), Some(pattern)) => match operator {
                    FilterOperator::StartsWith => text.starts_with(pattern),
                    FilterOperator::EndsWith => text.ends_with(pattern),
                    _ => text.contains(pattern),
                },
                _ => false,
            }
        }
        FilterOperator::In => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(actual, item))),
        FilterOperator::IsNull => actual.is_null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeclaredType;
    use crate::datasource::{DataSource, DataSourceDirectory};
    use crate::query::AttrRef;
    use crate::schema::{AttributeDef, EntityDef, SchemaRegistry};
    use serde_json::json;

    fn descriptor() -> EntityDescriptor {
        let registry = SchemaRegistry::new(
            DataSourceDirectory::new().with(DataSource::nosql("main", "mem://", "db")),
        );
        registry
            .build_descriptor(
                EntityDef::new("Article")
                    .collection("articles")
                    .data_source("main")
                    .extendable()
                    .attribute(AttributeDef::new("ID", DeclaredType::Text).primary_key())
                    .attribute(AttributeDef::new("Title", DeclaredType::Text))
                    .attribute(AttributeDef::new("Views", DeclaredType::Integer))
                    .attribute(AttributeDef::new("On", DeclaredType::DateTime)),
                "Article",
            )
            .unwrap()
    }

    fn record(value: JsonValue) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_leaf_operators() {
        let descriptor = descriptor();
        let doc = record(json!({
            "ID": "a", "Title": "Hello world", "Views": 150, "On": "2024-01-02T00:00:00Z"
        }));
        let check = |filter: FilterNode| evaluate(&filter, &descriptor, &doc, None).unwrap();

        assert!(check(FilterNode::eq("Views", 150.0)));
        assert!(check(FilterNode::ne("Title", "x")));
        assert!(check(FilterNode::gt("On", "2024-01-01T00:00:00Z")));
        assert!(check(FilterNode::lte("Views", 150)));
        assert!(!check(FilterNode::lt("Views", 150)));
        assert!(check(FilterNode::contains("Title", "lo wo")));
        assert!(check(FilterNode::starts_with("Title", "Hello")));
        assert!(!check(FilterNode::ends_with("Title", "Hello")));
        assert!(check(FilterNode::in_set("ID", ["b", "a"])));
        assert!(check(FilterNode::is_null(AttrRef::extended("color"))));
        assert!(!check(FilterNode::is_null("Title")));
    }

    #[test]
    fn test_null_and_missing_values() {
        let descriptor = descriptor();
        let doc = record(json!({"ID": "a", "Title": null}));
        let check = |filter: FilterNode| evaluate(&filter, &descriptor, &doc, None).unwrap();

        assert!(check(FilterNode::is_null("Title")));
        assert!(check(FilterNode::is_null("Views")));
        assert!(!check(FilterNode::gt("Views", 0)));
        assert!(!check(FilterNode::lt("Views", 0)));
        assert!(check(FilterNode::ne("Views", 0)));
        assert!(!check(FilterNode::contains("Title", "")));
    }

    #[test]
    fn test_combinators_and_extension() {
        let descriptor = descriptor();
        let doc = record(json!({"ID": "a", "Views": 5}));
        let ext = record(json!({"color": "red"}));
        let check = |filter: FilterNode| evaluate(&filter, &descriptor, &doc, Some(&ext)).unwrap();

        assert!(check(FilterNode::all()));
        assert!(!check(FilterNode::none()));
        assert!(check(FilterNode::not(FilterNode::none())));
        assert!(check(FilterNode::or([
            FilterNode::eq("Views", 1),
            FilterNode::eq(AttrRef::extended("color"), "red"),
        ])));
        assert!(!check(FilterNode::and([
            FilterNode::eq("Views", 5),
            FilterNode::not(FilterNode::eq(AttrRef::extended("color"), "red")),
        ])));
    }
}
