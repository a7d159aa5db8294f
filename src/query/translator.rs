//! Compiles filter trees and sort specs into store-native form.
//!
//! Document targets get a Mongo-style filter document:
//!
//! ```text
//! AND(Status = "Published", Views > 100)
//!   => {"$and": [{"Status": {"$eq": "Published"}}, {"Views": {"$gt": 100}}]}
//! ```
//!
//! Relational targets get a parenthesized `WHERE` fragment with one named
//! parameter per leaf.

use super::filter::{FilterLeaf, FilterNode, FilterOperator};
use super::sort::{SortDirection, SortSpec};
use crate::core::{Document, MapperError, Result};
use crate::schema::{AttributeDescriptor, EntityDescriptor};
use crate::store::AdapterConfig;
use serde_json::{Value as JsonValue, json};
use std::collections::HashSet;

/// Native document ordering: (field, direction) pairs, most significant first.
pub type DocumentSort = Vec<(String, SortDirection)>;

/// Named parameter carrying the scope identifier in SQL output.
pub const SQL_SCOPE_PARAMETER: &str = "@scope";

/// Relational filter: `WHERE` text plus its named parameters, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFilter {
    pub where_text: String,
    pub parameters: Vec<(String, JsonValue)>,
}

impl SqlFilter {
    pub fn parameter(&self, name: &str) -> Option<&JsonValue> {
        self.parameters
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }
}

/// What a filter leaf points at after resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LeafTarget<'a> {
    Attribute(&'a AttributeDescriptor),
    Extended(&'a str),
}

/// Resolve the leaf attribute and check the value shape for its operator.
pub(crate) fn resolve_leaf<'a>(
    leaf: &'a FilterLeaf,
    descriptor: &'a EntityDescriptor,
) -> Result<LeafTarget<'a>> {
    let target = if leaf.attribute.is_extended() {
        if !descriptor.is_extendable() {
            return Err(MapperError::precondition(format!(
                "Entity '{}' is not extendable; cannot filter on extended property '{}'",
                descriptor.owner_type(),
                leaf.attribute.name()
            )));
        }
        LeafTarget::Extended(leaf.attribute.name())
    } else {
        let attr = descriptor
            .resolve_attribute(leaf.attribute.name())
            .ok_or_else(|| {
                MapperError::precondition(format!(
                    "Entity '{}' has no attribute '{}'",
                    descriptor.owner_type(),
                    leaf.attribute.name()
                ))
            })?;
        LeafTarget::Attribute(attr)
    };

    if leaf.operator == FilterOperator::In && !leaf.value.is_array() {
        return Err(MapperError::precondition(format!(
            "Operator 'in' on '{}' requires an array value",
            leaf.attribute
        )));
    }
    if leaf.operator.is_pattern() && !leaf.value.is_string() {
        return Err(MapperError::precondition(format!(
            "Operator '{}' on '{}' requires a text value",
            leaf.operator, leaf.attribute
        )));
    }

    Ok(target)
}

/// Store form of a comparison value. Pattern operands stay raw text.
pub(crate) fn encode_operand(
    target: LeafTarget<'_>,
    operator: FilterOperator,
    value: &JsonValue,
) -> JsonValue {
    match (target, operator) {
        (LeafTarget::Extended(_), _) => value.clone(),
        (_, op) if op.is_pattern() => value.clone(),
        (LeafTarget::Attribute(attr), FilterOperator::In) => match value {
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|item| attr.encode_value(item)).collect())
            }
            other => attr.encode_value(other),
        },
        (LeafTarget::Attribute(attr), _) => attr.encode_value(value),
    }
}

#[derive(Debug, Clone)]
pub struct QueryTranslator {
    scope_field: String,
    extended_field: String,
}

impl Default for QueryTranslator {
    fn default() -> Self {
        Self::from_config(&AdapterConfig::default())
    }
}

impl QueryTranslator {
    pub fn new(scope_field: impl Into<String>, extended_field: impl Into<String>) -> Self {
        Self {
            scope_field: scope_field.into(),
            extended_field: extended_field.into(),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(&config.scope_attribute, &config.extended_field)
    }

    pub fn scope_field(&self) -> &str {
        &self.scope_field
    }

    pub fn extended_field(&self) -> &str {
        &self.extended_field
    }

    // ========================================
    // Document targets
    // ========================================

    /// Compile `filter` into a native document filter.
    ///
    /// With a `scope`, the whole expression is conjoined with an equality on
    /// the scope field.
    pub fn compile_document(
        &self,
        filter: &FilterNode,
        descriptor: &EntityDescriptor,
        scope: Option<&JsonValue>,
    ) -> Result<Document> {
        let compiled = self.document_node(filter, descriptor)?;
        Ok(match scope {
            Some(scope) => {
                let mut scope_condition = Document::new();
                scope_condition.insert(self.scope_field.clone(), json!({ "$eq": scope }));
                as_document(json!({ "$and": [compiled, scope_condition] }))
            }
            None => compiled,
        })
    }

    fn document_node(&self, node: &FilterNode, descriptor: &EntityDescriptor) -> Result<Document> {
        match node {
            FilterNode::Leaf(leaf) => self.document_leaf(leaf, descriptor),
            FilterNode::And(children) if children.is_empty() => Ok(Document::new()),
            FilterNode::Or(children) if children.is_empty() => {
                Ok(as_document(json!({ "$nor": [{}] })))
            }
            FilterNode::And(children) => Ok(as_document(json!({
                "$and": self.document_children(children, descriptor)?
            }))),
            FilterNode::Or(children) => Ok(as_document(json!({
                "$or": self.document_children(children, descriptor)?
            }))),
            FilterNode::Not(child) => Ok(as_document(json!({
                "$nor": [self.document_node(child, descriptor)?]
            }))),
        }
    }

    fn document_children(
        &self,
        children: &[FilterNode],
        descriptor: &EntityDescriptor,
    ) -> Result<Vec<JsonValue>> {
        children
            .iter()
            .map(|child| Ok(JsonValue::Object(self.document_node(child, descriptor)?)))
            .collect()
    }

    fn document_leaf(&self, leaf: &FilterLeaf, descriptor: &EntityDescriptor) -> Result<Document> {
        let target = resolve_leaf(leaf, descriptor)?;
        let field = match target {
            LeafTarget::Attribute(attr) => attr.document_field().to_string(),
            LeafTarget::Extended(name) => format!("{}.{}", self.extended_field, name),
        };
        let operand = encode_operand(target, leaf.operator, &leaf.value);

        let condition = match leaf.operator {
            FilterOperator::Equals => json!({ "$eq": operand }),
            FilterOperator::NotEquals => json!({ "$ne": operand }),
            FilterOperator::GreaterThan => json!({ "$gt": operand }),
            FilterOperator::GreaterThanOrEqual => json!({ "$gte": operand }),
            FilterOperator::LessThan => json!({ "$lt": operand }),
            FilterOperator::LessThanOrEqual => json!({ "$lte": operand }),
            FilterOperator::Contains => json!({ "$regex": regex::escape(text(&operand)) }),
            FilterOperator::StartsWith => {
                json!({ "$regex": format!("^{}", regex::escape(text(&operand))) })
            }
            FilterOperator::EndsWith => {
                json!({ "$regex": format!("{}$", regex::escape(text(&operand))) })
            }
            FilterOperator::In => json!({ "$in": operand }),
            FilterOperator::IsNull => json!({ "$eq": null }),
        };

        let mut document = Document::new();
        document.insert(field, condition);
        Ok(document)
    }

    // ========================================
    // Relational targets
    // ========================================

    pub fn compile_sql(
        &self,
        filter: &FilterNode,
        descriptor: &EntityDescriptor,
        scope: Option<&JsonValue>,
    ) -> Result<SqlFilter> {
        let mut parameters = Vec::new();
        let mut where_text = self.sql_node(filter, descriptor, &mut parameters)?;

        if let Some(scope) = scope {
            where_text = format!(
                "({}) AND {} = {}",
                where_text,
                quote_identifier(&self.scope_field),
                SQL_SCOPE_PARAMETER
            );
            parameters.push((SQL_SCOPE_PARAMETER.to_string(), scope.clone()));
        }

        Ok(SqlFilter {
            where_text,
            parameters,
        })
    }

    fn sql_node(
        &self,
        node: &FilterNode,
        descriptor: &EntityDescriptor,
        parameters: &mut Vec<(String, JsonValue)>,
    ) -> Result<String> {
        match node {
            FilterNode::Leaf(leaf) => self.sql_leaf(leaf, descriptor, parameters),
            FilterNode::And(children) if children.is_empty() => Ok("1=1".to_string()),
            FilterNode::Or(children) if children.is_empty() => Ok("1=0".to_string()),
            FilterNode::And(children) | FilterNode::Or(children) => {
                let keyword = if matches!(node, FilterNode::And(_)) { " AND " } else { " OR " };
                let parts = children
                    .iter()
                    .map(|child| self.sql_node(child, descriptor, parameters))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(keyword)))
            }
            FilterNode::Not(child) => {
                Ok(format!("NOT ({})", self.sql_node(child, descriptor, parameters)?))
            }
        }
    }

    fn sql_leaf(
        &self,
        leaf: &FilterLeaf,
        descriptor: &EntityDescriptor,
        parameters: &mut Vec<(String, JsonValue)>,
    ) -> Result<String> {
        let target = resolve_leaf(leaf, descriptor)?;
        let column = match target {
            LeafTarget::Attribute(attr) => quote_identifier(attr.column()),
            LeafTarget::Extended(name) => format!(
                "JSON_VALUE({}, '$.{}')",
                quote_identifier(&self.extended_field),
                name.replace('\'', "''")
            ),
        };

        // relational stores bind dates natively, only JSON-encoded members change shape
        let operand = match target {
            LeafTarget::Attribute(attr) if attr.is_json_encoded() && !leaf.operator.is_pattern() => {
                encode_operand(target, leaf.operator, &leaf.value)
            }
            _ => leaf.value.clone(),
        };

        let name = format!("@p{}", parameters.len());
        let (clause, bound) = match leaf.operator {
            FilterOperator::Equals => (format!("{} = {}", column, name), operand),
            FilterOperator::NotEquals => (format!("{} <> {}", column, name), operand),
            FilterOperator::GreaterThan => (format!("{} > {}", column, name), operand),
            FilterOperator::GreaterThanOrEqual => (format!("{} >= {}", column, name), operand),
            FilterOperator::LessThan => (format!("{} < {}", column, name), operand),
            FilterOperator::LessThanOrEqual => (format!("{} <= {}", column, name), operand),
            FilterOperator::In => (format!("{} IN ({})", column, name), operand),
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
                let escaped = escape_like(text(&operand));
                let pattern = match leaf.operator {
                    FilterOperator::StartsWith => format!("{}%", escaped),
                    FilterOperator::EndsWith => format!("%{}", escaped),
                    _ => format!("%{}%", escaped),
                };
                (
                    format!("{} LIKE {} ESCAPE '\\'", column, name),
                    JsonValue::String(pattern),
                )
            }
            FilterOperator::IsNull => return Ok(format!("{} IS NULL", column)),
        };
        parameters.push((name, bound));
        Ok(clause)
    }

    // ========================================
    // Sorting
    // ========================================

    /// Native document ordering for `spec`.
    ///
    /// `None` stays `None`. An empty spec means primary key ascending, and the
    /// primary key is appended as the final tie-breaker when missing.
    pub fn compile_sort(
        &self,
        spec: Option<&SortSpec>,
        descriptor: &EntityDescriptor,
    ) -> Result<Option<DocumentSort>> {
        Ok(resolve_sort(spec, descriptor)?.map(|keys| {
            keys.into_iter()
                .map(|(attr, direction)| (attr.document_field().to_string(), direction))
                .collect()
        }))
    }

    /// `ORDER BY` body for `spec`, same defaulting rules as [`compile_sort`](Self::compile_sort).
    pub fn compile_sql_sort(
        &self,
        spec: Option<&SortSpec>,
        descriptor: &EntityDescriptor,
    ) -> Result<Option<String>> {
        Ok(resolve_sort(spec, descriptor)?.map(|keys| {
            keys.into_iter()
                .map(|(attr, direction)| {
                    format!("{} {}", quote_identifier(attr.column()), direction.sql_keyword())
                })
                .collect::<Vec<_>>()
                .join(", ")
        }))
    }
}

fn resolve_sort<'a>(
    spec: Option<&SortSpec>,
    descriptor: &'a EntityDescriptor,
) -> Result<Option<Vec<(&'a AttributeDescriptor, SortDirection)>>> {
    let Some(spec) = spec else {
        return Ok(None);
    };

    let mut keys = Vec::with_capacity(spec.keys().len() + 1);
    let mut seen = HashSet::new();
    for key in spec.keys() {
        let attr = descriptor
            .resolve_attribute(&key.attribute)
            .filter(|attr| attr.is_primary_key() || attr.is_sortable())
            .ok_or_else(|| {
                MapperError::precondition(format!(
                    "Attribute '{}' of entity '{}' is not sortable",
                    key.attribute,
                    descriptor.owner_type()
                ))
            })?;
        if seen.insert(attr.name()) {
            keys.push((attr, key.direction));
        }
    }

    let primary_key = descriptor.primary_key();
    if !seen.contains(primary_key.name()) {
        keys.push((primary_key, SortDirection::Ascending));
    }
    Ok(Some(keys))
}

fn as_document(value: JsonValue) -> Document {
    match value {
        JsonValue::Object(map) => map,
        _ => Document::new(),
    }
}

fn text(value: &JsonValue) -> &str {
    value.as_str().unwrap_or_default()
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
