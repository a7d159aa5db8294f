use crate::core::value::{native_date_to_text, text_to_native_date};
use crate::core::{DeclaredType, EncodingKind, MapperError, Result};
use crate::store::ID_FIELD;
use serde_json::Value as JsonValue;

/// Column-level options carried by a mapping annotation.
///
/// Every field is optional so that several annotations on one member can be
/// merged: the primary-key annotation wins over the general mapped-member
/// annotation, which wins over defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    pub column: Option<String>,
    pub not_null: Option<bool>,
    pub not_empty: Option<bool>,
    pub max_length: Option<usize>,
    pub large_object: Option<bool>,
}

impl ColumnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = Some(true);
        self
    }

    pub fn not_empty(mut self) -> Self {
        self.not_empty = Some(true);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn large_object(mut self) -> Self {
        self.large_object = Some(true);
        self
    }

    /// Field-wise `self` over `lower`.
    pub fn merged_over(&self, lower: &ColumnOptions) -> ColumnOptions {
        ColumnOptions {
            column: self.column.clone().or_else(|| lower.column.clone()),
            not_null: self.not_null.or(lower.not_null),
            not_empty: self.not_empty.or(lower.not_empty),
            max_length: self.max_length.or(lower.max_length),
            large_object: self.large_object.or(lower.large_object),
        }
    }
}

/// Index participation of a sortable member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortableIndex {
    pub index_name: Option<String>,
    pub unique_index_name: Option<String>,
}

/// Declared metadata for one member, as produced by `#[derive(Entity)]` or built by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub member: String,
    pub declared_type: DeclaredType,
    pub primary_key: Option<ColumnOptions>,
    pub mapped: Option<ColumnOptions>,
    pub sortable: Option<SortableIndex>,
    pub searchable: bool,
    pub ignored: bool,
    pub ignored_if_null: bool,
    pub json_encoded: bool,
    pub string_encoded_date: bool,
}

impl AttributeDef {
    pub fn new(member: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            member: member.into(),
            declared_type,
            primary_key: None,
            mapped: None,
            sortable: None,
            searchable: false,
            ignored: false,
            ignored_if_null: false,
            json_encoded: false,
            string_encoded_date: false,
        }
    }

    pub fn primary_key(self) -> Self {
        self.primary_key_with(ColumnOptions::default())
    }

    pub fn primary_key_with(mut self, options: ColumnOptions) -> Self {
        self.primary_key = Some(options);
        self
    }

    pub fn mapped(mut self, options: ColumnOptions) -> Self {
        self.mapped = Some(options);
        self
    }

    fn mapped_mut(&mut self) -> &mut ColumnOptions {
        self.mapped.get_or_insert_with(ColumnOptions::default)
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.mapped_mut().column = Some(column.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.mapped_mut().not_null = Some(true);
        self
    }

    pub fn not_empty(mut self) -> Self {
        self.mapped_mut().not_empty = Some(true);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.mapped_mut().max_length = Some(max);
        self
    }

    pub fn large_object(mut self) -> Self {
        self.mapped_mut().large_object = Some(true);
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable.get_or_insert_with(SortableIndex::default);
        self
    }

    /// Sortable and part of the named ascending index.
    pub fn indexed(mut self, index_name: impl Into<String>) -> Self {
        self.sortable
            .get_or_insert_with(SortableIndex::default)
            .index_name = Some(index_name.into());
        self
    }

    /// Sortable and part of the named unique index.
    pub fn unique_indexed(mut self, index_name: impl Into<String>) -> Self {
        self.sortable
            .get_or_insert_with(SortableIndex::default)
            .unique_index_name = Some(index_name.into());
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn ignore_if_null(mut self) -> Self {
        self.ignored_if_null = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_encoded = true;
        self
    }

    pub fn date_as_string(mut self) -> Self {
        self.string_encoded_date = true;
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }
}

/// Resolved, immutable metadata for one mapped member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    name: String,
    declared_type: DeclaredType,
    column: String,
    primary_key: bool,
    not_null: bool,
    not_empty: bool,
    max_length: Option<usize>,
    large_object: bool,
    json_encoded: bool,
    string_encoded_date: bool,
    sortable: Option<SortableIndex>,
    searchable: bool,
    ignored_if_null: bool,
    encoding: EncodingKind,
}

impl AttributeDescriptor {
    /// Merge the annotations of `def` into a descriptor.
    pub fn resolve(def: &AttributeDef) -> Result<Self> {
        let defaults = ColumnOptions::default();
        let mapped = def.mapped.as_ref().unwrap_or(&defaults);
        let options = match &def.primary_key {
            Some(pk) => pk.merged_over(mapped),
            None => mapped.clone(),
        };
        let is_pk = def.primary_key.is_some();

        if def.string_encoded_date && !is_date_like(&def.declared_type) {
            return Err(MapperError::SchemaError(format!(
                "Member '{}' is marked as a string-encoded date but is declared as {}",
                def.member, def.declared_type
            )));
        }
        if options.max_length == Some(0) {
            return Err(MapperError::SchemaError(format!(
                "Member '{}' declares a maximum length of zero",
                def.member
            )));
        }

        let column = options
            .column
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| def.member.clone());

        Ok(Self {
            name: def.member.clone(),
            declared_type: def.declared_type.clone(),
            column,
            primary_key: is_pk,
            not_null: options.not_null.unwrap_or(is_pk),
            not_empty: options.not_empty.unwrap_or(false),
            max_length: options.max_length,
            large_object: options.large_object.unwrap_or(false),
            json_encoded: def.json_encoded,
            string_encoded_date: def.string_encoded_date,
            sortable: if is_pk {
                Some(def.sortable.clone().unwrap_or_default())
            } else {
                def.sortable.clone()
            },
            searchable: def.searchable,
            ignored_if_null: def.ignored_if_null && !is_pk,
            encoding: EncodingKind::resolve(&def.declared_type, def.json_encoded),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &DeclaredType {
        &self.declared_type
    }

    /// Storage column; defaults to the member name.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Field name inside a stored document. The primary key lives in `_id`.
    pub fn document_field(&self) -> &str {
        if self.primary_key { ID_FIELD } else { &self.column }
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn is_not_empty(&self) -> bool {
        self.not_empty
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    pub fn is_large_object(&self) -> bool {
        self.large_object
    }

    pub fn is_json_encoded(&self) -> bool {
        self.json_encoded
    }

    pub fn is_string_encoded_date(&self) -> bool {
        self.string_encoded_date
    }

    /// Members stored as the native date type.
    pub fn is_native_date(&self) -> bool {
        !self.string_encoded_date && !self.json_encoded && is_date_like(&self.declared_type)
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable.is_some()
    }

    pub fn sortable(&self) -> Option<&SortableIndex> {
        self.sortable.as_ref()
    }

    pub fn index_name(&self) -> Option<&str> {
        self.sortable.as_ref()?.index_name.as_deref()
    }

    pub fn unique_index_name(&self) -> Option<&str> {
        self.sortable.as_ref()?.unique_index_name.as_deref()
    }

    pub fn is_searchable(&self) -> bool {
        self.searchable
    }

    pub fn is_ignored_if_null(&self) -> bool {
        self.ignored_if_null
    }

    pub fn encoding(&self) -> EncodingKind {
        self.encoding
    }

    /// Store form of a member value: JSON-encoded members become text, dates
    /// become the native date wrapper unless string-encoded.
    ///
    /// Native dates keep millisecond precision. Sub-millisecond digits are
    /// dropped, so such a value does not read back equal; use `date_as_string`
    /// when full precision matters.
    pub fn encode_value(&self, value: &JsonValue) -> JsonValue {
        if value.is_null() {
            return JsonValue::Null;
        }
        if self.json_encoded {
            return JsonValue::String(value.to_string());
        }
        if self.is_native_date() {
            return match value {
                JsonValue::Array(items) => {
                    JsonValue::Array(items.iter().map(text_to_native_date).collect())
                }
                other => text_to_native_date(other),
            };
        }
        value.clone()
    }

    /// Inverse of [`encode_value`](Self::encode_value).
    pub fn decode_value(&self, stored: &JsonValue) -> Result<JsonValue> {
        if self.json_encoded {
            return match stored {
                JsonValue::String(text) => Ok(serde_json::from_str(text)?),
                other => Ok(other.clone()),
            };
        }
        if self.is_native_date() {
            return Ok(match stored {
                JsonValue::Array(items) => {
                    JsonValue::Array(items.iter().map(native_date_to_text).collect())
                }
                other => native_date_to_text(other),
            });
        }
        Ok(stored.clone())
    }

    /// Check declared constraints against the member value of an entity being written.
    pub fn validate(&self, value: Option<&JsonValue>) -> Result<()> {
        let value = value.unwrap_or(&JsonValue::Null);

        if value.is_null() {
            if self.not_null || self.not_empty {
                return Err(MapperError::precondition(format!(
                    "Attribute '{}' cannot be null",
                    self.name
                )));
            }
            return Ok(());
        }

        let length = match value {
            JsonValue::String(s) => Some(s.chars().count()),
            JsonValue::Array(items) => Some(items.len()),
            _ => None,
        };

        if self.not_empty && length == Some(0) {
            return Err(MapperError::precondition(format!(
                "Attribute '{}' cannot be empty",
                self.name
            )));
        }

        if let (Some(max), Some(actual)) = (self.max_length, length) {
            if actual > max {
                return Err(MapperError::precondition(format!(
                    "Attribute '{}' exceeds maximum length {} (got {})",
                    self.name, max, actual
                )));
            }
        }

        Ok(())
    }
}

fn is_date_like(declared: &DeclaredType) -> bool {
    match declared {
        DeclaredType::DateTime => true,
        DeclaredType::Array(inner) => is_date_like(inner),
        _ => false,
    }
}
