//! Entity <-> stored document mapping driven by the entity descriptor.

use super::config::AdapterConfig;
use crate::core::{Document, EncodingKind, MapperError, Result};
use crate::schema::{AttributeDescriptor, Entity, EntityDescriptor};
use serde_json::Value as JsonValue;

pub struct DocumentCodec<'a> {
    descriptor: &'a EntityDescriptor,
    config: &'a AdapterConfig,
}

impl<'a> DocumentCodec<'a> {
    pub fn new(descriptor: &'a EntityDescriptor, config: &'a AdapterConfig) -> Self {
        Self { descriptor, config }
    }

    /// Serialize an entity into its member-keyed JSON form.
    pub fn to_record<T: Entity>(&self, entity: &T) -> Result<Document> {
        match serde_json::to_value(entity)? {
            JsonValue::Object(record) => Ok(record),
            JsonValue::Null => Err(MapperError::precondition(format!(
                "Entity '{}' cannot be null",
                self.descriptor.owner_type()
            ))),
            other => Err(MapperError::EncodingError(format!(
                "Entity '{}' must serialize to an object, got {}",
                self.descriptor.owner_type(),
                kind_of(&other)
            ))),
        }
    }

    /// Validate and encode every mapped member of `entity`.
    pub fn encode<T: Entity>(&self, entity: &T) -> Result<Document> {
        let record = self.to_record(entity)?;
        self.encode_record(&record)
    }

    pub fn encode_record(&self, record: &Document) -> Result<Document> {
        let mut document = Document::new();
        for attr in self.descriptor.attributes() {
            let value = record.get(attr.name());
            attr.validate(value)?;
            match value {
                None | Some(JsonValue::Null) if attr.is_ignored_if_null() => {}
                _ => {
                    document.insert(
                        attr.document_field().to_string(),
                        self.encode_member(attr, value.unwrap_or(&JsonValue::Null)),
                    );
                }
            }
        }

        if self.descriptor.is_extendable() {
            if let Some(extension) = record.get(&self.config.extended_field) {
                if !extension.is_null() {
                    document.insert(self.config.extended_field.clone(), extension.clone());
                }
            }
        }

        Ok(document)
    }

    /// Store form of one member value.
    pub fn encode_member(&self, attr: &AttributeDescriptor, value: &JsonValue) -> JsonValue {
        match (attr.encoding(), value) {
            (EncodingKind::ObjectArray, JsonValue::Array(items)) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.strip_discriminators(item))
                    .collect(),
            ),
            _ => attr.encode_value(value),
        }
    }

    fn strip_discriminators(&self, item: &JsonValue) -> JsonValue {
        match item {
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .filter(|(key, _)| !self.config.discriminator_keys.contains(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Member-keyed record from a stored document. Only fields present in the
    /// document are returned.
    pub fn decode_fields(&self, document: &Document) -> Result<Document> {
        let mut record = Document::new();
        for attr in self.descriptor.attributes() {
            if let Some(stored) = document.get(attr.document_field()) {
                record.insert(attr.name().to_string(), attr.decode_value(stored)?);
            }
        }
        if self.descriptor.is_extendable() {
            if let Some(extension) = document.get(&self.config.extended_field) {
                record.insert(self.config.extended_field.clone(), extension.clone());
            }
        }
        Ok(record)
    }

    pub fn decode<T: Entity>(&self, document: &Document) -> Result<T> {
        let mut record = self.decode_fields(document)?;
        for attr in self.descriptor.attributes() {
            record
                .entry(attr.name().to_string())
                .or_insert(JsonValue::Null);
        }
        serde_json::from_value(JsonValue::Object(record)).map_err(|e| {
            MapperError::EncodingError(format!(
                "Cannot decode '{}' document: {}",
                self.descriptor.owner_type(),
                e
            ))
        })
    }

    /// Stored primary key of an entity record; must be present and non-null.
    pub fn primary_key_value(&self, record: &Document) -> Result<JsonValue> {
        let pk = self.descriptor.primary_key();
        match record.get(pk.name()) {
            Some(value) if !value.is_null() => Ok(pk.encode_value(value)),
            _ => Err(MapperError::precondition(format!(
                "Primary key '{}' of '{}' is not set",
                pk.name(),
                self.descriptor.owner_type()
            ))),
        }
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
