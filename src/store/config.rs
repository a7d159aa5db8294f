use serde::{Deserialize, Serialize};

/// Document-store adapter configuration
///
/// Every field has a working default, so hosts only set what they change:
///
/// ```ignore
/// let config = AdapterConfig::default()
///     .scope_attribute("tenant")
///     .index_prefix("IX");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Document field holding the scope identifier of multiplexed entities
    pub scope_attribute: String,

    /// Document field holding the extended properties of extendable entities
    pub extended_field: String,

    /// First segment of derived index names (`IDX_Article_ByTitle`)
    pub index_prefix: String,

    /// Last segment of the text index name (`IDX_Article_Text`)
    pub text_index_suffix: String,

    /// Polymorphism discriminator keys stripped from object-array elements
    pub discriminator_keys: Vec<String>,

    /// Materialize the collection before building its indexes
    pub ensure_collection: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            scope_attribute: "_scope".to_string(),
            extended_field: "_ext".to_string(),
            index_prefix: "IDX".to_string(),
            text_index_suffix: "Text".to_string(),
            discriminator_keys: vec!["_t".to_string(), "$type".to_string()],
            ensure_collection: true,
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scope field name
    pub fn scope_attribute(mut self, field: &str) -> Self {
        self.scope_attribute = field.to_string();
        self
    }

    /// Set the extended properties field name
    pub fn extended_field(mut self, field: &str) -> Self {
        self.extended_field = field.to_string();
        self
    }

    /// Set the index name prefix
    pub fn index_prefix(mut self, prefix: &str) -> Self {
        self.index_prefix = prefix.to_string();
        self
    }

    /// Set the text index suffix
    pub fn text_index_suffix(mut self, suffix: &str) -> Self {
        self.text_index_suffix = suffix.to_string();
        self
    }

    /// Replace the discriminator keys
    pub fn discriminator_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discriminator_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable collection materialization before index builds
    pub fn ensure_collection(mut self, enabled: bool) -> Self {
        self.ensure_collection = enabled;
        self
    }

    pub fn index_name(&self, entity: &str, name: &str) -> String {
        format!("{}_{}_{}", self.index_prefix, entity, name)
    }

    pub fn text_index_name(&self, entity: &str) -> String {
        self.index_name(entity, &self.text_index_suffix)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.scope_attribute.is_empty() {
            return Err("scope_attribute cannot be empty".to_string());
        }

        if self.extended_field.is_empty() {
            return Err("extended_field cannot be empty".to_string());
        }

        if self.scope_attribute == self.extended_field {
            return Err("scope_attribute and extended_field must differ".to_string());
        }

        for field in [&self.scope_attribute, &self.extended_field] {
            if field.contains('.') || field.starts_with('$') {
                return Err(format!("'{}' is not a valid document field name", field));
            }
        }

        if self.index_prefix.is_empty() || self.text_index_suffix.is_empty() {
            return Err("index name segments cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_names() {
        let config = AdapterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.index_name("Article", "ByTitle"), "IDX_Article_ByTitle");
        assert_eq!(config.text_index_name("Article"), "IDX_Article_Text");
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        assert!(AdapterConfig::new().scope_attribute("").validate().is_err());
        assert!(AdapterConfig::new().extended_field("_scope").validate().is_err());
        assert!(AdapterConfig::new().extended_field("a.b").validate().is_err());
        assert!(AdapterConfig::new().index_prefix("").validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AdapterConfig =
            serde_json::from_str(r#"{"index_prefix": "IX", "ensure_collection": false}"#).unwrap();
        assert_eq!(config.index_prefix, "IX");
        assert!(!config.ensure_collection);
        assert_eq!(config.scope_attribute, "_scope");
    }
}
