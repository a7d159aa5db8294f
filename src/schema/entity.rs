use super::attribute::{AttributeDef, AttributeDescriptor};
use super::repository::{RepositoryModule, RepositoryRef};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A concrete business type with a registration-time descriptor table.
///
/// Usually implemented by `#[derive(Entity)]`. The serialized field names of
/// the type must match the member names in [`EntityDef`].
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn entity_def() -> EntityDef;
}

/// Data-source names bound to an entity or supplied by its repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSourceBindings {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub version: Option<String>,
    pub trash: Option<String>,
    pub sync: Option<String>,
}

impl DataSourceBindings {
    /// Field-wise `self` over repository `defaults`.
    pub fn inherit(&self, defaults: &DataSourceBindings) -> DataSourceBindings {
        DataSourceBindings {
            primary: self.primary.clone().or_else(|| defaults.primary.clone()),
            secondary: self.secondary.clone().or_else(|| defaults.secondary.clone()),
            version: self.version.clone().or_else(|| defaults.version.clone()),
            trash: self.trash.clone().or_else(|| defaults.trash.clone()),
            sync: self.sync.clone().or_else(|| defaults.sync.clone()),
        }
    }
}

/// Resolved data-source names of a registered entity. The primary is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceNames {
    pub primary: String,
    pub secondary: Option<String>,
    pub version: Option<String>,
    pub trash: Option<String>,
    pub sync: Option<String>,
}

impl DataSourceNames {
    pub fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(
            [&self.secondary, &self.version, &self.trash, &self.sync]
                .into_iter()
                .filter_map(|name| name.as_deref()),
        )
    }
}

/// Reference to an external cache region. Caching itself happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBinding {
    pub region: String,
    pub ttl_seconds: Option<u64>,
}

impl CacheBinding {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ttl_seconds: None,
        }
    }

    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentAssociation {
    pub parent_type: String,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageTarget {
    Table(String),
    Collection(String),
}

impl StorageTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Table(name) | Self::Collection(name) => name,
        }
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(name) => write!(f, "table '{}'", name),
            Self::Collection(name) => write!(f, "collection '{}'", name),
        }
    }
}

/// Declared metadata for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    pub name: String,
    pub table_name: Option<String>,
    pub collection_name: Option<String>,
    pub attributes: Vec<AttributeDef>,
    pub extendable: bool,
    pub parents: Vec<ParentAssociation>,
    pub repository: Option<RepositoryRef>,
    pub data_sources: DataSourceBindings,
    pub cache: Option<CacheBinding>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            collection_name: None,
            attributes: Vec::new(),
            extendable: false,
            parents: Vec::new(),
            repository: None,
            data_sources: DataSourceBindings::default(),
            cache: None,
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn extendable(mut self) -> Self {
        self.extendable = true;
        self
    }

    pub fn parent(mut self, parent_type: impl Into<String>, property: impl Into<String>) -> Self {
        self.parents.push(ParentAssociation {
            parent_type: parent_type.into(),
            property: property.into(),
        });
        self
    }

    pub fn repository<R: RepositoryModule>(mut self) -> Self {
        self.repository = Some(RepositoryRef::of::<R>());
        self
    }

    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.primary = Some(name.into());
        self
    }

    pub fn secondary_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.secondary = Some(name.into());
        self
    }

    pub fn version_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.version = Some(name.into());
        self
    }

    pub fn trash_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.trash = Some(name.into());
        self
    }

    pub fn sync_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.sync = Some(name.into());
        self
    }

    pub fn cache(mut self, binding: CacheBinding) -> Self {
        self.cache = Some(binding);
        self
    }
}

/// Structural part of an entity descriptor. Never changes after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityShape {
    pub(crate) owner_type: String,
    pub(crate) rust_type: &'static str,
    pub(crate) storage: StorageTarget,
    pub(crate) primary_key: String,
    pub(crate) attributes: Vec<AttributeDescriptor>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_column: HashMap<String, usize>,
    pub(crate) sortable: Vec<String>,
    pub(crate) ignored_members: Vec<String>,
    pub(crate) extendable: bool,
    pub(crate) parents: Vec<ParentAssociation>,
    pub(crate) repository: Option<String>,
}

/// Resolved, immutable metadata for one entity type.
///
/// Cloning is cheap: the structural shape is shared. Only the data-source and
/// cache bindings differ between versions of a descriptor produced by
/// settings updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    shape: Arc<EntityShape>,
    data_sources: DataSourceNames,
    cache: Option<CacheBinding>,
}

impl EntityDescriptor {
    pub(crate) fn new(
        shape: EntityShape,
        data_sources: DataSourceNames,
        cache: Option<CacheBinding>,
    ) -> Self {
        Self {
            shape: Arc::new(shape),
            data_sources,
            cache,
        }
    }

    /// Same structure, new bindings.
    pub(crate) fn rebind(
        &self,
        data_sources: DataSourceNames,
        cache: Option<CacheBinding>,
    ) -> Self {
        Self {
            shape: Arc::clone(&self.shape),
            data_sources,
            cache,
        }
    }

    pub fn owner_type(&self) -> &str {
        &self.shape.owner_type
    }

    pub fn rust_type(&self) -> &'static str {
        self.shape.rust_type
    }

    pub fn storage(&self) -> &StorageTarget {
        &self.shape.storage
    }

    pub fn storage_name(&self) -> &str {
        self.shape.storage.name()
    }

    pub fn table_name(&self) -> Option<&str> {
        match &self.shape.storage {
            StorageTarget::Table(name) => Some(name),
            StorageTarget::Collection(_) => None,
        }
    }

    pub fn collection_name(&self) -> Option<&str> {
        match &self.shape.storage {
            StorageTarget::Collection(name) => Some(name),
            StorageTarget::Table(_) => None,
        }
    }

    pub fn primary_key_name(&self) -> &str {
        &self.shape.primary_key
    }

    pub fn primary_key(&self) -> &AttributeDescriptor {
        // registration guarantees the primary key is present
        &self.shape.attributes[self.shape.by_name[&self.shape.primary_key]]
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.shape.attributes
    }

    /// Look up by member name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.shape
            .by_name
            .get(name)
            .map(|&idx| &self.shape.attributes[idx])
    }

    /// Look up by member name, falling back to the storage column.
    pub fn resolve_attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attribute(name).or_else(|| {
            self.shape
                .by_column
                .get(name)
                .map(|&idx| &self.shape.attributes[idx])
        })
    }

    /// Look up by stored document field (`_id` for the primary key).
    pub fn attribute_by_document_field(&self, field: &str) -> Option<&AttributeDescriptor> {
        self.shape
            .attributes
            .iter()
            .find(|attr| attr.document_field() == field)
    }

    pub fn sortable_attribute_names(&self) -> &[String] {
        &self.shape.sortable
    }

    pub fn is_sortable(&self, name: &str) -> bool {
        self.resolve_attribute(name)
            .is_some_and(|attr| attr.is_primary_key() || attr.is_sortable())
    }

    pub fn searchable_attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.shape.attributes.iter().filter(|attr| attr.is_searchable())
    }

    pub fn ignored_members(&self) -> &[String] {
        &self.shape.ignored_members
    }

    pub fn is_extendable(&self) -> bool {
        self.shape.extendable
    }

    pub fn parents(&self) -> &[ParentAssociation] {
        &self.shape.parents
    }

    pub fn parent_type(&self) -> Option<&str> {
        self.shape.parents.first().map(|p| p.parent_type.as_str())
    }

    pub fn parent_association_property(&self) -> Option<&str> {
        self.shape.parents.first().map(|p| p.property.as_str())
    }

    pub fn is_multi_parent(&self) -> bool {
        self.shape.parents.len() > 1
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.shape.repository.as_deref()
    }

    pub fn data_sources(&self) -> &DataSourceNames {
        &self.data_sources
    }

    pub fn cache(&self) -> Option<&CacheBinding> {
        self.cache.as_ref()
    }

    /// True when both descriptors share one structural shape allocation.
    pub fn shares_shape_with(&self, other: &EntityDescriptor) -> bool {
        Arc::ptr_eq(&self.shape, &other.shape)
    }
}
