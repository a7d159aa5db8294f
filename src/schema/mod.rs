//! Entity metadata: declared definitions, resolved descriptors and the registry.

pub mod attribute;
pub mod entity;
pub mod registry;
pub mod repository;
pub mod settings;

pub use attribute::{AttributeDef, AttributeDescriptor, ColumnOptions, SortableIndex};
pub use entity::{
    CacheBinding, DataSourceBindings, DataSourceNames, Entity, EntityDef, EntityDescriptor,
    ParentAssociation, StorageTarget,
};
pub use registry::SchemaRegistry;
pub use repository::{RepositoryDescriptor, RepositoryModule, RepositoryRef};
pub use settings::{CacheSettings, EntitySettings};
