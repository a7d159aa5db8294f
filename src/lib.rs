// ============================================================================
// docmapper: entity metadata and query mapping for document stores
// ============================================================================

pub mod core;
pub mod datasource;
pub mod prelude;
pub mod query;
pub mod schema;
pub mod store;

// Re-export main types for convenience
pub use core::{DeclaredType, Document, MapperError, Result, StoreError, StoreResult};
pub use datasource::{DataSource, DataSourceDirectory, DataSourceMode};
pub use query::{
    AttrRef, FilterNode, FilterOperator, Page, QueryTranslator, SearchQuery, SortDirection,
    SortSpec, SqlFilter,
};
pub use schema::{
    AttributeDef, ColumnOptions, Entity, EntityDef, EntityDescriptor, RepositoryDescriptor,
    RepositoryModule, SchemaRegistry,
};
pub use store::{
    AdapterConfig, BlockingAdapter, CancellationSignal, DocumentStoreAdapter, MemoryDriver,
    SearchHit, StoreSession,
};

// Derive macro for the Entity trait
pub use docmapper_derive::Entity;
