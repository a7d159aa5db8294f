//! Everything an application needs to declare entities and run queries.
//!
//! ```ignore
//! use docmapper::prelude::*;
//! ```

pub use crate::core::{Document, MapperError, Result, StoreError};
pub use crate::datasource::{DataSource, DataSourceDirectory};
pub use crate::query::{AttrRef, FilterNode, Page, SearchQuery, SortDirection, SortSpec};
pub use crate::schema::{
    CacheBinding, Entity, EntityDef, RepositoryDescriptor, RepositoryModule, SchemaRegistry,
};
pub use crate::store::{
    AdapterConfig, BlockingAdapter, CancellationSignal, DocumentDriver, DocumentStoreAdapter,
    MemoryDriver, SearchHit, StoreSession,
};
pub use docmapper_derive::Entity;
