//! Seam between the adapter and a concrete document-store client.
//!
//! Filters, updates and documents use the Mongo-style JSON dialect produced by
//! [`QueryTranslator`](crate::query::QueryTranslator).

use crate::core::{Document, StoreResult};
use crate::query::DocumentSort;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Client session threaded through store calls for multi-document atomicity.
///
/// The adapter passes it along but never opens, commits or aborts it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreSession {
    id: Uuid,
}

impl StoreSession {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn from_id(id: Uuid) -> Self {
        Self { id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for StoreSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Ascending,
    Unique,
    Text,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "ascending"),
            Self::Unique => write!(f, "unique"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Index definition. Two models with the same name must be identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexModel {
    pub name: String,
    pub fields: Vec<String>,
    pub kind: IndexKind,
    /// Build without blocking concurrent reads and writes.
    pub background: bool,
}

impl IndexModel {
    pub fn new(name: impl Into<String>, kind: IndexKind, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            kind,
            background: true,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }

    pub fn is_text(&self) -> bool {
        self.kind == IndexKind::Text
    }
}

/// Field-level update: `$set` then `$unset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    pub set: Document,
    pub unset: Vec<String>,
}

impl UpdateSpec {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<DocumentSort>,
    /// Order by text relevance (descending) ahead of `sort`.
    pub sort_by_score: bool,
    /// Project the text relevance score under this field.
    pub score_field: Option<String>,
    /// Fields to return; `_id` is always included.
    pub projection: Option<Vec<String>>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Option<DocumentSort>) -> Self {
        self.sort = sort;
        self
    }

    pub fn by_score(mut self, score_field: impl Into<String>) -> Self {
        self.sort_by_score = true;
        self.score_field = Some(score_field.into());
        self
    }

    pub fn projection(mut self, fields: Vec<String>) -> Self {
        self.projection = Some(fields);
        self
    }

    pub fn window(mut self, skip: u64, limit: Option<u64>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }
}

/// Opens collection handles.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn collection(
        &self,
        connection: &str,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentCollection>>;
}

/// Operations on one physical collection.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the store offers a native "create collection" primitive.
    fn supports_create(&self) -> bool;

    async fn exists(&self) -> StoreResult<bool>;

    /// Create the collection. Fails with `Unsupported` when there is no native primitive.
    async fn create(&self) -> StoreResult<()>;

    async fn insert_one(&self, session: Option<&StoreSession>, document: Document)
    -> StoreResult<()>;

    /// Replace the first match; insert when nothing matches and `upsert` is set.
    /// Returns the number of documents written.
    async fn replace_one(
        &self,
        session: Option<&StoreSession>,
        filter: &Document,
        document: Document,
        upsert: bool,
    ) -> StoreResult<u64>;

    /// Returns the number of matched documents.
    async fn update_one(
        &self,
        session: Option<&StoreSession>,
        filter: &Document,
        update: &UpdateSpec,
    ) -> StoreResult<u64>;

    async fn delete_one(&self, session: Option<&StoreSession>, filter: &Document)
    -> StoreResult<u64>;

    async fn delete_many(
        &self,
        session: Option<&StoreSession>,
        filter: &Document,
    ) -> StoreResult<u64>;

    async fn find(
        &self,
        session: Option<&StoreSession>,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    async fn count(&self, session: Option<&StoreSession>, filter: &Document) -> StoreResult<u64>;

    async fn list_indexes(&self) -> StoreResult<Vec<IndexModel>>;

    /// Create-if-absent. Returns `false` when an identical index already exists
    /// and fails with `IndexConflict` when the name is taken by another definition.
    async fn create_index(&self, index: &IndexModel) -> StoreResult<bool>;
}
