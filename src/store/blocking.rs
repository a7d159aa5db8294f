use super::adapter::{DocumentStoreAdapter, SearchHit};
use super::context::CancellationSignal;
use super::driver::{IndexModel, StoreSession};
use crate::core::{Document, Result};
use crate::query::{FilterNode, Page, SearchQuery, SortSpec};
use crate::schema::Entity;
use futures::executor::block_on;
use serde_json::Value as JsonValue;

/// Blocking form of every [`DocumentStoreAdapter`] operation.
///
/// Each call drives the async operation to completion on the current thread.
/// Do not call it from inside an async runtime worker.
#[derive(Clone)]
pub struct BlockingAdapter {
    inner: DocumentStoreAdapter,
}

impl BlockingAdapter {
    pub fn new(inner: DocumentStoreAdapter) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &DocumentStoreAdapter {
        &self.inner
    }

    pub fn in_session(&self, session: StoreSession) -> Self {
        Self::new(self.inner.in_session(session))
    }

    pub fn with_cancellation(&self, signal: CancellationSignal) -> Self {
        Self::new(self.inner.with_cancellation(signal))
    }

    pub fn in_scope(&self, scope: impl Into<JsonValue>) -> Self {
        Self::new(self.inner.in_scope(scope))
    }

    pub fn create<T: Entity>(&self, entity: &T) -> Result<()> {
        block_on(self.inner.create(entity))
    }

    pub fn replace<T: Entity>(&self, entity: &T) -> Result<()> {
        block_on(self.inner.replace(entity))
    }

    pub fn update_partial<T: Entity>(&self, entity: &T, changed: &[&str]) -> Result<bool> {
        block_on(self.inner.update_partial(entity, changed))
    }

    pub fn delete<T: Entity>(&self, id: impl Into<JsonValue>) -> Result<bool> {
        block_on(self.inner.delete::<T>(id))
    }

    pub fn delete_many<T: Entity>(&self, filter: Option<&FilterNode>) -> Result<u64> {
        block_on(self.inner.delete_many::<T>(filter))
    }

    pub fn get<T: Entity>(&self, id: impl Into<JsonValue>) -> Result<Option<T>> {
        block_on(self.inner.get(id))
    }

    pub fn get_where<T: Entity>(
        &self,
        filter: &FilterNode,
        sort: Option<&SortSpec>,
    ) -> Result<Option<T>> {
        block_on(self.inner.get_where(filter, sort))
    }

    pub fn find<T: Entity>(
        &self,
        filter: Option<&FilterNode>,
        sort: Option<&SortSpec>,
        page: Page,
    ) -> Result<Vec<T>> {
        block_on(self.inner.find(filter, sort, page))
    }

    pub fn select<T: Entity>(
        &self,
        attributes: Option<&[&str]>,
        filter: Option<&FilterNode>,
        sort: Option<&SortSpec>,
        page: Page,
    ) -> Result<Vec<Document>> {
        block_on(self.inner.select::<T>(attributes, filter, sort, page))
    }

    pub fn search<T: Entity>(
        &self,
        query: &SearchQuery,
        filter: Option<&FilterNode>,
        page: Page,
        score_property: &str,
    ) -> Result<Vec<SearchHit<T>>> {
        block_on(self.inner.search(query, filter, page, score_property))
    }

    pub fn count<T: Entity>(&self, filter: Option<&FilterNode>) -> Result<u64> {
        block_on(self.inner.count::<T>(filter))
    }

    pub fn count_matching<T: Entity>(
        &self,
        query: &SearchQuery,
        filter: Option<&FilterNode>,
    ) -> Result<u64> {
        block_on(self.inner.count_matching::<T>(query, filter))
    }

    pub fn ensure_collection<T: Entity>(&self) -> Result<()> {
        block_on(self.inner.ensure_collection::<T>())
    }

    pub fn ensure_indexes<T: Entity>(&self) -> Result<Vec<IndexModel>> {
        block_on(self.inner.ensure_indexes::<T>())
    }
}

impl From<DocumentStoreAdapter> for BlockingAdapter {
    fn from(inner: DocumentStoreAdapter) -> Self {
        Self::new(inner)
    }
}
