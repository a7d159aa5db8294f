//! Document Store Adapter
//!
//! Facade executing entity operations against a document store. Descriptors
//! come from the [`SchemaRegistry`], filters and sorts are compiled by the
//! [`QueryTranslator`], documents are mapped by the [`DocumentCodec`].

use super::codec::DocumentCodec;
use super::config::AdapterConfig;
use super::context::{CancellationSignal, OperationContext};
use super::driver::{
    DocumentCollection, DocumentDriver, FindOptions, IndexModel, StoreSession, UpdateSpec,
};
use super::handles::CollectionHandleCache;
use super::index::derive_indexes;
use crate::core::{Document, MapperError, Result};
use crate::query::{FilterNode, Page, QueryTranslator, SearchQuery, SortSpec};
use crate::schema::{Entity, EntityDescriptor, SchemaRegistry};
use crate::store::ID_FIELD;
use serde_json::{Value as JsonValue, json};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{Instrument, Level, debug_span, event};
use uuid::Uuid;

/// An entity returned by [`DocumentStoreAdapter::search`] with its relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<T> {
    pub entity: T,
    pub score: f64,
}

/// Executes entity operations against document collections.
///
/// Cheap to clone. Clones share the registry, the driver and the handle cache;
/// [`in_session`](Self::in_session), [`with_cancellation`](Self::with_cancellation)
/// and [`in_scope`](Self::in_scope) return clones with a different call context.
#[derive(Clone)]
pub struct DocumentStoreAdapter {
    registry: Arc<SchemaRegistry>,
    driver: Arc<dyn DocumentDriver>,
    handles: Arc<CollectionHandleCache>,
    translator: Arc<QueryTranslator>,
    config: Arc<AdapterConfig>,
    context: OperationContext,
}

impl DocumentStoreAdapter {
    /// Create new adapter with default configuration
    pub fn new(registry: Arc<SchemaRegistry>, driver: Arc<dyn DocumentDriver>) -> Self {
        let config = AdapterConfig::default();
        Self {
            registry,
            driver,
            handles: Arc::new(CollectionHandleCache::new()),
            translator: Arc::new(QueryTranslator::from_config(&config)),
            config: Arc::new(config),
            context: OperationContext::default(),
        }
    }

    /// Create adapter with custom configuration
    pub fn with_config(
        registry: Arc<SchemaRegistry>,
        driver: Arc<dyn DocumentDriver>,
        config: AdapterConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| MapperError::precondition(format!("Invalid adapter config: {}", reason)))?;
        Ok(Self {
            translator: Arc::new(QueryTranslator::from_config(&config)),
            config: Arc::new(config),
            ..Self::new(registry, driver)
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// Thread `session` through every store call made by the returned adapter.
    pub fn in_session(&self, session: StoreSession) -> Self {
        let mut adapter = self.clone();
        adapter.context.session = Some(session);
        adapter
    }

    /// Stop issuing store calls once `signal` is cancelled.
    pub fn with_cancellation(&self, signal: CancellationSignal) -> Self {
        let mut adapter = self.clone();
        adapter.context.cancellation = Some(signal);
        adapter
    }

    /// Restrict every read and stamp every write with a scope identifier.
    pub fn in_scope(&self, scope: impl Into<JsonValue>) -> Self {
        let mut adapter = self.clone();
        adapter.context.scope = Some(scope.into());
        adapter
    }

    // ========================================
    // Plumbing
    // ========================================

    fn descriptor<T: Entity>(&self) -> Result<Arc<EntityDescriptor>> {
        self.registry.descriptor::<T>()
    }

    fn codec<'a>(&'a self, descriptor: &'a EntityDescriptor) -> DocumentCodec<'a> {
        DocumentCodec::new(descriptor, &self.config)
    }

    async fn collection(&self, descriptor: &EntityDescriptor) -> Result<Arc<dyn DocumentCollection>> {
        let source = self
            .registry
            .directory()
            .resolve(&descriptor.data_sources().primary)?;
        if !source.is_document_store() {
            return Err(MapperError::precondition(format!(
                "Entity '{}' is bound to {} data source '{}'",
                descriptor.owner_type(),
                source.mode(),
                source.name()
            )));
        }
        self.context.checkpoint()?;
        self.handles
            .get_or_open(self.driver.as_ref(), &source, descriptor.storage_name())
            .await
    }

    fn session(&self) -> Option<&StoreSession> {
        self.context.session()
    }

    fn compile(&self, filter: Option<&FilterNode>, descriptor: &EntityDescriptor) -> Result<Document> {
        let all = FilterNode::all();
        self.translator
            .compile_document(filter.unwrap_or(&all), descriptor, self.context.scope())
    }

    fn id_filter(&self, descriptor: &EntityDescriptor, id: JsonValue) -> Result<Document> {
        if id.is_null() {
            return Err(MapperError::precondition(format!(
                "Primary key of '{}' cannot be null",
                descriptor.owner_type()
            )));
        }
        let by_id = FilterNode::eq(descriptor.primary_key_name(), id);
        self.compile(Some(&by_id), descriptor)
    }

    fn text_filter(&self, query: &SearchQuery, filter: Option<&FilterNode>, descriptor: &EntityDescriptor) -> Result<Document> {
        if query.is_empty() {
            return Err(MapperError::precondition("Search text cannot be empty"));
        }
        let structural = self.compile(filter, descriptor)?;
        match json!({ "$and": [{ "$text": { "$search": query.serialize() } }, structural] }) {
            JsonValue::Object(document) => Ok(document),
            _ => Ok(Document::new()),
        }
    }

    fn stamp_scope(&self, document: &mut Document) {
        if let Some(scope) = self.context.scope() {
            document.insert(self.config.scope_attribute.clone(), scope.clone());
        }
    }

    // ========================================
    // Writes
    // ========================================

    /// Insert a new entity. A taken primary key surfaces as a duplicate-key store error.
    pub async fn create<T: Entity>(&self, entity: &T) -> Result<()> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.create", collection = %descriptor.storage_name());
        async {
            let codec = self.codec(&descriptor);
            let record = codec.to_record(entity)?;
            codec.primary_key_value(&record)?;
            let mut document = codec.encode_record(&record)?;
            self.stamp_scope(&mut document);

            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            collection.insert_one(self.session(), document).await?;
            event!(Level::DEBUG, "entity created");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Full-document upsert keyed by primary key.
    pub async fn replace<T: Entity>(&self, entity: &T) -> Result<()> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.replace", collection = %descriptor.storage_name());
        async {
            self.replace_with(&descriptor, entity, true).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Full-document replace keyed by primary key. Returns the matched count;
    /// an upsert that inserts counts as one.
    async fn replace_with<T: Entity>(
        &self,
        descriptor: &EntityDescriptor,
        entity: &T,
        upsert: bool,
    ) -> Result<u64> {
        let codec = self.codec(descriptor);
        let record = codec.to_record(entity)?;
        let id = codec.primary_key_value(&record)?;
        let mut document = codec.encode_record(&record)?;
        self.stamp_scope(&mut document);
        let filter = self.id_filter(descriptor, id)?;

        let collection = self.collection(descriptor).await?;
        self.context.checkpoint()?;
        let matched = collection
            .replace_one(self.session(), &filter, document, upsert)
            .await?;
        event!(Level::DEBUG, matched, upsert, "entity replaced");
        Ok(matched)
    }

    /// Write only the `changed` members of `entity`.
    ///
    /// Members encoded as arrays of complex elements cannot be set reliably at
    /// field level, so any such member in `changed` turns the call into a full
    /// replace of the existing document. Nothing is ever inserted. Returns
    /// whether a stored document matched.
    pub async fn update_partial<T: Entity>(&self, entity: &T, changed: &[&str]) -> Result<bool> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.update_partial", collection = %descriptor.storage_name());
        async {
            if changed.is_empty() {
                return Err(MapperError::precondition("No changed members given"));
            }

            let mut attributes = Vec::with_capacity(changed.len());
            let mut seen = HashSet::new();
            for name in changed {
                let attr = descriptor.resolve_attribute(name).ok_or_else(|| {
                    MapperError::precondition(format!(
                        "Entity '{}' has no attribute '{}'",
                        descriptor.owner_type(),
                        name
                    ))
                })?;
                if attr.is_primary_key() {
                    return Err(MapperError::precondition(format!(
                        "Primary key '{}' cannot be partially updated",
                        attr.name()
                    )));
                }
                if seen.insert(attr.name()) {
                    attributes.push(attr);
                }
            }

            if attributes.iter().any(|attr| attr.encoding().is_complex_collection()) {
                event!(
                    Level::DEBUG,
                    "complex collection member changed, falling back to replace"
                );
                let matched = self.replace_with(&descriptor, entity, false).await?;
                return Ok(matched > 0);
            }

            let codec = self.codec(&descriptor);
            let record = codec.to_record(entity)?;
            let id = codec.primary_key_value(&record)?;

            let mut update = UpdateSpec::default();
            for attr in attributes {
                let value = record.get(attr.name());
                attr.validate(value)?;
                match value {
                    None | Some(JsonValue::Null) if attr.is_ignored_if_null() => {
                        update.unset.push(attr.document_field().to_string())
                    }
                    _ => {
                        update.set.insert(
                            attr.document_field().to_string(),
                            codec.encode_member(attr, value.unwrap_or(&JsonValue::Null)),
                        );
                    }
                }
            }

            let filter = self.id_filter(&descriptor, id)?;
            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            let matched = collection.update_one(self.session(), &filter, &update).await?;
            event!(Level::DEBUG, matched, "entity partially updated");
            Ok(matched > 0)
        }
        .instrument(span)
        .await
    }

    /// Delete by primary key. Returns whether a document was removed.
    pub async fn delete<T: Entity>(&self, id: impl Into<JsonValue>) -> Result<bool> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.delete", collection = %descriptor.storage_name());
        async {
            let filter = self.id_filter(&descriptor, id.into())?;
            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            Ok(collection.delete_one(self.session(), &filter).await? > 0)
        }
        .instrument(span)
        .await
    }

    /// Delete every match. `None` empties the collection (or the current scope);
    /// pass [`FilterNode::none`] for a no-op.
    pub async fn delete_many<T: Entity>(&self, filter: Option<&FilterNode>) -> Result<u64> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.delete_many", collection = %descriptor.storage_name());
        async {
            let native = self.compile(filter, &descriptor)?;
            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            let deleted = collection.delete_many(self.session(), &native).await?;
            event!(Level::DEBUG, deleted, "entities deleted");
            Ok(deleted)
        }
        .instrument(span)
        .await
    }

    // ========================================
    // Reads
    // ========================================

    /// Entity by primary key; `None` when absent.
    pub async fn get<T: Entity>(&self, id: impl Into<JsonValue>) -> Result<Option<T>> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.get", collection = %descriptor.storage_name());
        async {
            let filter = self.id_filter(&descriptor, id.into())?;
            self.first(&descriptor, &filter, FindOptions::new().window(0, Some(1)))
                .await
        }
        .instrument(span)
        .await
    }

    /// First match of `filter`, primary key ascending unless `sort` says otherwise.
    pub async fn get_where<T: Entity>(
        &self,
        filter: &FilterNode,
        sort: Option<&SortSpec>,
    ) -> Result<Option<T>> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.get_where", collection = %descriptor.storage_name());
        async {
            let native = self.compile(Some(filter), &descriptor)?;
            let default_sort = SortSpec::new();
            let sort = self
                .translator
                .compile_sort(Some(sort.unwrap_or(&default_sort)), &descriptor)?;
            let options = FindOptions::new().sort(sort).window(0, Some(1));
            self.first(&descriptor, &native, options).await
        }
        .instrument(span)
        .await
    }

    async fn first<T: Entity>(
        &self,
        descriptor: &EntityDescriptor,
        filter: &Document,
        options: FindOptions,
    ) -> Result<Option<T>> {
        let collection = self.collection(descriptor).await?;
        self.context.checkpoint()?;
        let found = collection.find(self.session(), filter, &options).await?;
        found
            .first()
            .map(|document| self.codec(descriptor).decode(document))
            .transpose()
    }

    /// Fully materialized entities.
    pub async fn find<T: Entity>(
        &self,
        filter: Option<&FilterNode>,
        sort: Option<&SortSpec>,
        page: Page,
    ) -> Result<Vec<T>> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.find", collection = %descriptor.storage_name());
        async {
            page.validate()?;
            let native = self.compile(filter, &descriptor)?;
            let options = FindOptions::new()
                .sort(self.translator.compile_sort(sort, &descriptor)?)
                .window(page.skip(), page.limit());

            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            let documents = collection.find(self.session(), &native, &options).await?;
            event!(Level::DEBUG, found = documents.len(), "entities found");

            let codec = self.codec(&descriptor);
            documents.iter().map(|document| codec.decode(document)).collect()
        }
        .instrument(span)
        .await
    }

    /// Raw member-keyed projections. With no attributes, only the primary key is returned.
    pub async fn select<T: Entity>(
        &self,
        attributes: Option<&[&str]>,
        filter: Option<&FilterNode>,
        sort: Option<&SortSpec>,
        page: Page,
    ) -> Result<Vec<Document>> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.select", collection = %descriptor.storage_name());
        async {
            page.validate()?;
            let mut projection = vec![ID_FIELD.to_string()];
            for name in attributes.unwrap_or_default() {
                let attr = descriptor.resolve_attribute(name).ok_or_else(|| {
                    MapperError::precondition(format!(
                        "Entity '{}' has no attribute '{}'",
                        descriptor.owner_type(),
                        name
                    ))
                })?;
                projection.push(attr.document_field().to_string());
            }

            let native = self.compile(filter, &descriptor)?;
            let options = FindOptions::new()
                .sort(self.translator.compile_sort(sort, &descriptor)?)
                .projection(projection)
                .window(page.skip(), page.limit());

            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            let documents = collection.find(self.session(), &native, &options).await?;

            let codec = self.codec(&descriptor);
            documents
                .iter()
                .map(|document| codec.decode_fields(document))
                .collect()
        }
        .instrument(span)
        .await
    }

    /// Free-text search conjoined with `filter`, most relevant first.
    ///
    /// The store projects the relevance under `score_property`; it is moved
    /// into [`SearchHit::score`]. The property must not name a stored field,
    /// the extension field or the scope field.
    pub async fn search<T: Entity>(
        &self,
        query: &SearchQuery,
        filter: Option<&FilterNode>,
        page: Page,
        score_property: &str,
    ) -> Result<Vec<SearchHit<T>>> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.search", collection = %descriptor.storage_name(), query = %query);
        async {
            page.validate()?;
            let reserved = score_property == self.config.extended_field
                || score_property == self.config.scope_attribute;
            if score_property.is_empty()
                || reserved
                || descriptor.attribute_by_document_field(score_property).is_some()
            {
                return Err(MapperError::precondition(format!(
                    "'{}' cannot hold the search score",
                    score_property
                )));
            }
            let native = self.text_filter(query, filter, &descriptor)?;
            let tie_break = self.translator.compile_sort(Some(&SortSpec::new()), &descriptor)?;
            let options = FindOptions::new()
                .by_score(score_property)
                .sort(tie_break)
                .window(page.skip(), page.limit());

            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            let documents = collection.find(self.session(), &native, &options).await?;

            let codec = self.codec(&descriptor);
            documents
                .into_iter()
                .map(|mut document| {
                    let score = document
                        .remove(score_property)
                        .and_then(|score| score.as_f64())
                        .unwrap_or(0.0);
                    Ok(SearchHit {
                        entity: codec.decode(&document)?,
                        score,
                    })
                })
                .collect()
        }
        .instrument(span)
        .await
    }

    pub async fn count<T: Entity>(&self, filter: Option<&FilterNode>) -> Result<u64> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.count", collection = %descriptor.storage_name());
        async {
            let native = self.compile(filter, &descriptor)?;
            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            Ok(collection.count(self.session(), &native).await?)
        }
        .instrument(span)
        .await
    }

    /// Count of search matches, with the same conjunction rule as [`search`](Self::search).
    pub async fn count_matching<T: Entity>(
        &self,
        query: &SearchQuery,
        filter: Option<&FilterNode>,
    ) -> Result<u64> {
        let descriptor = self.descriptor::<T>()?;
        let span = debug_span!("docmapper.count_matching", collection = %descriptor.storage_name());
        async {
            let native = self.text_filter(query, filter, &descriptor)?;
            let collection = self.collection(&descriptor).await?;
            self.context.checkpoint()?;
            Ok(collection.count(self.session(), &native).await?)
        }
        .instrument(span)
        .await
    }

    // ========================================
    // Provisioning
    // ========================================

    pub async fn ensure_collection<T: Entity>(&self) -> Result<()> {
        let descriptor = self.descriptor::<T>()?;
        self.ensure_collection_for(&descriptor).await
    }

    /// Make sure the physical collection exists. Uses the native primitive when
    /// the store has one, otherwise inserts and deletes a sentinel document.
    pub async fn ensure_collection_for(&self, descriptor: &EntityDescriptor) -> Result<()> {
        let span = debug_span!("docmapper.ensure_collection", collection = %descriptor.storage_name());
        async {
            let collection = self.collection(descriptor).await?;
            self.context.checkpoint()?;
            if collection.exists().await? {
                return Ok(());
            }

            if collection.supports_create() {
                self.context.checkpoint()?;
                collection.create().await?;
                event!(Level::INFO, "collection created");
                return Ok(());
            }

            let sentinel_id = format!("__sentinel_{}", Uuid::new_v4());
            let mut sentinel = Document::new();
            sentinel.insert(ID_FIELD.to_string(), JsonValue::String(sentinel_id.clone()));
            let mut by_id = Document::new();
            by_id.insert(ID_FIELD.to_string(), json!({ "$eq": sentinel_id }));

            self.context.checkpoint()?;
            collection.insert_one(self.session(), sentinel).await?;
            // no checkpoint between insert and delete: the sentinel never outlives this call
            collection.delete_one(self.session(), &by_id).await?;
            event!(Level::INFO, "collection materialized with sentinel document");
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn ensure_indexes<T: Entity>(&self) -> Result<Vec<IndexModel>> {
        let descriptor = self.descriptor::<T>()?;
        self.ensure_indexes_for(&descriptor).await
    }

    /// Create every derived index that does not exist yet and return the
    /// derived set. Running it again creates nothing.
    pub async fn ensure_indexes_for(&self, descriptor: &EntityDescriptor) -> Result<Vec<IndexModel>> {
        if self.config.ensure_collection {
            self.ensure_collection_for(descriptor).await?;
        }
        let span = debug_span!("docmapper.ensure_indexes", collection = %descriptor.storage_name());
        async {
            let indexes = derive_indexes(descriptor, &self.config);
            let collection = self.collection(descriptor).await?;
            for index in &indexes {
                self.context.checkpoint()?;
                if collection.create_index(index).await? {
                    event!(
                        Level::INFO,
                        index = %index.name,
                        kind = %index.kind,
                        fields = ?index.fields,
                        "index created"
                    );
                }
            }
            Ok(indexes)
        }
        .instrument(span)
        .await
    }
}
