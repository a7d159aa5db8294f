//! In-process document store implementing the driver traits.
//!
//! Evaluates the native filter dialect, enforces `_id` and unique-index
//! constraints and scores `$text` queries. Useful for tests and embedded use.

use super::driver::{
    DocumentCollection, DocumentDriver, FindOptions, IndexKind, IndexModel, StoreSession,
    UpdateSpec,
};
use super::handles::HandleKey;
use super::matcher::{Matcher, find_text_search, sort_compare};
use crate::core::value::{canonical_key, get_path};
use crate::core::{Document, StoreError, StoreResult};
use crate::query::SortDirection;
use crate::store::ID_FIELD;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDriverConfig {
    /// Offer a native "create collection" primitive.
    pub native_create_collection: bool,
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        Self {
            native_create_collection: true,
        }
    }
}

/// Shared in-memory store. Clones see the same collections.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<DriverState>,
}

#[derive(Default)]
struct DriverState {
    config: MemoryDriverConfig,
    collections: Mutex<HashMap<HandleKey, Arc<MemoryCollection>>>,
    opened: AtomicUsize,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryDriverConfig) -> Self {
        Self {
            inner: Arc::new(DriverState {
                config,
                ..Default::default()
            }),
        }
    }

    /// A driver without a native create-collection primitive.
    pub fn without_native_create() -> Self {
        Self::with_config(MemoryDriverConfig {
            native_create_collection: false,
        })
    }

    /// Number of `collection` calls served so far.
    pub fn opened_count(&self) -> usize {
        self.inner.opened.load(AtomicOrdering::SeqCst)
    }

    fn open(&self, key: HandleKey) -> StoreResult<Arc<MemoryCollection>> {
        let mut collections = self
            .inner
            .collections
            .lock()
            .map_err(|e| StoreError::Driver(format!("collection registry poisoned: {}", e)))?;
        let native_create = self.inner.config.native_create_collection;
        Ok(Arc::clone(collections.entry(key.clone()).or_insert_with(|| {
            Arc::new(MemoryCollection::new(&key.collection, native_create))
        })))
    }
}

#[async_trait]
impl DocumentDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn collection(
        &self,
        connection: &str,
        database: &str,
        collection: &str,
    ) -> StoreResult<Arc<dyn DocumentCollection>> {
        self.inner.opened.fetch_add(1, AtomicOrdering::SeqCst);
        let handle: Arc<dyn DocumentCollection> =
            self.open(HandleKey::new(connection, database, collection))?;
        Ok(handle)
    }
}

#[derive(Default)]
struct CollectionState {
    exists: bool,
    next_seq: u64,
    /// Insertion order is natural order.
    documents: BTreeMap<u64, Document>,
    ids: HashMap<String, u64>,
    indexes: Vec<IndexModel>,
}

impl CollectionState {
    fn text_fields(&self) -> Vec<String> {
        self.indexes
            .iter()
            .find(|index| index.is_text())
            .map(|index| index.fields.clone())
            .unwrap_or_default()
    }

    fn matching(&self, filter: &Document) -> StoreResult<Vec<u64>> {
        let text_fields = self.text_fields();
        let matcher = Matcher::new(&text_fields);
        let mut out = Vec::new();
        for (seq, document) in &self.documents {
            if matcher.matches(document, filter)? {
                out.push(*seq);
            }
        }
        Ok(out)
    }

    fn check_unique(&self, collection: &str, document: &Document, skip: Option<u64>) -> StoreResult<()> {
        for index in self.indexes.iter().filter(|index| index.is_unique()) {
            let key = unique_key(document, &index.fields);
            let clash = self
                .documents
                .iter()
                .filter(|(seq, _)| Some(**seq) != skip)
                .any(|(_, other)| unique_key(other, &index.fields) == key);
            if clash {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    index: index.name.clone(),
                    key,
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, collection: &str, mut document: Document) -> StoreResult<()> {
        let id = document
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| JsonValue::String(Uuid::new_v4().to_string()))
            .clone();
        let id_key = canonical_key(&id);
        if self.ids.contains_key(&id_key) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                index: ID_INDEX.to_string(),
                key: id.to_string(),
            });
        }
        self.check_unique(collection, &document, None)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.ids.insert(id_key, seq);
        self.documents.insert(seq, document);
        self.exists = true;
        Ok(())
    }

    fn replace_at(&mut self, collection: &str, seq: u64, mut document: Document) -> StoreResult<()> {
        let current_id = self
            .documents
            .get(&seq)
            .and_then(|current| current.get(ID_FIELD))
            .cloned()
            .unwrap_or(JsonValue::Null);
        match document.get(ID_FIELD) {
            None => {
                document.insert(ID_FIELD.to_string(), current_id);
            }
            Some(id) if canonical_key(id) != canonical_key(&current_id) => {
                return Err(StoreError::Driver(format!(
                    "the _id field is immutable ({} -> {})",
                    current_id, id
                )));
            }
            Some(_) => {}
        }
        self.check_unique(collection, &document, Some(seq))?;
        self.documents.insert(seq, document);
        Ok(())
    }

    fn remove(&mut self, seq: u64) {
        if let Some(document) = self.documents.remove(&seq) {
            if let Some(id) = document.get(ID_FIELD) {
                self.ids.remove(&canonical_key(id));
            }
        }
    }
}

fn unique_key(document: &Document, fields: &[String]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|field| canonical_key(get_path(document, field).unwrap_or(&JsonValue::Null)))
        .collect();
    parts.join("|")
}

pub struct MemoryCollection {
    name: String,
    native_create: bool,
    state: RwLock<CollectionState>,
}

impl MemoryCollection {
    fn new(name: &str, native_create: bool) -> Self {
        Self {
            name: name.to_string(),
            native_create,
            state: RwLock::new(CollectionState::default()),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_create(&self) -> bool {
        self.native_create
    }

    async fn exists(&self) -> StoreResult<bool> {
        Ok(self.state.read().await.exists)
    }

    async fn create(&self) -> StoreResult<()> {
        if !self.native_create {
            return Err(StoreError::Unsupported("create collection".to_string()));
        }
        self.state.write().await.exists = true;
        Ok(())
    }

    async fn insert_one(&self, _session: Option<&StoreSession>, document: Document) -> StoreResult<()> {
        self.state.write().await.insert(&self.name, document)
    }

    async fn replace_one(
        &self,
        _session: Option<&StoreSession>,
        filter: &Document,
        document: Document,
        upsert: bool,
    ) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        match state.matching(filter)?.first().copied() {
            Some(seq) => {
                state.replace_at(&self.name, seq, document)?;
                Ok(1)
            }
            None if upsert => {
                state.insert(&self.name, document)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_one(
        &self,
        _session: Option<&StoreSession>,
        filter: &Document,
        update: &UpdateSpec,
    ) -> StoreResult<u64> {
        if update.set.contains_key(ID_FIELD) || update.unset.iter().any(|f| f == ID_FIELD) {
            return Err(StoreError::Driver("the _id field is immutable".to_string()));
        }

        let mut state = self.state.write().await;
        let Some(seq) = state.matching(filter)?.first().copied() else {
            return Ok(0);
        };
        let Some(mut document) = state.documents.get(&seq).cloned() else {
            return Ok(0);
        };
        for (field, value) in &update.set {
            document.insert(field.clone(), value.clone());
        }
        for field in &update.unset {
            document.remove(field);
        }
        state.replace_at(&self.name, seq, document)?;
        Ok(1)
    }

    async fn delete_one(&self, _session: Option<&StoreSession>, filter: &Document) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        match state.matching(filter)?.first().copied() {
            Some(seq) => {
                state.remove(seq);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(
        &self,
        _session: Option<&StoreSession>,
        filter: &Document,
    ) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let matched = state.matching(filter)?;
        for seq in &matched {
            state.remove(*seq);
        }
        Ok(matched.len() as u64)
    }

    async fn find(
        &self,
        _session: Option<&StoreSession>,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let state = self.state.read().await;
        let text_fields = state.text_fields();
        let matcher = Matcher::new(&text_fields);
        let search = find_text_search(filter);

        let mut hits: Vec<(Option<f64>, &Document)> = Vec::new();
        for document in state.documents.values() {
            if !matcher.matches(document, filter)? {
                continue;
            }
            let score = match search {
                Some(text) if options.sort_by_score || options.score_field.is_some() => {
                    matcher.text_score(document, text)?
                }
                _ => None,
            };
            hits.push((score, document));
        }

        hits.sort_by(|(score_a, a), (score_b, b)| {
            let mut ordering = Ordering::Equal;
            if options.sort_by_score {
                ordering = score_b
                    .unwrap_or(0.0)
                    .partial_cmp(&score_a.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal);
            }
            for (field, direction) in options.sort.iter().flatten() {
                if ordering != Ordering::Equal {
                    break;
                }
                let by_field = sort_compare(get_path(a, field), get_path(b, field));
                ordering = match direction {
                    SortDirection::Ascending => by_field,
                    SortDirection::Descending => by_field.reverse(),
                };
            }
            ordering
        });

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(hits
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(score, document)| {
                let mut out = match &options.projection {
                    Some(fields) => document
                        .iter()
                        .filter(|(key, _)| key.as_str() == ID_FIELD || fields.contains(key))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect(),
                    None => document.clone(),
                };
                if let Some(field) = &options.score_field {
                    out.insert(field.clone(), JsonValue::from(score.unwrap_or(0.0)));
                }
                out
            })
            .collect())
    }

    async fn count(&self, _session: Option<&StoreSession>, filter: &Document) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.matching(filter)?.len() as u64)
    }

    async fn list_indexes(&self) -> StoreResult<Vec<IndexModel>> {
        Ok(self.state.read().await.indexes.clone())
    }

    async fn create_index(&self, index: &IndexModel) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.indexes.iter().find(|i| i.name == index.name) {
            return if existing == index {
                Ok(false)
            } else {
                Err(StoreError::IndexConflict(index.name.clone()))
            };
        }
        if index.is_text() && state.indexes.iter().any(|i| i.kind == IndexKind::Text) {
            return Err(StoreError::IndexConflict(index.name.clone()));
        }

        if index.is_unique() {
            let mut seen = HashMap::new();
            for document in state.documents.values() {
                let key = unique_key(document, &index.fields);
                if seen.insert(key.clone(), ()).is_some() {
                    return Err(StoreError::DuplicateKey {
                        collection: self.name.clone(),
                        index: index.name.clone(),
                        key,
                    });
                }
            }
        }

        state.indexes.push(index.clone());
        state.exists = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: JsonValue) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn collection(driver: &MemoryDriver) -> Arc<dyn DocumentCollection> {
        driver.collection("mem://", "db", "things").await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_enforces_id_uniqueness() {
        let driver = MemoryDriver::new();
        let things = collection(&driver).await;

        things.insert_one(None, doc(json!({"_id": 1, "n": "a"}))).await.unwrap();
        let err = things
            .insert_one(None, doc(json!({"_id": 1, "n": "b"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref index, .. } if index == "_id_"));
        assert_eq!(things.count(None, &Document::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_integer_and_float_keys_collide() {
        let driver = MemoryDriver::new();
        let things = collection(&driver).await;
        things
            .create_index(&IndexModel::new("IDX_Thing_ByCode", IndexKind::Unique, vec!["code".into()]))
            .await
            .unwrap();

        things.insert_one(None, doc(json!({"_id": 1, "code": 10}))).await.unwrap();
        let by_id = things
            .insert_one(None, doc(json!({"_id": 1.0, "code": 11})))
            .await
            .unwrap_err();
        assert!(matches!(by_id, StoreError::DuplicateKey { ref index, .. } if index == "_id_"));

        let by_code = things
            .insert_one(None, doc(json!({"_id": 2, "code": 10.0})))
            .await
            .unwrap_err();
        assert!(matches!(by_code, StoreError::DuplicateKey { ref index, .. } if index == "IDX_Thing_ByCode"));
        assert_eq!(things.count(None, &Document::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_index_and_conflicts() {
        let driver = MemoryDriver::new();
        let things = collection(&driver).await;
        let index = IndexModel::new("IDX_Thing_ByCode", IndexKind::Unique, vec!["code".into()]);

        assert!(things.create_index(&index).await.unwrap());
        assert!(!things.create_index(&index).await.unwrap());
        let other = IndexModel::new("IDX_Thing_ByCode", IndexKind::Ascending, vec!["code".into()]);
        assert_eq!(
            things.create_index(&other).await,
            Err(StoreError::IndexConflict("IDX_Thing_ByCode".into()))
        );

        things.insert_one(None, doc(json!({"_id": 1, "code": "x"}))).await.unwrap();
        assert!(things
            .insert_one(None, doc(json!({"_id": 2, "code": "x"})))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_find_sorts_pages_and_projects() {
        let driver = MemoryDriver::new();
        let things = collection(&driver).await;
        for (id, views) in [(1, 5), (2, 9), (3, 5), (4, 1)] {
            things
                .insert_one(None, doc(json!({"_id": id, "views": views, "x": true})))
                .await
                .unwrap();
        }

        let options = FindOptions::new()
            .sort(Some(vec![
                ("views".to_string(), SortDirection::Descending),
                ("_id".to_string(), SortDirection::Ascending),
            ]))
            .projection(vec!["views".to_string()])
            .window(1, Some(2));
        let found = things.find(None, &Document::new(), &options).await.unwrap();

        assert_eq!(
            found,
            vec![doc(json!({"_id": 1, "views": 5})), doc(json!({"_id": 3, "views": 5}))]
        );
    }

    #[tokio::test]
    async fn test_text_search_scores() {
        let driver = MemoryDriver::new();
        let things = collection(&driver).await;
        things
            .create_index(&IndexModel::new("IDX_T_Text", IndexKind::Text, vec!["body".into()]))
            .await
            .unwrap();
        things.insert_one(None, doc(json!({"_id": 1, "body": "rust"}))).await.unwrap();
        things.insert_one(None, doc(json!({"_id": 2, "body": "rust rust go"}))).await.unwrap();
        things.insert_one(None, doc(json!({"_id": 3, "body": "go"}))).await.unwrap();

        let filter = doc(json!({"$text": {"$search": "rust"}}));
        let found = things
            .find(None, &filter, &FindOptions::new().by_score("score"))
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["_id"], json!(2));
        assert_eq!(found[0]["score"], json!(2.0));
        assert_eq!(found[1]["score"], json!(1.0));
    }

    #[tokio::test]
    async fn test_native_create_flag() {
        let things = collection(&MemoryDriver::without_native_create()).await;
        assert!(!things.supports_create());
        assert!(matches!(things.create().await, Err(StoreError::Unsupported(_))));
        assert!(!things.exists().await.unwrap());

        things.insert_one(None, doc(json!({"_id": "s"}))).await.unwrap();
        things.delete_one(None, &doc(json!({"_id": "s"}))).await.unwrap();
        assert!(things.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_replace() {
        let driver = MemoryDriver::new();
        let things = collection(&driver).await;
        things
            .insert_one(None, doc(json!({"_id": 1, "a": 1, "b": 2})))
            .await
            .unwrap();

        let by_id = doc(json!({"_id": {"$eq": 1}}));
        let update = UpdateSpec {
            set: doc(json!({"a": 10})),
            unset: vec!["b".to_string()],
        };
        assert_eq!(things.update_one(None, &by_id, &update).await.unwrap(), 1);
        let found = things.find(None, &by_id, &FindOptions::new()).await.unwrap();
        assert_eq!(found, vec![doc(json!({"_id": 1, "a": 10}))]);

        assert_eq!(
            things
                .replace_one(None, &doc(json!({"_id": 2})), doc(json!({"_id": 2, "c": 3})), true)
                .await
                .unwrap(),
            1
        );
        assert_eq!(things.count(None, &Document::new()).await.unwrap(), 2);
    }
}
