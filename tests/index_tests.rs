/// Index provisioning tests
///
/// Run with: cargo test --test index_tests

use chrono::{DateTime, TimeZone, Utc};
use docmapper::core::Document;
use docmapper::prelude::*;
use docmapper::store::{DocumentDriver, IndexKind, IndexModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[serde(rename_all = "PascalCase")]
#[entity(collection = "articles", data_source = "main")]
struct Article {
    #[serde(rename = "ID")]
    #[primary_key]
    id: String,
    #[attribute(sortable(index = "ByTitle"), searchable)]
    title: String,
    #[attribute(sortable(unique = "ByPublish"))]
    published_on: DateTime<Utc>,
    #[attribute(searchable, column = "body")]
    summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(collection = "accounts", data_source = "main")]
struct Account {
    #[primary_key]
    id: u32,
    #[attribute(sortable(index = "ByOwner"))]
    tenant: String,
    #[attribute(sortable(unique = "ByOwner"))]
    login: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(collection = "plain", data_source = "main")]
struct Plain {
    #[primary_key]
    id: u32,
    label: String,
}

fn setup(driver: MemoryDriver) -> DocumentStoreAdapter {
    let registry = SchemaRegistry::new(
        DataSourceDirectory::new().with(DataSource::nosql("main", "mem://local", "news")),
    );
    registry.register::<Article>().unwrap();
    registry.register::<Account>().unwrap();
    registry.register::<Plain>().unwrap();
    DocumentStoreAdapter::new(Arc::new(registry), Arc::new(driver))
}

fn article(id: &str, title: &str, day: u32) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        published_on: Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap(),
        summary: format!("{} summary", title),
    }
}

#[tokio::test]
async fn test_article_indexes_are_derived_by_name() {
    let driver = MemoryDriver::new();
    let adapter = setup(driver.clone());

    let indexes = adapter.ensure_indexes::<Article>().await.unwrap();

    assert_eq!(
        indexes,
        vec![
            IndexModel::new("IDX_Article_ByTitle", IndexKind::Ascending, vec!["Title".into()]),
            IndexModel::new("IDX_Article_ByPublish", IndexKind::Unique, vec!["PublishedOn".into()]),
            IndexModel::new(
                "IDX_Article_Text",
                IndexKind::Text,
                vec!["Title".into(), "body".into()]
            ),
        ]
    );

    let collection = driver.collection("mem://local", "news", "articles").await.unwrap();
    assert!(collection.exists().await.unwrap());
    assert_eq!(collection.list_indexes().await.unwrap(), indexes);
}

#[tokio::test]
async fn test_ensure_indexes_is_idempotent() {
    let driver = MemoryDriver::new();
    let adapter = setup(driver.clone());

    let first = adapter.ensure_indexes::<Article>().await.unwrap();
    let second = adapter.ensure_indexes::<Article>().await.unwrap();
    assert_eq!(first, second);

    let collection = driver.collection("mem://local", "news", "articles").await.unwrap();
    assert_eq!(collection.list_indexes().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_shared_name_folds_into_unique_index() {
    let adapter = setup(MemoryDriver::new());

    let indexes = adapter.ensure_indexes::<Account>().await.unwrap();
    assert_eq!(
        indexes,
        vec![IndexModel::new(
            "IDX_Account_ByOwner",
            IndexKind::Unique,
            vec!["tenant".into(), "login".into()]
        )]
    );
}

#[tokio::test]
async fn test_no_declared_indexes() {
    let adapter = setup(MemoryDriver::new());
    assert!(adapter.ensure_indexes::<Plain>().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conflicting_definition_is_reported() {
    let driver = MemoryDriver::new();
    let adapter = setup(driver.clone());

    let collection = driver.collection("mem://local", "news", "articles").await.unwrap();
    collection
        .create_index(&IndexModel::new(
            "IDX_Article_ByTitle",
            IndexKind::Ascending,
            vec!["body".into()],
        ))
        .await
        .unwrap();

    match adapter.ensure_indexes::<Article>().await {
        Err(MapperError::StoreError(StoreError::IndexConflict(name))) => {
            assert_eq!(name, "IDX_Article_ByTitle");
        }
        other => panic!("Expected IndexConflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unique_index_enforced_after_provisioning() {
    let adapter = setup(MemoryDriver::new());
    adapter.ensure_indexes::<Article>().await.unwrap();

    adapter.create(&article("a1", "First", 1)).await.unwrap();
    let err = adapter
        .create(&article("a2", "Second", 1))
        .await
        .unwrap_err();
    assert!(err.is_duplicate_key());
    assert!(!err.is_fail_fast());

    adapter.create(&article("a3", "Third", 2)).await.unwrap();
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_unique_index_over_duplicates_fails() {
    let driver = MemoryDriver::new();
    let adapter = setup(driver.clone());

    adapter.create(&article("a1", "First", 1)).await.unwrap();
    adapter.create(&article("a2", "Second", 1)).await.unwrap();

    let err = adapter.ensure_indexes::<Article>().await.unwrap_err();
    assert!(err.is_duplicate_key());
}

#[tokio::test]
async fn test_sentinel_materializes_collection() {
    let driver = MemoryDriver::without_native_create();
    let adapter = setup(driver.clone());

    let collection = driver.collection("mem://local", "news", "plain").await.unwrap();
    assert!(!collection.supports_create());
    assert!(!collection.exists().await.unwrap());

    adapter.ensure_collection::<Plain>().await.unwrap();

    assert!(collection.exists().await.unwrap());
    let empty = Document::new();
    assert_eq!(collection.count(None, &empty).await.unwrap(), 0);

    // second call sees the collection and does nothing
    adapter.ensure_collection::<Plain>().await.unwrap();
    assert_eq!(collection.count(None, &empty).await.unwrap(), 0);
}

#[tokio::test]
async fn test_native_create_collection() {
    let driver = MemoryDriver::new();
    let adapter = setup(driver.clone());

    adapter.ensure_collection::<Plain>().await.unwrap();

    let collection = driver.collection("mem://local", "news", "plain").await.unwrap();
    assert!(collection.exists().await.unwrap());
    let stored = collection
        .find(None, &Document::new(), &Default::default())
        .await
        .unwrap();
    assert!(stored.is_empty());
}
