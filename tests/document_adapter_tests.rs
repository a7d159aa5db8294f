/// Document store adapter tests
///
/// CRUD, partial updates, projections, free-text search, scoping and
/// cancellation against the in-memory driver.
/// Run with: cargo test --test document_adapter_tests

use chrono::{DateTime, TimeZone, Utc};
use docmapper::core::Document;
use docmapper::prelude::*;
use docmapper::store::FindOptions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Block {
    kind: String,
    body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[serde(rename_all = "PascalCase")]
#[entity(collection = "articles", data_source = "main", extendable)]
struct Article {
    #[serde(rename = "ID")]
    #[primary_key]
    id: String,
    #[attribute(sortable, searchable, not_empty, max_length = 80)]
    title: String,
    #[attribute(searchable, column = "body")]
    body: String,
    #[attribute(sortable)]
    views: i64,
    #[attribute(sortable)]
    published_on: Option<DateTime<Utc>>,
    blocks: Vec<Block>,
    tags: Vec<String>,
    #[attribute(ignore_if_null)]
    subtitle: Option<String>,
    #[attribute(json)]
    meta: Option<Value>,
    #[serde(rename = "_ext", default, skip_serializing_if = "Option::is_none")]
    #[attribute(ignore)]
    extension: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "ledger", data_source = "reporting")]
struct LedgerRow {
    #[primary_key]
    id: u64,
    amount: f64,
}

fn article(id: &str, title: &str, views: i64) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        body: format!("{} body", title.to_lowercase()),
        views,
        published_on: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
        blocks: vec![Block {
            kind: "text".to_string(),
            body: "intro".to_string(),
        }],
        tags: vec!["news".to_string()],
        subtitle: Some("sub".to_string()),
        meta: Some(json!({"source": "wire", "priority": 2})),
        extension: None,
    }
}

fn setup() -> (DocumentStoreAdapter, MemoryDriver) {
    let registry = SchemaRegistry::new(
        DataSourceDirectory::new()
            .with(DataSource::nosql("main", "mem://local", "news"))
            .with(DataSource::sql("reporting", "pg://report", "report")),
    );
    registry.register::<Article>().unwrap();
    registry.register::<LedgerRow>().unwrap();
    let driver = MemoryDriver::new();
    let adapter = DocumentStoreAdapter::new(Arc::new(registry), Arc::new(driver.clone()));
    (adapter, driver)
}

async fn stored(driver: &MemoryDriver) -> Vec<Document> {
    use docmapper::store::DocumentDriver;
    let collection = driver
        .collection("mem://local", "news", "articles")
        .await
        .unwrap();
    collection
        .find(None, &Document::new(), &FindOptions::new())
        .await
        .unwrap()
}

// ========================================
// Create / read
// ========================================

#[tokio::test]
async fn test_create_and_get_roundtrip() {
    let (adapter, driver) = setup();
    let original = article("a1", "Covid update", 10);

    adapter.create(&original).await.unwrap();

    let loaded: Option<Article> = adapter.get("a1").await.unwrap();
    assert_eq!(loaded, Some(original));

    let documents = stored(&driver).await;
    assert_eq!(documents.len(), 1);
    let document = &documents[0];
    assert_eq!(document["_id"], json!("a1"));
    assert!(!document.contains_key("ID"));
    assert_eq!(document["body"], json!("covid update body"));
    assert_eq!(
        document["PublishedOn"],
        json!({"$date": Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap().timestamp_millis()})
    );
    assert!(document["Meta"].is_string());
}

#[tokio::test]
async fn test_dates_are_stored_at_millisecond_precision() {
    let (adapter, driver) = setup();
    let mut precise = article("a1", "Precise", 1);
    precise.published_on = Some(Utc.timestamp_nanos(1_700_000_000_123_456_789));

    adapter.create(&precise).await.unwrap();

    let documents = stored(&driver).await;
    assert_eq!(documents[0]["PublishedOn"], json!({"$date": 1_700_000_000_123i64}));

    let loaded: Article = adapter.get("a1").await.unwrap().unwrap();
    assert_ne!(loaded, precise);
    assert_eq!(
        loaded.published_on,
        Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap())
    );
}

#[tokio::test]
async fn test_search_keeps_extended_properties() {
    let (adapter, _) = setup();
    adapter.ensure_indexes::<Article>().await.unwrap();

    let mut red = article("a1", "Covid update", 1);
    red.extension = Some(json!({"color": "red"}).as_object().cloned().unwrap());
    adapter.create(&red).await.unwrap();

    let hits: Vec<SearchHit<Article>> = adapter
        .search(&SearchQuery::parse("covid"), None, Page::unbounded(), "relevance")
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity, red);
}

#[tokio::test]
async fn test_get_missing_and_null_key() {
    let (adapter, _) = setup();

    let missing: Option<Article> = adapter.get("nope").await.unwrap();
    assert!(missing.is_none());

    let err = adapter.get::<Article>(Value::Null).await.unwrap_err();
    assert!(matches!(err, MapperError::PreconditionError(_)));
}

#[tokio::test]
async fn test_duplicate_create_fails() {
    let (adapter, _) = setup();
    adapter.create(&article("a1", "First", 1)).await.unwrap();

    let err = adapter
        .create(&article("a1", "Second", 2))
        .await
        .unwrap_err();
    assert!(err.is_duplicate_key());

    let loaded: Article = adapter.get("a1").await.unwrap().unwrap();
    assert_eq!(loaded.title, "First");
}

#[tokio::test]
async fn test_constraints_fail_before_io() {
    let (adapter, driver) = setup();

    let mut untitled = article("a1", "x", 1);
    untitled.title = String::new();
    let err = adapter.create(&untitled).await.unwrap_err();
    assert!(matches!(err, MapperError::PreconditionError(_)));
    assert!(err.is_fail_fast());

    let mut long = article("a2", "x", 1);
    long.title = "t".repeat(81);
    assert!(matches!(
        adapter.create(&long).await,
        Err(MapperError::PreconditionError(_))
    ));

    assert!(stored(&driver).await.is_empty());
}

#[tokio::test]
async fn test_replace_upserts() {
    let (adapter, _) = setup();

    adapter.replace(&article("a1", "Draft", 1)).await.unwrap();
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 1);

    let mut edited = article("a1", "Final", 5);
    edited.tags.clear();
    edited.subtitle = None;
    adapter.replace(&edited).await.unwrap();

    let loaded: Article = adapter.get("a1").await.unwrap().unwrap();
    assert_eq!(loaded, edited);
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 1);
}

// ========================================
// Partial updates
// ========================================

#[tokio::test]
async fn test_update_partial_writes_only_changed_members() {
    let (adapter, _) = setup();
    adapter.create(&article("a1", "Covid update", 10)).await.unwrap();

    let mut local = article("a1", "Covid update", 99);
    local.body = "rewritten locally".to_string();

    assert!(adapter.update_partial(&local, &["Views"]).await.unwrap());

    let loaded: Article = adapter.get("a1").await.unwrap().unwrap();
    assert_eq!(loaded.views, 99);
    assert_eq!(loaded.body, "covid update body");
}

#[tokio::test]
async fn test_update_partial_by_column_name() {
    let (adapter, _) = setup();
    adapter.create(&article("a1", "Covid update", 10)).await.unwrap();

    let mut local = article("a1", "Covid update", 10);
    local.body = "new body".to_string();
    assert!(adapter.update_partial(&local, &["body"]).await.unwrap());

    let loaded: Article = adapter.get("a1").await.unwrap().unwrap();
    assert_eq!(loaded.body, "new body");
}

#[tokio::test]
async fn test_update_partial_unsets_null_members() {
    let (adapter, driver) = setup();
    adapter.create(&article("a1", "Covid update", 10)).await.unwrap();

    let mut local = article("a1", "Covid update", 10);
    local.subtitle = None;
    assert!(adapter.update_partial(&local, &["Subtitle"]).await.unwrap());

    let documents = stored(&driver).await;
    assert!(!documents[0].contains_key("Subtitle"));
    let loaded: Article = adapter.get("a1").await.unwrap().unwrap();
    assert_eq!(loaded.subtitle, None);
}

#[tokio::test]
async fn test_update_partial_complex_collection_falls_back_to_replace() {
    let (adapter, _) = setup();
    adapter.create(&article("a1", "Covid update", 10)).await.unwrap();

    let mut local = article("a1", "Covid update", 10);
    local.blocks.push(Block {
        kind: "image".to_string(),
        body: "chart.png".to_string(),
    });
    local.body = "also written".to_string();

    assert!(adapter.update_partial(&local, &["Blocks"]).await.unwrap());

    let loaded: Article = adapter.get("a1").await.unwrap().unwrap();
    assert_eq!(loaded, local);
}

#[tokio::test]
async fn test_update_partial_rejects_bad_member_lists() {
    let (adapter, _) = setup();
    let local = article("a1", "Covid update", 10);
    adapter.create(&local).await.unwrap();

    let bad: [&[&str]; 3] = [&[], &["ID"], &["Nope"]];
    for changed in bad {
        assert!(matches!(
            adapter.update_partial(&local, changed).await,
            Err(MapperError::PreconditionError(_))
        ));
    }
}

#[tokio::test]
async fn test_update_partial_reports_missing_document() {
    let (adapter, _) = setup();
    let local = article("ghost", "Covid update", 10);
    assert!(!adapter.update_partial(&local, &["Views"]).await.unwrap());
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 0);

    // the complex-collection fallback replaces, it never inserts
    assert!(!adapter.update_partial(&local, &["Blocks"]).await.unwrap());
    assert!(!adapter.update_partial(&local, &["Views", "Blocks"]).await.unwrap());
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 0);
    let missing: Option<Article> = adapter.get("ghost").await.unwrap();
    assert!(missing.is_none());
}

// ========================================
// Delete
// ========================================

#[tokio::test]
async fn test_delete_and_delete_many() {
    let (adapter, _) = setup();
    for (id, views) in [("a1", 1), ("a2", 20), ("a3", 30)] {
        adapter.create(&article(id, "Title", views)).await.unwrap();
    }

    assert!(adapter.delete::<Article>("a1").await.unwrap());
    assert!(!adapter.delete::<Article>("a1").await.unwrap());

    assert_eq!(
        adapter
            .delete_many::<Article>(Some(&FilterNode::none()))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        adapter
            .delete_many::<Article>(Some(&FilterNode::gt("Views", 25)))
            .await
            .unwrap(),
        1
    );
    assert_eq!(adapter.delete_many::<Article>(None).await.unwrap(), 1);
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 0);
}

// ========================================
// Queries
// ========================================

#[tokio::test]
async fn test_find_get_where_and_paging() {
    let (adapter, _) = setup();
    for (id, views) in [("a3", 30), ("a1", 10), ("a2", 20), ("a4", 20)] {
        adapter.create(&article(id, "Title", views)).await.unwrap();
    }

    let sort = SortSpec::new().descending("Views");
    let all: Vec<Article> = adapter.find(None, Some(&sort), Page::unbounded()).await.unwrap();
    let order: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(order, vec!["a3", "a2", "a4", "a1"]);

    let page: Vec<Article> = adapter.find(None, Some(&sort), Page::new(2, 3)).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "a1");

    assert!(matches!(
        adapter.find::<Article>(None, None, Page::new(0, 10)).await,
        Err(MapperError::PreconditionError(_))
    ));

    let first: Option<Article> = adapter
        .get_where(&FilterNode::eq("Views", 20), None)
        .await
        .unwrap();
    assert_eq!(first.unwrap().id, "a2");

    let none: Option<Article> = adapter
        .get_where(&FilterNode::gt("Views", 1000), None)
        .await
        .unwrap();
    assert!(none.is_none());

    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().to_rfc3339();
    assert_eq!(
        adapter
            .count::<Article>(Some(&FilterNode::gte("PublishedOn", since)))
            .await
            .unwrap(),
        4
    );
}

#[tokio::test]
async fn test_select_projects_member_names() {
    let (adapter, _) = setup();
    adapter.create(&article("a1", "Covid update", 10)).await.unwrap();
    adapter.create(&article("a2", "Weather", 3)).await.unwrap();

    let keys_only = adapter
        .select::<Article>(None, None, Some(&SortSpec::new()), Page::unbounded())
        .await
        .unwrap();
    assert_eq!(
        keys_only
            .into_iter()
            .map(Value::Object)
            .collect::<Vec<_>>(),
        vec![json!({"ID": "a1"}), json!({"ID": "a2"})]
    );

    let projected = adapter
        .select::<Article>(
            Some(&["Title", "body"]),
            Some(&FilterNode::eq("ID", "a2")),
            None,
            Page::unbounded(),
        )
        .await
        .unwrap();
    assert_eq!(
        Value::Object(projected[0].clone()),
        json!({"ID": "a2", "Title": "Weather", "Body": "weather body"})
    );

    assert!(matches!(
        adapter
            .select::<Article>(Some(&["Colour"]), None, None, Page::unbounded())
            .await,
        Err(MapperError::PreconditionError(_))
    ));
}

#[tokio::test]
async fn test_extended_properties() {
    let (adapter, driver) = setup();

    let mut red = article("a1", "Red", 1);
    red.extension = Some(
        json!({"color": "red"})
            .as_object()
            .cloned()
            .unwrap(),
    );
    adapter.create(&red).await.unwrap();
    adapter.create(&article("a2", "Plain", 2)).await.unwrap();

    let documents = stored(&driver).await;
    assert_eq!(documents[0]["_ext"], json!({"color": "red"}));

    let found: Vec<Article> = adapter
        .find(
            Some(&FilterNode::eq(AttrRef::extended("color"), "red")),
            None,
            Page::unbounded(),
        )
        .await
        .unwrap();
    assert_eq!(found, vec![red]);
}

// ========================================
// Free-text search
// ========================================

async fn seed_search(adapter: &DocumentStoreAdapter) {
    adapter.ensure_indexes::<Article>().await.unwrap();
    let mut a1 = article("a1", "Covid update", 10);
    a1.body = "covid cases rise".to_string();
    let mut a2 = article("a2", "Covid draft", 50);
    a2.body = "draft notes on covid".to_string();
    let mut a3 = article("a3", "Weather", 70);
    a3.body = "sunny".to_string();
    let mut a4 = article("a4", "Covid", 5);
    a4.body = "covid covid vaccine".to_string();
    for entity in [a1, a2, a3, a4] {
        adapter.create(&entity).await.unwrap();
    }
}

#[tokio::test]
async fn test_search_orders_by_relevance() {
    let (adapter, _) = setup();
    seed_search(&adapter).await;

    let query = SearchQuery::parse("covid -draft");
    let hits: Vec<SearchHit<Article>> = adapter
        .search(&query, None, Page::unbounded(), "score")
        .await
        .unwrap();

    let ranked: Vec<(&str, f64)> = hits
        .iter()
        .map(|hit| (hit.entity.id.as_str(), hit.score))
        .collect();
    assert_eq!(ranked, vec![("a4", 3.0), ("a1", 2.0)]);

    assert_eq!(adapter.count_matching::<Article>(&query, None).await.unwrap(), 2);
    assert_eq!(
        adapter
            .count_matching::<Article>(&query, Some(&FilterNode::gt("Views", 8)))
            .await
            .unwrap(),
        1
    );

    let first_only = adapter
        .search::<Article>(&query, None, Page::first(1), "score")
        .await
        .unwrap();
    assert_eq!(first_only.len(), 1);
    assert_eq!(first_only[0].entity.id, "a4");
}

#[tokio::test]
async fn test_search_argument_errors() {
    let (adapter, _) = setup();
    seed_search(&adapter).await;

    let empty = SearchQuery::parse("   ");
    assert!(matches!(
        adapter.search::<Article>(&empty, None, Page::unbounded(), "score").await,
        Err(MapperError::PreconditionError(_))
    ));
    assert!(matches!(
        adapter.count_matching::<Article>(&empty, None).await,
        Err(MapperError::PreconditionError(_))
    ));

    let query = SearchQuery::parse("covid");
    for property in ["", "Title", "body", "_id", "_ext", "_scope"] {
        assert!(matches!(
            adapter.search::<Article>(&query, None, Page::unbounded(), property).await,
            Err(MapperError::PreconditionError(_))
        ));
    }
}

// ========================================
// Call context
// ========================================

#[tokio::test]
async fn test_scope_partitions_shared_collection() {
    let (adapter, driver) = setup();
    let tenant_a = adapter.in_scope("tenant-a");
    let tenant_b = adapter.in_scope("tenant-b");

    tenant_a.create(&article("a1", "Alpha", 1)).await.unwrap();
    tenant_a.create(&article("a2", "Alpha two", 2)).await.unwrap();
    tenant_b.create(&article("b1", "Beta", 3)).await.unwrap();

    assert_eq!(tenant_a.count::<Article>(None).await.unwrap(), 2);
    assert_eq!(tenant_b.count::<Article>(None).await.unwrap(), 1);
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 3);

    let foreign: Option<Article> = tenant_b.get("a1").await.unwrap();
    assert!(foreign.is_none());
    assert!(!tenant_b.delete::<Article>("a1").await.unwrap());

    assert_eq!(tenant_b.delete_many::<Article>(None).await.unwrap(), 1);
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 2);

    let documents = stored(&driver).await;
    assert!(documents.iter().all(|d| d["_scope"] == json!("tenant-a")));
}

#[tokio::test]
async fn test_cancelled_operations_issue_no_io() {
    let (adapter, driver) = setup();
    let signal = CancellationSignal::new();
    let cancellable = adapter.with_cancellation(signal.clone());

    cancellable.create(&article("a1", "Before", 1)).await.unwrap();
    signal.cancel();

    assert!(matches!(
        cancellable.create(&article("a2", "After", 2)).await,
        Err(MapperError::Cancelled)
    ));
    assert!(matches!(
        cancellable.count::<Article>(None).await,
        Err(MapperError::Cancelled)
    ));
    assert_eq!(stored(&driver).await.len(), 1);

    // the original adapter is unaffected
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_session_is_threaded_through() {
    let (adapter, _) = setup();
    let session = StoreSession::new();
    let in_session = adapter.in_session(session.clone());

    assert_eq!(in_session.context().session(), Some(&session));
    in_session.create(&article("a1", "Tx", 1)).await.unwrap();
    assert_eq!(adapter.count::<Article>(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_relational_source_is_rejected() {
    let (adapter, _) = setup();
    let row = LedgerRow { id: 1, amount: 9.5 };

    assert!(matches!(
        adapter.create(&row).await,
        Err(MapperError::PreconditionError(_))
    ));
}

#[tokio::test]
async fn test_unregistered_type() {
    #[derive(Debug, Serialize, Deserialize, Entity)]
    #[entity(collection = "stray", data_source = "main")]
    struct Stray {
        #[primary_key]
        id: u32,
    }

    let (adapter, _) = setup();
    assert!(matches!(
        adapter.create(&Stray { id: 1 }).await,
        Err(MapperError::NotRegistered(_))
    ));
}

#[test]
fn test_blocking_adapter() {
    let (adapter, _) = setup();
    let blocking = BlockingAdapter::from(adapter);

    blocking.create(&article("a1", "Blocking", 1)).unwrap();
    blocking.create(&article("a2", "Blocking two", 2)).unwrap();

    let loaded: Option<Article> = blocking.get("a1").unwrap();
    assert_eq!(loaded.unwrap().title, "Blocking");

    let mut local = article("a2", "Blocking two", 42);
    local.subtitle = None;
    assert!(blocking.update_partial(&local, &["Views"]).unwrap());

    let found: Vec<Article> = blocking
        .find(Some(&FilterNode::gt("Views", 10)), None, Page::unbounded())
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].views, 42);

    assert_eq!(blocking.delete_many::<Article>(None).unwrap(), 2);
    assert_eq!(blocking.count::<Article>(None).unwrap(), 0);
}
