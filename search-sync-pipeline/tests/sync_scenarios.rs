//! End-to-end sync scenarios against an in-memory SQLite database with real
//! triggers and the in-memory search index.

use std::sync::Arc;
use std::time::Duration;

use search_sync_pipeline::{
    DeliveryMode, FactoryConfig, FactoryRegistry, SearchFactory, SqliteDialect,
};
use search_sync_repository::{
    EntityTable, InMemorySearchIndex, SqliteDatabase, SqliteEntityProvider, SqliteUpdateStore,
};
use search_sync_shared::{
    ColumnType, EntityDocument, EntityId, EntityUpdateDescriptor, IdMapping, SearchQuery,
};

const SCHEMA: &str = "
    CREATE TABLE Place (ID INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE Sorcerer (sorcerers_ID INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE Place_Sorcerer (Place_ID INTEGER, sorcerers_ID INTEGER);
";

fn descriptors() -> Vec<EntityUpdateDescriptor> {
    vec![
        EntityUpdateDescriptor::new("Place", "PlaceUpdates")
            .with_id_mapping(IdMapping::new("Place").column("placeId", "ID", ColumnType::Integer)),
        EntityUpdateDescriptor::new("Sorcerer", "SorcererUpdates").with_id_mapping(
            IdMapping::new("Sorcerer").column("sorcererId", "sorcerers_ID", ColumnType::Integer),
        ),
        EntityUpdateDescriptor::new("Place_Sorcerer", "PlaceSorcererUpdates")
            .with_id_mapping(
                IdMapping::new("Place").column("placeId", "Place_ID", ColumnType::Integer),
            )
            .with_id_mapping(
                IdMapping::new("Sorcerer").column("sorcererId", "sorcerers_ID", ColumnType::Integer),
            ),
    ]
}

struct Harness {
    db: SqliteDatabase,
    index: Arc<InMemorySearchIndex>,
    factory: Arc<SearchFactory>,
}

async fn harness(config: FactoryConfig) -> Harness {
    harness_with(config, descriptors()).await
}

async fn harness_with(config: FactoryConfig, descriptors: Vec<EntityUpdateDescriptor>) -> Harness {
    let db = SqliteDatabase::open_in_memory().unwrap();
    db.execute_batch(SCHEMA).await.unwrap();

    let index = Arc::new(InMemorySearchIndex::new());
    let provider = SqliteEntityProvider::new(
        db.clone(),
        vec![
            EntityTable::new("Place", "Place", vec!["ID".to_string()]),
            EntityTable::new("Sorcerer", "Sorcerer", vec!["sorcerers_ID".to_string()]),
        ],
    );

    let factory = SearchFactory::builder()
        .config(config)
        .registry(Arc::new(FactoryRegistry::new()))
        .index_provider(index.clone())
        .entity_provider(Arc::new(provider))
        .update_store(Arc::new(SqliteUpdateStore::new(db.clone())))
        .descriptors(descriptors)
        .build()
        .unwrap();
    factory
        .install_triggers(Box::new(SqliteDialect))
        .await
        .unwrap();

    Harness { db, index, factory }
}

fn name_of(doc: &EntityDocument) -> Option<&str> {
    doc.field("name").and_then(|v| v.as_str())
}

#[tokio::test]
async fn test_direct_index_and_purge() {
    let h = harness(FactoryConfig::default()).await;

    h.factory
        .index(vec![
            EntityDocument::new("Place", 1).with_field("name", "Mordor"),
            EntityDocument::new("Place", 2).with_field("name", "Shire"),
        ])
        .await
        .unwrap();
    assert_eq!(h.factory.count(&SearchQuery::all("Place")).await.unwrap(), 2);

    h.factory.purge_all("Place").await.unwrap();
    assert_eq!(h.factory.count(&SearchQuery::all("Place")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_relational_insert_is_indexed() {
    let h = harness(FactoryConfig::default()).await;

    h.db
        .execute_batch("INSERT INTO Place (ID, name) VALUES (1, 'Mordor')")
        .await
        .unwrap();
    let report = h.factory.poll_once().await.unwrap();

    assert_eq!(report.rows_fetched, 1);
    assert_eq!(report.rows_acknowledged, 1);
    let response = h.factory.query(&SearchQuery::all("Place")).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.hits[0].id, EntityId::single(1));
    assert_eq!(name_of(&response.hits[0]), Some("Mordor"));
}

#[tokio::test]
async fn test_relational_update_replaces_fields() {
    let h = harness(FactoryConfig::default()).await;
    h.db
        .execute_batch("INSERT INTO Place (ID, name) VALUES (1, 'Mordor')")
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();

    h.db
        .execute_batch("UPDATE Place SET name = 'Gondor' WHERE ID = 1")
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();

    let gondor = h
        .factory
        .query(&SearchQuery::term("Place", "name", "Gondor"))
        .await
        .unwrap();
    assert_eq!(gondor.total, 1);
    let mordor = h
        .factory
        .query(&SearchQuery::term("Place", "name", "Mordor"))
        .await
        .unwrap();
    assert_eq!(mordor.total, 0);
}

#[tokio::test]
async fn test_relational_delete_removes_document() {
    let h = harness(FactoryConfig::default()).await;
    h.db
        .execute_batch(
            "INSERT INTO Place (ID, name) VALUES (1, 'Mordor');
             INSERT INTO Place (ID, name) VALUES (2, 'Shire');",
        )
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();

    h.db
        .execute_batch("DELETE FROM Place WHERE ID = 1")
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();

    let response = h.factory.query(&SearchQuery::all("Place")).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.hits[0].id, EntityId::single(2));
}

#[tokio::test]
async fn test_primary_key_change_moves_document() {
    let h = harness(FactoryConfig::default()).await;
    h.db
        .execute_batch("INSERT INTO Place (ID, name) VALUES (1, 'Mordor')")
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();

    h.db
        .execute_batch("UPDATE Place SET ID = 5 WHERE ID = 1")
        .await
        .unwrap();
    let report = h.factory.poll_once().await.unwrap();

    assert_eq!(report.rows_fetched, 2);
    assert_eq!(report.dispatch.updated, 1);
    assert_eq!(report.dispatch.demoted, 1);
    let response = h.factory.query(&SearchQuery::all("Place")).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(response.hits[0].id, EntityId::single(5));
}

#[tokio::test]
async fn test_unchanged_key_records_one_row() {
    let h = harness(FactoryConfig::default()).await;
    h.db
        .execute_batch(
            "INSERT INTO Place (ID, name) VALUES (1, 'Mordor');
             UPDATE Place SET name = 'Gondor' WHERE ID = 1;",
        )
        .await
        .unwrap();

    let report = h.factory.poll_once().await.unwrap();
    assert_eq!(report.rows_fetched, 2);
}

#[tokio::test]
async fn test_text_mapped_integer_key_round_trips() {
    let place = EntityUpdateDescriptor::new("Place", "PlaceUpdates")
        .with_id_mapping(IdMapping::new("Place").column("placeId", "ID", ColumnType::Text));
    let h = harness_with(FactoryConfig::default(), vec![place]).await;

    h.db
        .execute_batch("INSERT INTO Place (ID, name) VALUES (1, 'Mordor')")
        .await
        .unwrap();
    let report = h.factory.poll_once().await.unwrap();

    assert_eq!(report.dispatch.updated, 1);
    assert_eq!(report.dispatch.demoted, 0);
    assert_eq!(h.index.len().await, 1);

    h.db
        .execute_batch("DELETE FROM Place WHERE ID = 1")
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();
    assert!(h.index.is_empty().await);
}

#[tokio::test]
async fn test_batch_size_drains_in_three_cycles() {
    let h = harness(FactoryConfig::default().with_batch_size(5)).await;
    let inserts: String = (1..=12)
        .map(|i| format!("INSERT INTO Place (ID, name) VALUES ({i}, 'Place {i}');"))
        .collect();
    h.db.execute_batch(inserts).await.unwrap();

    let mut fetched = Vec::new();
    loop {
        let report = h.factory.poll_once().await.unwrap();
        if report.is_idle() {
            break;
        }
        fetched.push(report.rows_fetched);
    }

    assert_eq!(fetched, vec![5, 5, 2]);
    assert_eq!(h.index.len().await, 12);
}

#[tokio::test]
async fn test_join_rows_update_both_sides() {
    let h = harness(FactoryConfig::default()).await;
    h.db
        .execute_batch(
            "INSERT INTO Place (ID, name) VALUES (1, 'Minas Tirith');
             INSERT INTO Sorcerer (sorcerers_ID, name) VALUES (7, 'Gandalf');",
        )
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();

    h.db
        .execute_batch("INSERT INTO Place_Sorcerer (Place_ID, sorcerers_ID) VALUES (1, 7)")
        .await
        .unwrap();
    let report = h.factory.poll_once().await.unwrap();
    assert_eq!(report.events, 2);
    assert_eq!(report.dispatch.updated, 2);

    h.db
        .execute_batch("INSERT INTO Place_Sorcerer (Place_ID, sorcerers_ID) VALUES (1, NULL)")
        .await
        .unwrap();
    let report = h.factory.poll_once().await.unwrap();
    assert_eq!(report.events, 1);
    assert_eq!(report.skipped_rows, 0);
    assert_eq!(h.index.len().await, 2);
}

#[tokio::test]
async fn test_redispatch_is_idempotent() {
    let h = harness(FactoryConfig::default()).await;
    h.db
        .execute_batch(
            "INSERT INTO Place (ID, name) VALUES (1, 'Mordor');
             UPDATE Place SET name = 'Mordor' WHERE ID = 1;",
        )
        .await
        .unwrap();

    let report = h.factory.poll_once().await.unwrap();
    assert_eq!(report.rows_fetched, 2);
    h.factory
        .orchestrator()
        .source()
        .store()
        .execute_statements(&[
            "INSERT INTO PlaceUpdates (placeId, eventcase) VALUES (1, 1)".to_string(),
        ])
        .await
        .unwrap();
    h.factory.poll_once().await.unwrap();

    let response = h.factory.query(&SearchQuery::all("Place")).await.unwrap();
    assert_eq!(response.total, 1);
    assert_eq!(name_of(&response.hits[0]), Some("Mordor"));
}

#[tokio::test]
async fn test_background_cycles_until_stopped() {
    let config = FactoryConfig::default()
        .with_update_delay(Duration::from_millis(10))
        .with_delivery_mode(DeliveryMode::AtLeastOnce);
    let h = harness(config).await;
    h.factory.start().await.unwrap();

    h.db
        .execute_batch("INSERT INTO Sorcerer (sorcerers_ID, name) VALUES (3, 'Saruman')")
        .await
        .unwrap();

    let mut indexed = false;
    for _ in 0..200 {
        if h.index.len().await == 1 {
            indexed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    h.factory.stop().await;

    assert!(indexed);
    assert!(!h.factory.is_running());
}
