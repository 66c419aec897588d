//! Loads entities from SQLite tables as search documents.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, instrument};

use super::{quote, sql_value, SqliteDatabase};
use crate::errors::StoreError;
use crate::interfaces::EntityProvider;
use search_sync_shared::{EntityDocument, EntityId, IdValue};

/// Ids per SELECT, kept well below SQLite's bound parameter limit.
const LOOKUP_CHUNK_SIZE: usize = 200;

/// Where the rows of one entity type live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTable {
    #[serde(alias = "name")]
    pub entity_type: String,
    pub table: String,
    /// Primary key columns, in the order the entity id lists its parts.
    pub id_columns: Vec<String>,
}

impl EntityTable {
    pub fn new(
        entity_type: impl Into<String>,
        table: impl Into<String>,
        id_columns: Vec<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            table: table.into(),
            id_columns,
        }
    }
}

/// [`EntityProvider`] reading whole rows from SQLite.
///
/// Every column of the row becomes a document field; blob columns are
/// skipped.
#[derive(Clone)]
pub struct SqliteEntityProvider {
    db: SqliteDatabase,
    tables: Arc<HashMap<String, EntityTable>>,
}

impl SqliteEntityProvider {
    pub fn new(db: SqliteDatabase, tables: impl IntoIterator<Item = EntityTable>) -> Self {
        let tables = tables
            .into_iter()
            .map(|t| (t.entity_type.clone(), t))
            .collect();
        Self {
            db,
            tables: Arc::new(tables),
        }
    }

    fn table(&self, entity_type: &str) -> Result<&EntityTable, StoreError> {
        self.tables
            .get(entity_type)
            .ok_or_else(|| StoreError::mapping(format!("Unknown entity type: {}", entity_type)))
    }
}

type RawRow = Vec<(String, SqlValue)>;

fn select_rows(
    conn: &rusqlite::Connection,
    table: &EntityTable,
    ids: &[EntityId],
) -> Result<Vec<RawRow>, StoreError> {
    let key = table
        .id_columns
        .iter()
        .map(|c| format!("{} = ?", quote(c)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let predicate = vec![format!("({})", key); ids.len()].join(" OR ");
    let sql = format!("SELECT * FROM {} WHERE {}", quote(&table.table), predicate);

    let mut stmt = conn.prepare(&sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let params = ids
        .iter()
        .flat_map(|id| id.parts().iter().map(sql_value))
        .collect::<Vec<_>>();

    let rows = stmt.query_map(params_from_iter(params), |row| {
        let mut values = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            values.push((name.clone(), row.get::<_, SqlValue>(i)?));
        }
        Ok(values)
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn field_value(value: SqlValue) -> Option<Value> {
    match value {
        SqlValue::Null => Some(Value::Null),
        SqlValue::Integer(i) => Some(Value::from(i)),
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number),
        SqlValue::Text(s) => Some(Value::String(s)),
        SqlValue::Blob(_) => None,
    }
}

fn id_part(table: &EntityTable, column: &str, value: &SqlValue) -> Result<IdValue, StoreError> {
    match value {
        SqlValue::Integer(i) => Ok(IdValue::Integer(*i)),
        SqlValue::Text(s) => Ok(IdValue::Text(s.clone())),
        other => Err(StoreError::mapping(format!(
            "Unsupported id value {:?} in {}.{}",
            other, table.table, column
        ))),
    }
}

fn to_document(table: &EntityTable, row: RawRow) -> Result<EntityDocument, StoreError> {
    let mut parts = Vec::with_capacity(table.id_columns.len());
    for column in &table.id_columns {
        let value = row
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
            .ok_or_else(|| {
                StoreError::mapping(format!("Missing id column {}.{}", table.table, column))
            })?;
        parts.push(id_part(table, column, value)?);
    }
    let id = EntityId::composite(parts)
        .ok_or_else(|| StoreError::mapping(format!("No id columns for {}", table.entity_type)))?;

    let mut fields = Map::new();
    for (name, value) in row {
        if let Some(value) = field_value(value) {
            fields.insert(name, value);
        }
    }

    let mut doc = EntityDocument::new(table.entity_type.clone(), id);
    doc.fields = fields;
    Ok(doc)
}

#[async_trait]
impl EntityProvider for SqliteEntityProvider {
    async fn get(
        &self,
        entity_type: &str,
        id: &EntityId,
    ) -> Result<Option<EntityDocument>, StoreError> {
        let mut found = self.get_batch(entity_type, std::slice::from_ref(id)).await?;
        Ok(found.pop().flatten())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_batch(
        &self,
        entity_type: &str,
        ids: &[EntityId],
    ) -> Result<Vec<Option<EntityDocument>>, StoreError> {
        let table = self.table(entity_type)?.clone();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = ids.iter().find(|id| id.parts().len() != table.id_columns.len()) {
            return Err(StoreError::mapping(format!(
                "Id {} does not match the {} id columns of {}",
                bad,
                table.id_columns.len(),
                table.entity_type
            )));
        }

        let requested = ids.to_vec();
        let lookup_table = table.clone();
        let rows = self
            .db
            .with_connection(move |conn| {
                let mut rows = Vec::new();
                for chunk in requested.chunks(LOOKUP_CHUNK_SIZE) {
                    rows.extend(select_rows(conn, &lookup_table, chunk)?);
                }
                Ok(rows)
            })
            .await?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let doc = to_document(&table, row)?;
            by_id.insert(lookup_key(&doc.id), doc);
        }
        debug!(entity_type, found = by_id.len(), "Loaded entities");

        // Found documents carry the id as requested, so later deletes of the
        // same id address the same document.
        Ok(ids
            .iter()
            .map(|id| {
                by_id.remove(&lookup_key(id)).map(|mut doc| {
                    doc.id = id.clone();
                    doc
                })
            })
            .collect())
    }
}

/// Ids compare by their rendered parts: SQLite matches `'1'` against an
/// integer key, but the row reads back as `1`.
fn lookup_key(id: &EntityId) -> Vec<String> {
    id.parts().iter().map(IdValue::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn provider() -> SqliteEntityProvider {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE Place (id INTEGER PRIMARY KEY, name TEXT, rating REAL, photo BLOB);
             CREATE TABLE Place_Sorcerer (placeId INTEGER, sorcererId INTEGER, role TEXT,
                 PRIMARY KEY (placeId, sorcererId));
             INSERT INTO Place VALUES (1, 'Helm''s Deep', 4.5, x'00');
             INSERT INTO Place VALUES (2, 'Valinor', NULL, NULL);
             INSERT INTO Place_Sorcerer VALUES (1, 7, 'keeper');",
        )
        .await
        .unwrap();

        SqliteEntityProvider::new(
            db,
            vec![
                EntityTable::new("Place", "Place", vec!["id".to_string()]),
                EntityTable::new(
                    "PlaceSorcerer",
                    "Place_Sorcerer",
                    vec!["placeId".to_string(), "sorcererId".to_string()],
                ),
            ],
        )
    }

    #[tokio::test]
    async fn test_get_maps_columns_to_fields() {
        let provider = provider().await;
        let doc = provider
            .get("Place", &EntityId::single(1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(doc.entity_type, "Place");
        assert_eq!(doc.field("name"), Some(&Value::from("Helm's Deep")));
        assert_eq!(doc.field("rating"), Some(&Value::from(4.5)));
        assert!(doc.field("photo").is_none());
    }

    #[tokio::test]
    async fn test_get_batch_preserves_request_order() {
        let provider = provider().await;
        let ids = vec![EntityId::single(2), EntityId::single(99), EntityId::single(1)];
        let docs = provider.get_batch("Place", &ids).await.unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].as_ref().map(|d| d.id.clone()), Some(EntityId::single(2)));
        assert!(docs[1].is_none());
        assert_eq!(docs[2].as_ref().map(|d| d.id.clone()), Some(EntityId::single(1)));
    }

    #[tokio::test]
    async fn test_text_ids_find_integer_keys() {
        let provider = provider().await;
        let ids = vec![
            EntityId::single("2"),
            EntityId::composite(vec![IdValue::from("1"), IdValue::Integer(7)]).unwrap(),
        ];

        let place = provider.get("Place", &ids[0]).await.unwrap().unwrap();
        assert_eq!(place.id, EntityId::single("2"));
        assert_eq!(place.field("name"), Some(&Value::from("Valinor")));

        let link = provider.get("PlaceSorcerer", &ids[1]).await.unwrap().unwrap();
        assert_eq!(link.id, ids[1]);
    }

    #[tokio::test]
    async fn test_composite_ids() {
        let provider = provider().await;
        let id = EntityId::composite(vec![IdValue::Integer(1), IdValue::Integer(7)]).unwrap();
        let doc = provider.get("PlaceSorcerer", &id).await.unwrap().unwrap();
        assert_eq!(doc.id.to_string(), "1:7");
        assert_eq!(doc.field("role"), Some(&Value::from("keeper")));

        let err = provider
            .get("PlaceSorcerer", &EntityId::single(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MappingError(_)));
    }

    #[tokio::test]
    async fn test_unknown_entity_type() {
        let provider = provider().await;
        let err = provider.get("Dragon", &EntityId::single(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::MappingError(_)));
    }

    #[tokio::test]
    async fn test_large_batches_are_chunked() {
        let provider = provider().await;
        let ids: Vec<EntityId> = (1..=450).map(|i: i64| EntityId::single(i)).collect();
        let docs = provider.get_batch("Place", &ids).await.unwrap();
        assert_eq!(docs.len(), 450);
        assert_eq!(docs.iter().filter(|d| d.is_some()).count(), 2);
    }
}
