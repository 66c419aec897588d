//! Shadow table access on SQLite.

use async_trait::async_trait;
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, instrument, warn};

use super::{column_value, quote, SqliteDatabase};
use crate::errors::StoreError;
use crate::interfaces::{UpdateDeletion, UpdateStore};
use search_sync_shared::{EntityUpdateDescriptor, RawUpdateRow};

/// [`UpdateStore`] backed by a [`SqliteDatabase`].
#[derive(Clone)]
pub struct SqliteUpdateStore {
    db: SqliteDatabase,
}

impl SqliteUpdateStore {
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    conn.transaction()
        .map_err(|e| StoreError::transaction(format!("Failed to begin transaction: {}", e)))
}

fn commit(tx: Transaction<'_>) -> Result<(), StoreError> {
    tx.commit()
        .map_err(|e| StoreError::transaction(format!("Failed to commit transaction: {}", e)))
}

fn select_pending(
    tx: &Transaction<'_>,
    descriptor: &EntityUpdateDescriptor,
    limit: usize,
) -> Result<Vec<RawUpdateRow>, StoreError> {
    let mapped: Vec<&str> = descriptor.mapped_columns().collect();
    let mut columns = vec![quote(&descriptor.id_column), quote(&descriptor.case_column)];
    columns.extend(mapped.iter().map(|c| quote(c)));

    let sql = format!(
        "SELECT {} FROM {} ORDER BY {} ASC LIMIT ?1",
        columns.join(", "),
        quote(&descriptor.updates_table),
        quote(&descriptor.id_column),
    );

    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt.query_map(params![sql_limit(limit)], |row| {
        let row_id: i64 = row.get(0)?;
        let case_code = row.get_ref(1)?.as_i64().ok();
        let mut raw = RawUpdateRow::new(descriptor.updates_table.clone(), row_id, case_code);
        for (offset, column) in mapped.iter().enumerate() {
            raw = raw.with_value(*column, column_value(row.get_ref(offset + 2)?));
        }
        Ok(raw)
    })?;

    let pending = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(pending)
}

/// SQLite treats a negative LIMIT as no limit, so saturate instead of wrapping.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl UpdateStore for SqliteUpdateStore {
    #[instrument(skip(self, descriptors), fields(tables = descriptors.len()))]
    async fn fetch_updates(
        &self,
        descriptors: &[EntityUpdateDescriptor],
        limit_per_table: usize,
    ) -> Result<Vec<RawUpdateRow>, StoreError> {
        if descriptors.is_empty() || limit_per_table == 0 {
            return Ok(Vec::new());
        }
        let descriptors = descriptors.to_vec();

        self.db
            .with_connection(move |conn| {
                let tx = begin(conn)?;
                let mut rows = Vec::new();
                for descriptor in &descriptors {
                    let pending = select_pending(&tx, descriptor, limit_per_table)?;
                    debug!(
                        table = %descriptor.updates_table,
                        count = pending.len(),
                        "Read shadow rows"
                    );
                    rows.extend(pending);
                }
                commit(tx)?;
                Ok(rows)
            })
            .await
    }

    #[instrument(skip(self, deletions))]
    async fn delete_updates(&self, deletions: &[UpdateDeletion]) -> Result<usize, StoreError> {
        if deletions.iter().all(|d| d.row_ids.is_empty()) {
            return Ok(0);
        }
        let deletions = deletions.to_vec();

        self.db
            .with_connection(move |conn| {
                let tx = begin(conn)?;
                let mut removed = 0;
                for deletion in &deletions {
                    if deletion.row_ids.is_empty() {
                        continue;
                    }
                    let sql = format!(
                        "DELETE FROM {} WHERE {} = ?1",
                        quote(&deletion.updates_table),
                        quote(&deletion.id_column),
                    );
                    let mut stmt = tx.prepare_cached(&sql)?;
                    for row_id in &deletion.row_ids {
                        removed += stmt.execute(params![row_id])?;
                    }
                }
                commit(tx)?;
                debug!(removed, "Deleted shadow rows");
                Ok(removed)
            })
            .await
    }

    #[instrument(skip(self, statements), fields(count = statements.len()))]
    async fn execute_statements(&self, statements: &[String]) -> Result<(), StoreError> {
        let statements = statements.to_vec();

        self.db
            .with_connection(move |conn| {
                let tx = begin(conn)?;
                for statement in &statements {
                    if let Err(e) = tx.execute_batch(statement) {
                        warn!(error = %e, statement = %statement, "Statement failed, rolling back");
                        return Err(StoreError::from(e));
                    }
                }
                commit(tx)
            })
            .await
    }
}
