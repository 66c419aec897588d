//! Update store trait definition.

use async_trait::async_trait;

use crate::errors::StoreError;
use search_sync_shared::{EntityUpdateDescriptor, RawUpdateRow};

/// Shadow rows to delete from one updates table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDeletion {
    pub updates_table: String,
    /// Synthetic primary key column of the table.
    pub id_column: String,
    pub row_ids: Vec<i64>,
}

/// Access to the shadow tables written by the generated triggers.
#[async_trait]
pub trait UpdateStore: Send + Sync {
    /// Read pending rows.
    ///
    /// At most `limit_per_table` rows are read from each descriptor's
    /// updates table, oldest first. Rows are returned grouped by descriptor,
    /// in descriptor order. All tables are read in one transaction.
    async fn fetch_updates(
        &self,
        descriptors: &[EntityUpdateDescriptor],
        limit_per_table: usize,
    ) -> Result<Vec<RawUpdateRow>, StoreError>;

    /// Delete consumed rows in one transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - The number of rows removed
    /// * `Err(StoreError)` - If any delete fails; no row is removed then
    async fn delete_updates(&self, deletions: &[UpdateDeletion]) -> Result<usize, StoreError>;

    /// Run DDL statements (shadow tables, triggers) in one transaction.
    async fn execute_statements(&self, statements: &[String]) -> Result<(), StoreError>;
}
