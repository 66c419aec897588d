//! Polls the shadow tables for captured changes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::errors::PipelineError;
use crate::translator::UpdateEventTranslator;
use search_sync_repository::{StoreError, UpdateDeletion, UpdateStore};
use search_sync_shared::{EntityUpdateDescriptor, RawUpdateRow, UpdateEvent};

/// Default number of rows read from each shadow table per poll.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// When consumed shadow rows are deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Delete rows after their events were applied. Rows whose entity type
    /// failed stay in the shadow table and are redelivered.
    #[default]
    AtLeastOnce,
    /// Delete rows right after reading them. Failed updates are lost.
    AtMostOnce,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::AtLeastOnce => f.write_str("at-least-once"),
            DeliveryMode::AtMostOnce => f.write_str("at-most-once"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "at-least-once" => Ok(DeliveryMode::AtLeastOnce),
            "at-most-once" => Ok(DeliveryMode::AtMostOnce),
            other => Err(PipelineError::configuration(format!(
                "Unknown delivery mode: {}",
                other
            ))),
        }
    }
}

/// Map store failures, keeping transaction failures distinct.
pub(crate) fn store_failure(err: StoreError) -> PipelineError {
    if err.is_transaction() {
        PipelineError::transaction(err.to_string())
    } else {
        PipelineError::StoreError(err)
    }
}

/// Reads, translates and deletes shadow rows.
///
/// Only one poll may run against the same shadow tables at a time; the
/// orchestrator guarantees that.
pub struct UpdateSource {
    store: Arc<dyn UpdateStore>,
    descriptors: Vec<EntityUpdateDescriptor>,
    by_table: HashMap<String, usize>,
    translator: UpdateEventTranslator,
    batch_size: usize,
}

impl UpdateSource {
    /// Create a source for the given descriptors.
    ///
    /// Fails with a configuration error if a descriptor is invalid or two
    /// descriptors share a shadow table.
    pub fn new(
        store: Arc<dyn UpdateStore>,
        descriptors: Vec<EntityUpdateDescriptor>,
    ) -> Result<Self, PipelineError> {
        let mut by_table = HashMap::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            descriptor.validate()?;
            if by_table
                .insert(descriptor.updates_table.clone(), position)
                .is_some()
            {
                return Err(PipelineError::configuration(format!(
                    "Shadow table {} is described more than once",
                    descriptor.updates_table
                )));
            }
        }

        Ok(Self {
            store,
            descriptors,
            by_table,
            translator: UpdateEventTranslator::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Rows read per shadow table and poll. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn descriptors(&self) -> &[EntityUpdateDescriptor] {
        &self.descriptors
    }

    pub fn store(&self) -> &Arc<dyn UpdateStore> {
        &self.store
    }

    fn descriptor_for(&self, updates_table: &str) -> Option<&EntityUpdateDescriptor> {
        self.by_table
            .get(updates_table)
            .map(|&position| &self.descriptors[position])
    }

    /// Read the next batch: up to `batch_size` rows from every shadow table,
    /// oldest first, grouped by table in descriptor order.
    #[instrument(skip(self))]
    pub async fn get_updates(&self) -> Result<Vec<RawUpdateRow>, PipelineError> {
        let rows = self
            .store
            .fetch_updates(&self.descriptors, self.batch_size)
            .await
            .map_err(store_failure)?;
        debug!(count = rows.len(), "Fetched shadow rows");
        Ok(rows)
    }

    /// Translate rows into events, one result per row.
    pub fn get_update_events(
        &self,
        rows: &[RawUpdateRow],
    ) -> Vec<Result<Vec<UpdateEvent>, PipelineError>> {
        rows.iter()
            .map(|row| match self.descriptor_for(&row.updates_table) {
                Some(descriptor) => self.translator.to_update_events(row, descriptor),
                None => Err(PipelineError::translation(
                    &row.updates_table,
                    row.row_id,
                    "no descriptor for shadow table",
                )),
            })
            .collect()
    }

    /// Delete consumed rows from their shadow tables in one transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of rows removed
    /// * `Err(PipelineError)` - If the delete failed; no row is removed then
    pub async fn delete_updates<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a RawUpdateRow>,
    ) -> Result<usize, PipelineError> {
        let mut grouped: BTreeMap<usize, Vec<i64>> = BTreeMap::new();
        for row in rows {
            match self.by_table.get(&row.updates_table) {
                Some(&position) => grouped.entry(position).or_default().push(row.row_id),
                None => warn!(
                    updates_table = %row.updates_table,
                    row_id = row.row_id,
                    "Cannot delete row of unknown shadow table"
                ),
            }
        }
        if grouped.is_empty() {
            return Ok(0);
        }

        let deletions: Vec<UpdateDeletion> = grouped
            .into_iter()
            .map(|(position, row_ids)| {
                let descriptor = &self.descriptors[position];
                UpdateDeletion {
                    updates_table: descriptor.updates_table.clone(),
                    id_column: descriptor.id_column.clone(),
                    row_ids,
                }
            })
            .collect();

        let removed = self
            .store
            .delete_updates(&deletions)
            .await
            .map_err(store_failure)?;
        debug!(removed, "Deleted consumed shadow rows");
        Ok(removed)
    }
}
