//! Applies batches of update events to the search index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, instrument};

use crate::errors::PipelineError;
use crate::index::IndexWriter;
use search_sync_repository::EntityProvider;
use search_sync_shared::{EntityId, EventCase, UpdateEvent};

/// Receives every batch of update events the pipeline dispatches.
///
/// Implement this to react to changes besides the index update, e.g. cache
/// invalidation. Errors are logged by the caller and never stop the cycle.
#[async_trait]
pub trait UpdateConsumer: Send + Sync {
    async fn updated(&self, events: &[UpdateEvent]) -> Result<(), PipelineError>;
}

/// Failure to apply the events of one entity type.
#[derive(Debug, Clone)]
pub struct TypeFailure {
    pub entity_type: String,
    pub ids: Vec<EntityId>,
    pub error: PipelineError,
}

/// Outcome of one [`IndexUpdateDispatcher::update_events`] call.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Documents reloaded and replaced in the index.
    pub updated: usize,
    /// Documents removed, including demoted updates.
    pub deleted: usize,
    /// Insert or update targets that no longer exist and were deleted instead.
    pub demoted: usize,
    /// Events for types that are not indexed.
    pub skipped: usize,
    pub failed: Vec<TypeFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_types(&self) -> HashSet<&str> {
        self.failed.iter().map(|f| f.entity_type.as_str()).collect()
    }
}

/// Events of one entity type, one case per id.
#[derive(Default)]
struct TypeBatch {
    ids: Vec<EntityId>,
    cases: HashMap<EntityId, EventCase>,
}

impl TypeBatch {
    /// The last case observed for an id wins; the id keeps its first position.
    fn record(&mut self, id: &EntityId, case: EventCase) {
        if self.cases.insert(id.clone(), case).is_none() {
            self.ids.push(id.clone());
        }
    }

    fn split(&self) -> (Vec<EntityId>, Vec<EntityId>) {
        self.ids
            .iter()
            .cloned()
            .partition(|id| self.cases.get(id) == Some(&EventCase::Delete))
    }
}

/// Group events by entity type in order of first appearance.
fn partition(events: &[UpdateEvent]) -> Vec<(String, TypeBatch)> {
    let mut batches: Vec<(String, TypeBatch)> = Vec::new();
    for event in events {
        let position = match batches.iter().position(|(t, _)| *t == event.entity_type) {
            Some(position) => position,
            None => {
                batches.push((event.entity_type.clone(), TypeBatch::default()));
                batches.len() - 1
            }
        };
        batches[position].1.record(&event.id, event.case);
    }
    batches
}

#[derive(Default)]
struct TypeOutcome {
    updated: usize,
    deleted: usize,
    demoted: usize,
}

/// Loads the current state of changed entities and writes it to the index.
///
/// Delete events remove documents by id. Insert and update events reload
/// their entities with one batched lookup per type and replace the indexed
/// documents; entities that no longer exist are deleted instead. Each type
/// is applied in its own index transaction before the next type starts, and
/// a failure only affects that type.
#[derive(Clone)]
pub struct IndexUpdateDispatcher {
    entity_provider: Arc<dyn EntityProvider>,
    writer: IndexWriter,
    indexed_types: Option<Arc<HashSet<String>>>,
}

impl IndexUpdateDispatcher {
    pub fn new(entity_provider: Arc<dyn EntityProvider>, writer: IndexWriter) -> Self {
        Self {
            entity_provider,
            writer,
            indexed_types: None,
        }
    }

    /// Only dispatch events for the given types.
    pub fn with_indexed_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.indexed_types = Some(Arc::new(types.into_iter().collect()));
        self
    }

    pub fn is_indexed(&self, entity_type: &str) -> bool {
        self.indexed_types
            .as_ref()
            .map(|types| types.contains(entity_type))
            .unwrap_or(true)
    }

    /// Apply a batch of events.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn update_events(&self, events: &[UpdateEvent]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (entity_type, batch) in partition(events) {
            if !self.is_indexed(&entity_type) {
                debug!(
                    entity_type = %entity_type,
                    count = batch.ids.len(),
                    "Skipping events for type that is not indexed"
                );
                report.skipped += batch.ids.len();
                continue;
            }

            match self.apply_type(&entity_type, &batch).await {
                Ok(outcome) => {
                    report.updated += outcome.updated;
                    report.deleted += outcome.deleted;
                    report.demoted += outcome.demoted;
                }
                Err(e) => {
                    let cases: Vec<String> = batch
                        .ids
                        .iter()
                        .map(|id| {
                            let case = batch.cases.get(id).map(|c| c.as_str()).unwrap_or("?");
                            format!("{}={}", id, case)
                        })
                        .collect();
                    error!(
                        entity_type = %entity_type,
                        events = ?cases,
                        error = %e,
                        "Failed to apply updates for entity type"
                    );
                    report.failed.push(TypeFailure {
                        entity_type,
                        ids: batch.ids,
                        error: e,
                    });
                }
            }
        }

        debug!(
            updated = report.updated,
            deleted = report.deleted,
            demoted = report.demoted,
            failed = report.failed.len(),
            "Dispatched update events"
        );
        report
    }

    async fn apply_type(
        &self,
        entity_type: &str,
        batch: &TypeBatch,
    ) -> Result<TypeOutcome, PipelineError> {
        let (mut deletes, upserts) = batch.split();
        let mut outcome = TypeOutcome::default();

        let mut documents = Vec::with_capacity(upserts.len());
        if !upserts.is_empty() {
            let loaded = self
                .entity_provider
                .get_batch(entity_type, &upserts)
                .await
                .map_err(|e| PipelineError::index_application(entity_type, e.to_string()))?;
            if loaded.len() != upserts.len() {
                return Err(PipelineError::index_application(
                    entity_type,
                    format!(
                        "entity provider returned {} results for {} ids",
                        loaded.len(),
                        upserts.len()
                    ),
                ));
            }

            for (id, doc) in upserts.into_iter().zip(loaded) {
                match doc {
                    Some(doc) => documents.push(doc),
                    None => {
                        debug!(entity_type, id = %id, "Entity no longer exists, deleting from index");
                        outcome.demoted += 1;
                        deletes.push(id);
                    }
                }
            }
        }

        outcome.deleted = deletes.len();
        outcome.updated = documents.len();

        let mut tx = self.writer.begin();
        tx.delete(entity_type, deletes).update(documents);
        tx.commit()
            .await
            .map_err(|e| PipelineError::index_application(entity_type, e.to_string()))?;

        Ok(outcome)
    }
}

#[async_trait]
impl UpdateConsumer for IndexUpdateDispatcher {
    async fn updated(&self, events: &[UpdateEvent]) -> Result<(), PipelineError> {
        let report = self.update_events(events).await;
        match report.failed.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }
}
