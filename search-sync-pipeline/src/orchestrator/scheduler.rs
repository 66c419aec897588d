//! Fixed-delay scheduling of sync cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::Orchestrator;

/// Handle to a running cycle loop.
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop scheduling and wait for the loop to exit. Dropping the handle
    /// also ends the loop, without waiting.
    ///
    /// A cycle that is already running completes before this returns; the
    /// shutdown signal is only observed between cycles.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "Sync loop terminated abnormally");
        }
    }
}

pub(super) fn spawn(
    orchestrator: Arc<Orchestrator>,
    handle: &Handle,
    delay: Duration,
) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    let task = handle.spawn(async move {
        info!(delay_ms = delay.as_millis() as u64, "Starting sync loop");
        loop {
            if let Err(e) = orchestrator.run_cycle().await {
                error!(error = %e, "Sync cycle failed");
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("Received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Sync loop stopped");
    });

    SchedulerHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::dispatcher::IndexUpdateDispatcher;
    use crate::index::IndexWriter;
    use crate::source::UpdateSource;
    use search_sync_repository::{
        EntityProvider, InMemorySearchIndex, StoreError, UpdateDeletion, UpdateStore,
    };
    use search_sync_shared::{
        ColumnType, EntityDocument, EntityId, EntityUpdateDescriptor, IdMapping, RawUpdateRow,
    };

    /// Counts polls; always empty.
    #[derive(Default)]
    struct PollCounter {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl UpdateStore for PollCounter {
        async fn fetch_updates(
            &self,
            _descriptors: &[EntityUpdateDescriptor],
            _limit_per_table: usize,
        ) -> Result<Vec<RawUpdateRow>, StoreError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn delete_updates(&self, _deletions: &[UpdateDeletion]) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn execute_statements(&self, _statements: &[String]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct NoEntities;

    #[async_trait]
    impl EntityProvider for NoEntities {
        async fn get(
            &self,
            _entity_type: &str,
            _id: &EntityId,
        ) -> Result<Option<EntityDocument>, StoreError> {
            Ok(None)
        }

        async fn get_batch(
            &self,
            _entity_type: &str,
            ids: &[EntityId],
        ) -> Result<Vec<Option<EntityDocument>>, StoreError> {
            Ok(vec![None; ids.len()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_loop_stops() {
        let store = Arc::new(PollCounter::default());
        let descriptor = EntityUpdateDescriptor::new("Place", "PlaceUpdates")
            .with_id_mapping(IdMapping::new("Place").column("placeId", "id", ColumnType::Integer));
        let source = UpdateSource::new(store.clone(), vec![descriptor]).unwrap();
        let dispatcher = IndexUpdateDispatcher::new(
            Arc::new(NoEntities),
            IndexWriter::new(Arc::new(InMemorySearchIndex::new())),
        );
        let orchestrator = Arc::new(Orchestrator::new(source, dispatcher));

        let handle = orchestrator.spawn(&Handle::current(), Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(1_250)).await;
        handle.stop().await;

        let polls = store.polls.load(Ordering::SeqCst);
        assert_eq!(polls, 3);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(store.polls.load(Ordering::SeqCst), polls);
    }
}
