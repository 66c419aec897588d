//! Search factory adapter.
//!
//! A [`SearchFactory`] is the handle applications hold: it owns the sync
//! cycle for a set of update descriptors, runs it in the background, and
//! passes direct index operations through the same serialized writer.

mod builder;

pub use builder::SearchFactoryBuilder;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{info, instrument, warn};

use crate::errors::PipelineError;
use crate::index::{IndexTransaction, IndexWork, IndexWriter};
use crate::orchestrator::{CycleReport, Orchestrator, SchedulerHandle};
use crate::registry::FactoryRegistry;
use crate::source::{store_failure, DeliveryMode, DEFAULT_BATCH_SIZE};
use crate::trigger::{TriggerDialect, TriggerSqlGenerator, TriggerStatements};
use search_sync_shared::{EntityDocument, EntityId, SearchQuery, SearchResponse};

/// Default factory name.
pub const DEFAULT_FACTORY_NAME: &str = "default";

/// Default delay between the end of one sync cycle and the start of the next.
pub const DEFAULT_UPDATE_DELAY: Duration = Duration::from_millis(500);

/// Who provides the runtime the sync cycle runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// The factory schedules its cycles on the runtime it is started from.
    #[default]
    Managed,
    /// The application supplies the runtime handle explicitly.
    UserManaged,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::Managed => f.write_str("managed"),
            TransactionMode::UserManaged => f.write_str("user"),
        }
    }
}

impl FromStr for TransactionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" => Ok(TransactionMode::Managed),
            "user" | "user-managed" | "user_managed" => Ok(TransactionMode::UserManaged),
            other => Err(PipelineError::configuration(format!(
                "Unknown transaction mode: {}",
                other
            ))),
        }
    }
}

/// Settings of one factory.
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub name: String,
    /// Rows read per shadow table and cycle.
    pub batch_size: usize,
    pub update_delay: Duration,
    pub transaction_mode: TransactionMode,
    pub delivery_mode: DeliveryMode,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_FACTORY_NAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            update_delay: DEFAULT_UPDATE_DELAY,
            transaction_mode: TransactionMode::default(),
            delivery_mode: DeliveryMode::default(),
        }
    }
}

impl FactoryConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_update_delay(mut self, update_delay: Duration) -> Self {
        self.update_delay = update_delay;
        self
    }

    pub fn with_transaction_mode(mut self, transaction_mode: TransactionMode) -> Self {
        self.transaction_mode = transaction_mode;
        self
    }

    pub fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }
}

/// Keeps a search index in sync with the captured changes of a database and
/// exposes the index to the application.
///
/// Built with [`SearchFactoryBuilder`]. Registered in its
/// [`FactoryRegistry`] from build until [`stop`](Self::stop).
pub struct SearchFactory {
    config: FactoryConfig,
    registry: Arc<FactoryRegistry>,
    orchestrator: Arc<Orchestrator>,
    writer: IndexWriter,
    runtime: Option<Handle>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    stopped: AtomicBool,
}

impl SearchFactory {
    pub fn builder() -> SearchFactoryBuilder {
        SearchFactoryBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    fn scheduler(&self) -> MutexGuard<'_, Option<SchedulerHandle>> {
        self.scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether background cycles are scheduled.
    pub fn is_running(&self) -> bool {
        self.scheduler()
            .as_ref()
            .is_some_and(|scheduler| !scheduler.is_finished())
    }

    /// Make sure the index exists and start the background sync cycle.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The scheduler is running
    /// * `Err(PipelineError::AlreadyRunning)` - If the factory was started before
    /// * `Err(PipelineError::ConfigurationError)` - If the factory was stopped
    ///   or no runtime is available
    #[instrument(skip(self), fields(factory = %self.config.name))]
    pub async fn start(&self) -> Result<(), PipelineError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PipelineError::configuration(format!(
                "Search factory {} has been stopped",
                self.config.name
            )));
        }
        if self.scheduler().is_some() {
            return Err(PipelineError::AlreadyRunning(self.config.name.clone()));
        }

        self.writer.provider().ensure_index_exists().await?;

        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|e| {
                PipelineError::configuration(format!("No runtime to schedule sync cycles: {}", e))
            })?,
        };

        // stop() may have run while the index was being prepared.
        let mut scheduler = self.scheduler();
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PipelineError::configuration(format!(
                "Search factory {} was stopped while starting",
                self.config.name
            )));
        }
        if scheduler.is_some() {
            return Err(PipelineError::AlreadyRunning(self.config.name.clone()));
        }
        *scheduler = Some(
            self.orchestrator
                .clone()
                .spawn(&runtime, self.config.update_delay),
        );

        info!(
            batch_size = self.config.batch_size,
            delay_ms = self.config.update_delay.as_millis() as u64,
            transaction_mode = %self.config.transaction_mode,
            delivery_mode = %self.config.delivery_mode,
            "Search factory started"
        );
        Ok(())
    }

    /// Stop background cycles and unregister the factory.
    ///
    /// Waits for a cycle in progress to finish. Calling this again does nothing.
    #[instrument(skip(self), fields(factory = %self.config.name))]
    pub async fn stop(&self) {
        let scheduler = {
            let mut scheduler = self.scheduler();
            if self.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            scheduler.take()
        };
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
        self.registry.unregister(&self.config.name);
        info!("Search factory stopped");
    }

    /// Run one sync cycle now, serialized with the background cycles.
    pub async fn poll_once(&self) -> Result<CycleReport, PipelineError> {
        self.orchestrator.run_cycle().await
    }

    /// Statements that install and remove change capture for the factory's
    /// descriptors.
    pub fn trigger_statements(
        &self,
        dialect: Box<dyn TriggerDialect>,
    ) -> Result<TriggerStatements, PipelineError> {
        TriggerSqlGenerator::new(dialect).generate_all(self.orchestrator.source().descriptors())
    }

    /// Create the shadow tables and triggers in the source database.
    ///
    /// All statements run in one transaction. Returns how many ran.
    #[instrument(skip(self, dialect), fields(dialect = dialect.name()))]
    pub async fn install_triggers(
        &self,
        dialect: Box<dyn TriggerDialect>,
    ) -> Result<usize, PipelineError> {
        let statements = self.trigger_statements(dialect)?;
        self.orchestrator
            .source()
            .store()
            .execute_statements(&statements.setup)
            .await
            .map_err(store_failure)?;
        info!(statements = statements.setup.len(), "Installed change capture");
        Ok(statements.setup.len())
    }

    /// Start an index transaction on the factory's writer.
    pub fn begin(&self) -> IndexTransaction {
        self.writer.begin()
    }

    async fn apply(&self, work: IndexWork) -> Result<usize, PipelineError> {
        Ok(self.writer.apply_one(work).await?)
    }

    pub async fn index(&self, documents: Vec<EntityDocument>) -> Result<usize, PipelineError> {
        self.apply(IndexWork::Index(documents)).await
    }

    pub async fn update(&self, documents: Vec<EntityDocument>) -> Result<usize, PipelineError> {
        self.apply(IndexWork::Update(documents)).await
    }

    pub async fn delete(
        &self,
        entity_type: impl Into<String>,
        ids: Vec<EntityId>,
    ) -> Result<usize, PipelineError> {
        self.apply(IndexWork::Delete {
            entity_type: entity_type.into(),
            ids,
        })
        .await
    }

    /// Delete every document matching `query`. Returns how many were removed.
    pub async fn delete_by_query(&self, query: SearchQuery) -> Result<usize, PipelineError> {
        self.apply(IndexWork::DeleteByQuery(query)).await
    }

    /// Delete every document of `entity_type`. Returns how many were removed.
    pub async fn purge_all(&self, entity_type: impl Into<String>) -> Result<usize, PipelineError> {
        self.apply(IndexWork::PurgeAll {
            entity_type: entity_type.into(),
        })
        .await
    }

    pub async fn query(&self, query: &SearchQuery) -> Result<SearchResponse, PipelineError> {
        Ok(self.writer.search(query).await?)
    }

    /// Number of documents matching `query`, ignoring its limit.
    pub async fn count(&self, query: &SearchQuery) -> Result<usize, PipelineError> {
        let query = query.clone().with_limit(0);
        Ok(self.writer.search(&query).await?.total)
    }
}

impl Drop for SearchFactory {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::SeqCst) && self.is_running() {
            warn!(
                factory = %self.config.name,
                "Search factory dropped while running, sync loop ends after the current cycle"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    use crate::trigger::SqliteDialect;
    use search_sync_repository::{
        EntityProvider, InMemorySearchIndex, SearchError, SearchIndexProvider, StoreError,
        UpdateDeletion, UpdateStore,
    };
    use search_sync_shared::{
        ColumnType, ColumnValue, EntityUpdateDescriptor, IdMapping, RawUpdateRow,
    };

    #[derive(Default)]
    struct RecordingStore {
        statements: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl UpdateStore for RecordingStore {
        async fn fetch_updates(
            &self,
            _descriptors: &[EntityUpdateDescriptor],
            _limit_per_table: usize,
        ) -> Result<Vec<RawUpdateRow>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_updates(&self, _deletions: &[UpdateDeletion]) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn execute_statements(&self, statements: &[String]) -> Result<(), StoreError> {
            self.statements
                .lock()
                .unwrap()
                .extend(statements.iter().cloned());
            Ok(())
        }
    }

    /// Blocks its first fetch until released, then hands out one insert row.
    #[derive(Default)]
    struct GatedStore {
        fetches: AtomicUsize,
        entered: Notify,
        release: Notify,
        acknowledged: StdMutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateStore for GatedStore {
        async fn fetch_updates(
            &self,
            _descriptors: &[EntityUpdateDescriptor],
            _limit_per_table: usize,
        ) -> Result<Vec<RawUpdateRow>, StoreError> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) > 0 {
                return Ok(Vec::new());
            }
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![RawUpdateRow::new("PlaceUpdates", 1, Some(0))
                .with_value("placeId", ColumnValue::Integer(1))])
        }

        async fn delete_updates(&self, deletions: &[UpdateDeletion]) -> Result<usize, StoreError> {
            let mut acknowledged = self.acknowledged.lock().unwrap();
            for deletion in deletions {
                acknowledged.extend(deletion.row_ids.iter().copied());
            }
            Ok(deletions.iter().map(|d| d.row_ids.len()).sum())
        }

        async fn execute_statements(&self, _statements: &[String]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Holds `ensure_index_exists` until released.
    #[derive(Default)]
    struct GatedIndex {
        inner: InMemorySearchIndex,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SearchIndexProvider for GatedIndex {
        async fn index_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError> {
            self.inner.index_documents(documents).await
        }

        async fn update_documents(&self, documents: &[EntityDocument]) -> Result<(), SearchError> {
            self.inner.update_documents(documents).await
        }

        async fn delete_documents(
            &self,
            entity_type: &str,
            ids: &[EntityId],
        ) -> Result<(), SearchError> {
            self.inner.delete_documents(entity_type, ids).await
        }

        async fn delete_by_query(&self, query: &SearchQuery) -> Result<usize, SearchError> {
            self.inner.delete_by_query(query).await
        }

        async fn purge_all(&self, entity_type: &str) -> Result<usize, SearchError> {
            self.inner.purge_all(entity_type).await
        }

        async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
            self.inner.search(query).await
        }

        async fn ensure_index_exists(&self) -> Result<(), SearchError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.ensure_index_exists().await
        }

        async fn health_check(&self) -> Result<bool, SearchError> {
            self.inner.health_check().await
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

    fn descriptor() -> EntityUpdateDescriptor {
        EntityUpdateDescriptor::new("Place", "PlaceUpdates")
            .with_id_mapping(IdMapping::new("Place").column("placeId", "id", ColumnType::Integer))
    }

    fn build_with(
        registry: &Arc<FactoryRegistry>,
        config: FactoryConfig,
        index: Arc<dyn SearchIndexProvider>,
        store: Arc<dyn UpdateStore>,
    ) -> Result<Arc<SearchFactory>, PipelineError> {
        SearchFactory::builder()
            .config(config)
            .registry(registry.clone())
            .index_provider(index)
            .entity_provider(Arc::new(NoEntities))
            .update_store(store)
            .descriptor(descriptor())
            .build()
    }

    fn build(
        registry: &Arc<FactoryRegistry>,
        config: FactoryConfig,
    ) -> (Arc<RecordingStore>, Result<Arc<SearchFactory>, PipelineError>) {
        let store = Arc::new(RecordingStore::default());
        let factory = build_with(
            registry,
            config,
            Arc::new(InMemorySearchIndex::new()),
            store.clone(),
        );
        (store, factory)
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let registry = Arc::new(FactoryRegistry::new());
        let (_store, factory) = build(&registry, FactoryConfig::default());
        let factory = factory.unwrap();

        factory.start().await.unwrap();
        assert!(factory.is_running());
        assert!(matches!(
            factory.start().await,
            Err(PipelineError::AlreadyRunning(_))
        ));

        factory.stop().await;
        factory.stop().await;
        assert!(!factory.is_running());
        assert!(registry.lookup(DEFAULT_FACTORY_NAME).is_none());
        assert!(matches!(
            factory.start().await,
            Err(PipelineError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_during_start_prevents_scheduling() {
        let registry = Arc::new(FactoryRegistry::new());
        let index = Arc::new(GatedIndex::default());
        let factory = build_with(
            &registry,
            FactoryConfig::default(),
            index.clone(),
            Arc::new(RecordingStore::default()),
        )
        .unwrap();

        let starting = tokio::spawn({
            let factory = factory.clone();
            async move { factory.start().await }
        });
        index.entered.notified().await;

        factory.stop().await;
        index.release.notify_one();

        let started = starting.await.unwrap();
        assert!(matches!(started, Err(PipelineError::ConfigurationError(_))));
        assert!(!factory.is_running());
        assert!(registry.lookup(DEFAULT_FACTORY_NAME).is_none());
    }

    #[tokio::test]
    async fn test_stop_waits_for_cycle_in_progress() {
        let registry = Arc::new(FactoryRegistry::new());
        let store = Arc::new(GatedStore::default());
        let factory = build_with(
            &registry,
            FactoryConfig::default(),
            Arc::new(InMemorySearchIndex::new()),
            store.clone(),
        )
        .unwrap();

        factory.start().await.unwrap();
        store.entered.notified().await;

        let stopping = tokio::spawn({
            let factory = factory.clone();
            async move { factory.stop().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished());
        assert!(store.acknowledged.lock().unwrap().is_empty());

        store.release.notify_one();
        stopping.await.unwrap();

        assert_eq!(*store.acknowledged.lock().unwrap(), vec![1]);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
        assert!(!factory.is_running());
    }

    #[tokio::test]
    async fn test_transaction_applies_on_commit_only() {
        let registry = Arc::new(FactoryRegistry::new());
        let (_store, factory) = build(&registry, FactoryConfig::default());
        let factory = factory.unwrap();
        let all = SearchQuery::all("Place");

        let mut tx = factory.begin();
        tx.index(vec![EntityDocument::new("Place", 1).with_field("name", "Mordor")]);
        assert_eq!(factory.count(&all).await.unwrap(), 0);
        assert_eq!(tx.commit().await.unwrap(), 1);
        assert_eq!(factory.count(&all).await.unwrap(), 1);

        let mut tx = factory.begin();
        tx.index(vec![EntityDocument::new("Place", 2)])
            .delete("Place", vec![EntityId::single(1)]);
        tx.rollback();
        let remaining = factory.query(&all).await.unwrap();
        assert_eq!(remaining.total, 1);
        assert_eq!(remaining.hits[0].id, EntityId::single(1));
    }

    #[tokio::test]
    async fn test_registry_rejects_duplicate_names() {
        let registry = Arc::new(FactoryRegistry::new());
        let config = FactoryConfig::default().with_name("places");
        let (_store, first) = build(&registry, config.clone());
        let first = first.unwrap();

        let (_store, second) = build(&registry, config.clone());
        assert!(matches!(second, Err(PipelineError::ConfigurationError(_))));
        assert_eq!(registry.names(), vec!["places".to_string()]);
        assert!(Arc::ptr_eq(&registry.lookup("places").unwrap(), &first));

        drop(first);
        assert!(registry.lookup("places").is_none());
        let (_store, third) = build(&registry, config);
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_user_managed_mode_requires_a_runtime_handle() {
        let registry = Arc::new(FactoryRegistry::new());
        let config = FactoryConfig::default().with_transaction_mode(TransactionMode::UserManaged);

        let (_store, without_handle) = build(&registry, config.clone());
        assert!(matches!(
            without_handle,
            Err(PipelineError::ConfigurationError(_))
        ));

        let factory = SearchFactory::builder()
            .config(config)
            .registry(registry.clone())
            .index_provider(Arc::new(InMemorySearchIndex::new()))
            .entity_provider(Arc::new(NoEntities))
            .update_store(Arc::new(RecordingStore::default()))
            .descriptor(descriptor())
            .runtime(Handle::current())
            .build()
            .unwrap();
        factory.start().await.unwrap();
        factory.stop().await;
    }

    #[tokio::test]
    async fn test_install_triggers_runs_setup_statements() {
        let registry = Arc::new(FactoryRegistry::new());
        let (store, factory) = build(&registry, FactoryConfig::default());
        let factory = factory.unwrap();

        let installed = factory
            .install_triggers(Box::new(SqliteDialect))
            .await
            .unwrap();

        let statements = store.statements.lock().unwrap().clone();
        assert_eq!(installed, 4);
        assert_eq!(statements.len(), 4);
        assert!(statements[0].contains("PlaceUpdates"));
    }

    #[tokio::test]
    async fn test_passthrough_operations() {
        let registry = Arc::new(FactoryRegistry::new());
        let (_store, factory) = build(&registry, FactoryConfig::default());
        let factory = factory.unwrap();

        factory
            .index(vec![
                EntityDocument::new("Place", 1).with_field("name", "Mordor"),
                EntityDocument::new("Place", 2).with_field("name", "Shire"),
                EntityDocument::new("Place", 3).with_field("name", "Gondor"),
            ])
            .await
            .unwrap();
        factory
            .update(vec![EntityDocument::new("Place", 3).with_field("name", "Rohan")])
            .await
            .unwrap();
        factory
            .delete("Place", vec![EntityId::single(1)])
            .await
            .unwrap();

        let all = SearchQuery::all("Place");
        assert_eq!(factory.count(&all).await.unwrap(), 2);
        let rohan = factory
            .query(&SearchQuery::term("Place", "name", "Rohan"))
            .await
            .unwrap();
        assert_eq!(rohan.total, 1);

        let removed = factory
            .delete_by_query(SearchQuery::term("Place", "name", "Shire"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(factory.purge_all("Place").await.unwrap(), 1);
        assert_eq!(factory.count(&all).await.unwrap(), 0);
    }

    #[test]
    fn test_transaction_mode_parsing() {
        assert_eq!(
            "managed".parse::<TransactionMode>().unwrap(),
            TransactionMode::Managed
        );
        assert_eq!(
            "USER".parse::<TransactionMode>().unwrap(),
            TransactionMode::UserManaged
        );
        assert!("jta".parse::<TransactionMode>().is_err());
    }
}
