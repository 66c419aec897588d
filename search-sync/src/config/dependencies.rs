//! Dependency initialization and wiring for the search sync service.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use super::{DescriptorFile, IndexBackend, Settings};
use crate::SyncError;
use search_sync_pipeline::{dialect_for_name, FactoryRegistry, SearchFactory};
use search_sync_repository::{
    InMemorySearchIndex, OpenSearchIndex, SearchIndexConfig, SearchIndexProvider, SqliteDatabase,
    SqliteEntityProvider, SqliteUpdateStore,
};

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub registry: Arc<FactoryRegistry>,
    /// The configured factory, not yet started.
    pub factory: Arc<SearchFactory>,
}

impl Dependencies {
    /// Initialize all dependencies from `settings`.
    ///
    /// Opens the database, loads the descriptor file, connects the search
    /// index and installs the triggers if configured to.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(SyncError)` - If initialization fails
    pub async fn new(settings: &Settings) -> Result<Self, SyncError> {
        info!(
            factory = %settings.factory.name,
            database = %settings.database_path.display(),
            descriptors = %settings.descriptors_path.display(),
            index_backend = %settings.index_backend,
            "Initializing dependencies"
        );

        let descriptors = DescriptorFile::load(&settings.descriptors_path)?;
        let db = SqliteDatabase::open(&settings.database_path)?;
        let index = Self::index_provider(settings).await?;

        Self::wire(settings, db, index, descriptors).await
    }

    async fn index_provider(
        settings: &Settings,
    ) -> Result<Arc<dyn SearchIndexProvider>, SyncError> {
        match settings.index_backend {
            IndexBackend::Memory => Ok(Arc::new(InMemorySearchIndex::new())),
            IndexBackend::OpenSearch => {
                let config = SearchIndexConfig::with_index_name(&settings.opensearch_index);
                let client = OpenSearchIndex::new(&settings.opensearch_url, config)
                    .await
                    .map_err(|e| {
                        SyncError::config(format!("Failed to create OpenSearch client: {}", e))
                    })?;

                let healthy = client.health_check().await.map_err(|e| {
                    SyncError::config(format!("OpenSearch health check failed: {}", e))
                })?;
                if !healthy {
                    return Err(SyncError::config("OpenSearch cluster is unhealthy"));
                }

                info!(url = %settings.opensearch_url, "OpenSearch connection verified");
                Ok(Arc::new(client))
            }
        }
    }

    /// Build and register the factory over already opened collaborators.
    pub async fn wire(
        settings: &Settings,
        db: SqliteDatabase,
        index: Arc<dyn SearchIndexProvider>,
        descriptors: DescriptorFile,
    ) -> Result<Self, SyncError> {
        let registry = Arc::new(FactoryRegistry::new());
        let indexed_types = descriptors.indexed_types();
        let entity_provider = SqliteEntityProvider::new(db.clone(), descriptors.entities);

        let factory = SearchFactory::builder()
            .config(settings.factory.clone())
            .registry(registry.clone())
            .index_provider(index)
            .entity_provider(Arc::new(entity_provider))
            .update_store(Arc::new(SqliteUpdateStore::new(db)))
            .descriptors(descriptors.updates)
            .indexed_types(indexed_types)
            .runtime(Handle::current())
            .build()?;

        if settings.install_triggers {
            let dialect = dialect_for_name(&settings.trigger_dialect)?;
            factory.install_triggers(dialect).await?;
        }

        Ok(Self { registry, factory })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_shared::SearchQuery;

    const DESCRIPTORS: &str = r#"
        [[entity]]
        name = "Book"
        table = "books"
        id_columns = ["id"]

        [[updates]]
        original_table = "books"
        updates_table = "BookUpdates"

        [[updates.id_mapping]]
        entity_type = "Book"
        columns = ["bookId"]
        columns_in_original = ["id"]
        column_types = ["integer"]
    "#;

    fn settings() -> Settings {
        Settings::from_lookup(|key| match key {
            "SEARCH_SYNC_FACTORY_NAME" => Some("library".to_string()),
            "SEARCH_SYNC_UPDATE_DELAY_MS" => Some("10".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_wire_installs_triggers_and_syncs() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE books (id INTEGER PRIMARY KEY, title TEXT)")
            .await
            .unwrap();
        let index = Arc::new(InMemorySearchIndex::new());

        let deps = Dependencies::wire(
            &settings(),
            db.clone(),
            index.clone(),
            DescriptorFile::parse(DESCRIPTORS).unwrap(),
        )
        .await
        .unwrap();
        assert!(deps.registry.lookup("library").is_some());

        db.execute_batch("INSERT INTO books (id, title) VALUES (1, 'The Hobbit')")
            .await
            .unwrap();
        deps.factory.poll_once().await.unwrap();

        let hits = deps
            .factory
            .query(&SearchQuery::text("Book", "hobbit"))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
    }

    #[tokio::test]
    async fn test_unknown_dialect_fails() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let mut settings = settings();
        settings.trigger_dialect = "oracle".to_string();

        let result = Dependencies::wire(
            &settings,
            db,
            Arc::new(InMemorySearchIndex::new()),
            DescriptorFile::parse(DESCRIPTORS).unwrap(),
        )
        .await;
        assert!(matches!(result, Err(SyncError::PipelineError(_))));
    }
}
