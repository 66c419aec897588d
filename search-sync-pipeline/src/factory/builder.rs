use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::debug;

use super::{FactoryConfig, SearchFactory, TransactionMode};
use crate::dispatcher::{IndexUpdateDispatcher, UpdateConsumer};
use crate::errors::PipelineError;
use crate::index::IndexWriter;
use crate::orchestrator::Orchestrator;
use crate::registry::FactoryRegistry;
use crate::source::UpdateSource;
use search_sync_repository::{EntityProvider, SearchIndexProvider, UpdateStore};
use search_sync_shared::EntityUpdateDescriptor;

/// Assembles a [`SearchFactory`] from its collaborators.
#[derive(Default)]
pub struct SearchFactoryBuilder {
    config: Option<FactoryConfig>,
    registry: Option<Arc<FactoryRegistry>>,
    index_provider: Option<Arc<dyn SearchIndexProvider>>,
    entity_provider: Option<Arc<dyn EntityProvider>>,
    update_store: Option<Arc<dyn UpdateStore>>,
    descriptors: Vec<EntityUpdateDescriptor>,
    consumers: Vec<Arc<dyn UpdateConsumer>>,
    indexed_types: Option<Vec<String>>,
    runtime: Option<Handle>,
}

fn missing(what: &str) -> PipelineError {
    PipelineError::configuration(format!("Search factory requires {}", what))
}

impl SearchFactoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: FactoryConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn registry(mut self, registry: Arc<FactoryRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn index_provider(mut self, provider: Arc<dyn SearchIndexProvider>) -> Self {
        self.index_provider = Some(provider);
        self
    }

    pub fn entity_provider(mut self, provider: Arc<dyn EntityProvider>) -> Self {
        self.entity_provider = Some(provider);
        self
    }

    pub fn update_store(mut self, store: Arc<dyn UpdateStore>) -> Self {
        self.update_store = Some(store);
        self
    }

    pub fn descriptor(mut self, descriptor: EntityUpdateDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn descriptors(
        mut self,
        descriptors: impl IntoIterator<Item = EntityUpdateDescriptor>,
    ) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Also notify `consumer` of every dispatched batch of events.
    pub fn consumer(mut self, consumer: Arc<dyn UpdateConsumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    /// Restrict indexing to these entity types. Events for other types
    /// are skipped.
    pub fn indexed_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.indexed_types = Some(types.into_iter().collect());
        self
    }

    /// Runtime the sync cycles are scheduled on. Required in
    /// [`TransactionMode::UserManaged`].
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validate the configuration, build the factory and register it.
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<SearchFactory>)` - The registered, not yet started factory
    /// * `Err(PipelineError::ConfigurationError)` - If a collaborator is
    ///   missing, a descriptor is invalid or the name is taken
    pub fn build(self) -> Result<Arc<SearchFactory>, PipelineError> {
        let config = self.config.unwrap_or_default();
        let registry = self.registry.ok_or_else(|| missing("a registry"))?;
        let index_provider = self
            .index_provider
            .ok_or_else(|| missing("a search index provider"))?;
        let entity_provider = self
            .entity_provider
            .ok_or_else(|| missing("an entity provider"))?;
        let update_store = self.update_store.ok_or_else(|| missing("an update store"))?;

        if config.name.trim().is_empty() {
            return Err(PipelineError::configuration("Search factory name is empty"));
        }
        if self.descriptors.is_empty() {
            return Err(missing("at least one update descriptor"));
        }
        if config.transaction_mode == TransactionMode::UserManaged && self.runtime.is_none() {
            return Err(PipelineError::configuration(format!(
                "Search factory {} uses user-managed transactions but no runtime was given",
                config.name
            )));
        }

        let source = UpdateSource::new(update_store, self.descriptors)?
            .with_batch_size(config.batch_size);
        let writer = IndexWriter::new(index_provider);

        let mut dispatcher = IndexUpdateDispatcher::new(entity_provider, writer.clone());
        if let Some(types) = self.indexed_types {
            dispatcher = dispatcher.with_indexed_types(types);
        }

        let mut orchestrator =
            Orchestrator::new(source, dispatcher).with_delivery_mode(config.delivery_mode);
        for consumer in self.consumers {
            orchestrator = orchestrator.with_consumer(consumer);
        }

        debug!(
            factory = %config.name,
            descriptors = orchestrator.source().descriptors().len(),
            "Built search factory"
        );

        let factory = Arc::new(SearchFactory {
            config,
            registry: registry.clone(),
            orchestrator: Arc::new(orchestrator),
            writer,
            runtime: self.runtime,
            scheduler: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        registry.register(&factory)?;
        Ok(factory)
    }
}
