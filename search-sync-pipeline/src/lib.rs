//! # Search Sync Pipeline
//!
//! This crate keeps a search index in sync with relational data through
//! database triggers.
//!
//! ## Architecture
//!
//! 1. **Trigger**: Generates shadow tables and row triggers that record the
//!    ids of changed rows
//! 2. **Source**: Polls the shadow tables in bounded batches
//! 3. **Translator**: Turns shadow rows into typed update events
//! 4. **Dispatcher**: Loads the current entities and applies the events to
//!    the search index
//! 5. **Orchestrator**: Runs the cycle on a fixed delay
//! 6. **Factory**: The application-facing handle, registered by name

pub mod dispatcher;
pub mod errors;
pub mod factory;
pub mod index;
pub mod orchestrator;
pub mod registry;
pub mod source;
pub mod translator;
pub mod trigger;

pub use dispatcher::{DispatchReport, IndexUpdateDispatcher, TypeFailure, UpdateConsumer};
pub use errors::PipelineError;
pub use factory::{FactoryConfig, SearchFactory, SearchFactoryBuilder, TransactionMode};
pub use index::{IndexTransaction, IndexWork, IndexWriter};
pub use orchestrator::{CycleReport, Orchestrator, SchedulerHandle};
pub use registry::FactoryRegistry;
pub use source::{DeliveryMode, UpdateSource};
pub use translator::UpdateEventTranslator;
pub use trigger::{
    dialect_for_name, MySqlDialect, PostgresDialect, SqliteDialect, TriggerDialect,
    TriggerSqlGenerator, TriggerStatements,
};
