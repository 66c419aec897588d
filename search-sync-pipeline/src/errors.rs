//! Pipeline error types.

use thiserror::Error;

use search_sync_repository::{SearchError, StoreError};
use search_sync_shared::DescriptorError;

/// Errors raised by the sync pipeline.
///
/// Configuration errors are fatal at build or start time. Translation errors
/// only skip the offending row. Index application errors are isolated to one
/// entity type. Transaction and store errors fail the current cycle.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Bad or missing metadata, duplicate factory name, unsupported dialect.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A shadow row could not be turned into update events.
    #[error("Translation error in {updates_table} row {row_id}: {message}")]
    TranslationError {
        updates_table: String,
        row_id: i64,
        message: String,
    },

    /// The index rejected the work for one entity type.
    #[error("Index application error for {entity_type}: {message}")]
    IndexApplicationError {
        entity_type: String,
        message: String,
    },

    /// Beginning, committing or rolling back a transaction failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    /// The factory is already running.
    #[error("Factory {0} is already running")]
    AlreadyRunning(String),
}

impl PipelineError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Create a translation error for one shadow row.
    pub fn translation(
        updates_table: impl Into<String>,
        row_id: i64,
        msg: impl Into<String>,
    ) -> Self {
        Self::TranslationError {
            updates_table: updates_table.into(),
            row_id,
            message: msg.into(),
        }
    }

    /// Create an index application error.
    pub fn index_application(entity_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::IndexApplicationError {
            entity_type: entity_type.into(),
            message: msg.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::TransactionError(msg.into())
    }
}

impl From<DescriptorError> for PipelineError {
    fn from(err: DescriptorError) -> Self {
        Self::ConfigurationError(err.to_string())
    }
}
