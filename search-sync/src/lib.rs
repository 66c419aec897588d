//! # Search Sync
//!
//! Main library for the search sync service.
//!
//! This crate provides the configuration and wiring for running a search
//! factory against a SQLite database.

pub mod config;

pub use config::{Dependencies, DescriptorFile, IndexBackend, Settings};

use thiserror::Error;

/// Errors that can occur during startup or shutdown.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] search_sync_pipeline::PipelineError),

    /// Database error.
    #[error("Store error: {0}")]
    StoreError(#[from] search_sync_repository::StoreError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] search_sync_repository::SearchError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
