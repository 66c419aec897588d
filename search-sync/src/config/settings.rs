//! Settings read from environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::SyncError;
use search_sync_pipeline::{DeliveryMode, FactoryConfig, TransactionMode};

/// Default path of the SQLite database.
const DEFAULT_DATABASE_PATH: &str = "search-sync.db";

/// Default path of the descriptor file.
const DEFAULT_DESCRIPTORS_PATH: &str = "descriptors.toml";

/// Default trigger dialect.
const DEFAULT_TRIGGER_DIALECT: &str = "sqlite";

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default OpenSearch index name.
const DEFAULT_OPENSEARCH_INDEX: &str = "entities";

/// The only supported update source.
const SQL_SOURCE_TYPE: &str = "sql";

/// Where documents are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexBackend {
    #[default]
    Memory,
    OpenSearch,
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBackend::Memory => f.write_str("memory"),
            IndexBackend::OpenSearch => f.write_str("opensearch"),
        }
    }
}

impl FromStr for IndexBackend {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(IndexBackend::Memory),
            "opensearch" => Ok(IndexBackend::OpenSearch),
            other => Err(SyncError::config(format!("Unknown index backend: {}", other))),
        }
    }
}

/// Service settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub factory: FactoryConfig,
    pub trigger_dialect: String,
    pub database_path: PathBuf,
    pub descriptors_path: PathBuf,
    /// Create shadow tables and triggers at startup.
    pub install_triggers: bool,
    pub index_backend: IndexBackend,
    pub opensearch_url: String,
    pub opensearch_index: String,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `SEARCH_SYNC_FACTORY_NAME`: Factory name (default: default)
    /// - `SEARCH_SYNC_SOURCE_TYPE`: Update source, only `sql` is supported (default: sql)
    /// - `SEARCH_SYNC_BATCH_SIZE`: Rows per shadow table and cycle (default: 5)
    /// - `SEARCH_SYNC_UPDATE_DELAY_MS`: Delay between cycles (default: 500)
    /// - `SEARCH_SYNC_TRIGGER_DIALECT`: sqlite, mysql or postgres (default: sqlite)
    /// - `SEARCH_SYNC_TRANSACTION_MODE`: managed or user (default: managed)
    /// - `SEARCH_SYNC_DELIVERY`: at-least-once or at-most-once (default: at-least-once)
    /// - `SEARCH_SYNC_DATABASE_PATH`: SQLite database file (default: search-sync.db)
    /// - `SEARCH_SYNC_DESCRIPTORS`: Descriptor file (default: descriptors.toml)
    /// - `SEARCH_SYNC_INSTALL_TRIGGERS`: Install triggers at startup (default: true)
    /// - `SEARCH_SYNC_INDEX_BACKEND`: memory or opensearch (default: memory)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_INDEX`: OpenSearch index name (default: entities)
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let source_type = get("SEARCH_SYNC_SOURCE_TYPE").unwrap_or_else(|| SQL_SOURCE_TYPE.into());
        if !source_type.trim().eq_ignore_ascii_case(SQL_SOURCE_TYPE) {
            return Err(SyncError::config(format!(
                "Unsupported update source type: {}",
                source_type
            )));
        }

        let mut factory = FactoryConfig::default();
        if let Some(name) = get("SEARCH_SYNC_FACTORY_NAME") {
            factory.name = name;
        }
        if let Some(batch_size) = get("SEARCH_SYNC_BATCH_SIZE") {
            factory.batch_size = parse_number("SEARCH_SYNC_BATCH_SIZE", &batch_size)?;
            if factory.batch_size == 0 {
                return Err(SyncError::config("SEARCH_SYNC_BATCH_SIZE must be positive"));
            }
        }
        if let Some(delay) = get("SEARCH_SYNC_UPDATE_DELAY_MS") {
            factory.update_delay =
                Duration::from_millis(parse_number("SEARCH_SYNC_UPDATE_DELAY_MS", &delay)?);
        }
        if let Some(mode) = get("SEARCH_SYNC_TRANSACTION_MODE") {
            factory.transaction_mode = mode
                .parse::<TransactionMode>()
                .map_err(|e| SyncError::config(e.to_string()))?;
        }
        if let Some(delivery) = get("SEARCH_SYNC_DELIVERY") {
            factory.delivery_mode = delivery
                .parse::<DeliveryMode>()
                .map_err(|e| SyncError::config(e.to_string()))?;
        }

        let install_triggers = match get("SEARCH_SYNC_INSTALL_TRIGGERS") {
            Some(value) => parse_bool("SEARCH_SYNC_INSTALL_TRIGGERS", &value)?,
            None => true,
        };

        let index_backend = match get("SEARCH_SYNC_INDEX_BACKEND") {
            Some(value) => value.parse()?,
            None => IndexBackend::default(),
        };

        Ok(Self {
            factory,
            trigger_dialect: get("SEARCH_SYNC_TRIGGER_DIALECT")
                .unwrap_or_else(|| DEFAULT_TRIGGER_DIALECT.to_string()),
            database_path: get("SEARCH_SYNC_DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
                .into(),
            descriptors_path: get("SEARCH_SYNC_DESCRIPTORS")
                .unwrap_or_else(|| DEFAULT_DESCRIPTORS_PATH.to_string())
                .into(),
            install_triggers,
            index_backend,
            opensearch_url: get("OPENSEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            opensearch_index: get("OPENSEARCH_INDEX")
                .unwrap_or_else(|| DEFAULT_OPENSEARCH_INDEX.to_string()),
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, SyncError> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::config(format!("{} is not a valid number: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SyncError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SyncError::config(format!("{} is not a boolean: {}", key, value))),
    }
}
