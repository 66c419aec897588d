//! SQLite implementations of the relational collaborators.
//!
//! One [`SqliteDatabase`] handle is shared by the update store and the
//! entity provider. Statements run on the blocking thread pool while holding
//! the connection lock, so async callers never block the runtime.

mod entity_provider;
mod update_store;

use std::path::Path;
use std::sync::Arc;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::errors::StoreError;
use search_sync_shared::{ColumnValue, IdValue};

pub use entity_provider::{EntityTable, SqliteEntityProvider};
pub use update_store::SqliteUpdateStore;

/// Shared handle to a SQLite connection.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open (or create) a database file with WAL journaling and foreign keys enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "foreign_keys", "on")?;

        info!(path = %path.display(), "Opened SQLite database");
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "on")?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with exclusive access to the connection on the blocking pool.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::task(e.to_string()))?
    }

    /// Execute one or more statements separated by semicolons.
    pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<(), StoreError> {
        let sql = sql.into();
        self.with_connection(move |conn| conn.execute_batch(&sql).map_err(StoreError::from))
            .await
    }
}

/// Quote an identifier for use in generated statements.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub(crate) fn column_value(value: ValueRef<'_>) -> ColumnValue {
    match value {
        ValueRef::Null => ColumnValue::Null,
        ValueRef::Integer(i) => ColumnValue::Integer(i),
        ValueRef::Text(bytes) => ColumnValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Real(_) => ColumnValue::Other("real".to_string()),
        ValueRef::Blob(_) => ColumnValue::Other("blob".to_string()),
    }
}

pub(crate) fn sql_value(value: &IdValue) -> SqlValue {
    match value {
        IdValue::Integer(i) => SqlValue::Integer(*i),
        IdValue::Text(s) => SqlValue::Text(s.clone()),
    }
}
