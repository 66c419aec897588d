//! Raw rows captured by the database triggers and the typed events derived from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::EntityId;

/// The kind of change a trigger captured.
///
/// The numeric codes are what the generated triggers write into the
/// event-case column of a shadow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCase {
    Insert,
    Update,
    Delete,
}

impl EventCase {
    /// All cases, in code order.
    pub const ALL: [EventCase; 3] = [EventCase::Insert, EventCase::Update, EventCase::Delete];

    /// The code stored in the shadow table.
    pub fn code(self) -> i64 {
        match self {
            EventCase::Insert => 0,
            EventCase::Update => 1,
            EventCase::Delete => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventCase::Insert => "insert",
            EventCase::Update => "update",
            EventCase::Delete => "delete",
        }
    }
}

impl fmt::Display for EventCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event-case code with no matching [`EventCase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown event case code: {0}")]
pub struct UnknownEventCase(pub i64);

impl TryFrom<i64> for EventCase {
    type Error = UnknownEventCase;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EventCase::Insert),
            1 => Ok(EventCase::Update),
            2 => Ok(EventCase::Delete),
            other => Err(UnknownEventCase(other)),
        }
    }
}

/// Value of one shadow-table cell as read from the database.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Text(String),
    /// A value of a storage type ids cannot have; holds the type name.
    Other(String),
}

/// One row of a shadow ("Updates") table.
///
/// Written by a trigger, read and deleted by the update source, never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpdateRow {
    /// The shadow table the row was read from.
    pub updates_table: String,
    /// Synthetic primary key of the row.
    pub row_id: i64,
    /// Values of the mapped id columns, keyed by shadow column name.
    pub values: BTreeMap<String, ColumnValue>,
    /// Raw event-case code; `None` if the column was null.
    pub case_code: Option<i64>,
}

impl RawUpdateRow {
    pub fn new(updates_table: impl Into<String>, row_id: i64, case_code: Option<i64>) -> Self {
        Self {
            updates_table: updates_table.into(),
            row_id,
            values: BTreeMap::new(),
            case_code,
        }
    }

    /// Set the value of a mapped id column.
    pub fn with_value(mut self, column: impl Into<String>, value: ColumnValue) -> Self {
        self.values.insert(column.into(), value);
        self
    }
}

/// A typed change of one entity, ready to be applied to the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateEvent {
    pub entity_type: String,
    pub id: EntityId,
    pub case: EventCase,
}

impl UpdateEvent {
    pub fn new(entity_type: impl Into<String>, id: EntityId, case: EventCase) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            case,
        }
    }
}
