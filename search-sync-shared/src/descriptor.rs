//! Static metadata describing which tables are monitored and how their shadow
//! tables map back to entities.
//!
//! Descriptors are built once at startup, either in code through the builder
//! methods or deserialized from a configuration file, and are immutable
//! afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default name of the synthetic primary key column of a shadow table.
pub const DEFAULT_ID_COLUMN: &str = "updateid";

/// Default name of the event-case column of a shadow table.
pub const DEFAULT_CASE_COLUMN: &str = "eventcase";

/// SQL type of a mapped id column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Text,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ColumnType::Text)
    }
}

/// Problems found while validating a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("{0} must not be empty")]
    EmptyName(&'static str),

    #[error("'{0}' is not a valid SQL identifier")]
    InvalidIdentifier(String),

    #[error("updates table {0} has no id mappings")]
    NoIdMappings(String),

    #[error("id mapping for {0} has no columns")]
    EmptyColumns(String),

    #[error("id mapping for {entity_type} has {columns} shadow columns, {original} original columns and {types} types")]
    ColumnCountMismatch {
        entity_type: String,
        columns: usize,
        original: usize,
        types: usize,
    },

    #[error("column {column} is mapped more than once in {updates_table}")]
    DuplicateColumn {
        updates_table: String,
        column: String,
    },

    #[error("column {column} collides with the id or case column of {updates_table}")]
    ReservedColumn {
        updates_table: String,
        column: String,
    },
}

/// Links the id column(s) of a shadow table to the identifier of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    /// The entity type whose id the columns hold.
    pub entity_type: String,
    /// Column names in the shadow table.
    pub columns: Vec<String>,
    /// The matching column names in the original table.
    pub columns_in_original: Vec<String>,
    /// SQL type of each column.
    pub column_types: Vec<ColumnType>,
}

impl IdMapping {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            columns: Vec::new(),
            columns_in_original: Vec::new(),
            column_types: Vec::new(),
        }
    }

    /// Add one id column.
    pub fn column(
        mut self,
        column: impl Into<String>,
        column_in_original: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.columns.push(column.into());
        self.columns_in_original.push(column_in_original.into());
        self.column_types.push(column_type);
        self
    }

    fn validate(&self) -> Result<(), DescriptorError> {
        if self.entity_type.trim().is_empty() {
            return Err(DescriptorError::EmptyName("entity_type"));
        }
        if self.columns.is_empty() {
            return Err(DescriptorError::EmptyColumns(self.entity_type.clone()));
        }
        if self.columns.len() != self.columns_in_original.len()
            || self.columns.len() != self.column_types.len()
        {
            return Err(DescriptorError::ColumnCountMismatch {
                entity_type: self.entity_type.clone(),
                columns: self.columns.len(),
                original: self.columns_in_original.len(),
                types: self.column_types.len(),
            });
        }
        for name in self.columns.iter().chain(&self.columns_in_original) {
            check_identifier(name)?;
        }
        Ok(())
    }
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

fn default_case_column() -> String {
    DEFAULT_CASE_COLUMN.to_string()
}

/// Describes one monitored table and its shadow table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityUpdateDescriptor {
    /// The table the triggers are installed on.
    pub original_table: String,
    /// The shadow table the triggers write into.
    pub updates_table: String,
    /// Synthetic primary key column of the shadow table.
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Event-case column of the shadow table.
    #[serde(default = "default_case_column")]
    pub case_column: String,
    /// One mapping per entity type referenced by a shadow row.
    #[serde(rename = "id_mapping")]
    pub id_mappings: Vec<IdMapping>,
}

impl EntityUpdateDescriptor {
    pub fn new(original_table: impl Into<String>, updates_table: impl Into<String>) -> Self {
        Self {
            original_table: original_table.into(),
            updates_table: updates_table.into(),
            id_column: default_id_column(),
            case_column: default_case_column(),
            id_mappings: Vec::new(),
        }
    }

    pub fn with_id_mapping(mut self, mapping: IdMapping) -> Self {
        self.id_mappings.push(mapping);
        self
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn with_case_column(mut self, column: impl Into<String>) -> Self {
        self.case_column = column.into();
        self
    }

    /// A descriptor referencing several entities models an association
    /// (join) table rather than an entity table.
    pub fn is_association(&self) -> bool {
        self.id_mappings.len() > 1
    }

    /// All shadow columns holding ids, in mapping order.
    pub fn mapped_columns(&self) -> impl Iterator<Item = &str> {
        self.id_mappings
            .iter()
            .flat_map(|m| m.columns.iter().map(String::as_str))
    }

    /// Check that the descriptor is complete and safe to render into SQL.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.original_table.trim().is_empty() {
            return Err(DescriptorError::EmptyName("original_table"));
        }
        if self.updates_table.trim().is_empty() {
            return Err(DescriptorError::EmptyName("updates_table"));
        }
        for name in [
            &self.original_table,
            &self.updates_table,
            &self.id_column,
            &self.case_column,
        ] {
            check_identifier(name)?;
        }
        if self.id_mappings.is_empty() {
            return Err(DescriptorError::NoIdMappings(self.updates_table.clone()));
        }

        let mut seen = HashSet::new();
        for mapping in &self.id_mappings {
            mapping.validate()?;
            for column in &mapping.columns {
                if column.eq_ignore_ascii_case(&self.id_column)
                    || column.eq_ignore_ascii_case(&self.case_column)
                {
                    return Err(DescriptorError::ReservedColumn {
                        updates_table: self.updates_table.clone(),
                        column: column.clone(),
                    });
                }
                if !seen.insert(column.to_ascii_lowercase()) {
                    return Err(DescriptorError::DuplicateColumn {
                        updates_table: self.updates_table.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), DescriptorError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DescriptorError::InvalidIdentifier(name.to_string()))
    }
}
