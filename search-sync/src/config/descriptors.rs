//! The descriptor file: which entities are indexed and which tables are
//! monitored for changes.
//!
//! ```toml
//! [[entity]]
//! name = "Place"
//! table = "Place"
//! id_columns = ["ID"]
//!
//! [[updates]]
//! original_table = "Place"
//! updates_table = "PlaceUpdates"
//!
//! [[updates.id_mapping]]
//! entity_type = "Place"
//! columns = ["placeId"]
//! columns_in_original = ["ID"]
//! column_types = ["integer"]
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::SyncError;
use search_sync_repository::EntityTable;
use search_sync_shared::EntityUpdateDescriptor;

#[derive(Debug, Clone, Deserialize)]
pub struct DescriptorFile {
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityTable>,
    #[serde(default)]
    pub updates: Vec<EntityUpdateDescriptor>,
}

impl DescriptorFile {
    pub fn parse(source: &str) -> Result<Self, SyncError> {
        let file: DescriptorFile = toml::from_str(source)
            .map_err(|e| SyncError::config(format!("Invalid descriptor file: {}", e)))?;
        file.validate()?;
        Ok(file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!(
                "Failed to read descriptor file {}: {}",
                path.display(),
                e
            ))
        })?;
        let file = Self::parse(&source)?;
        info!(
            path = %path.display(),
            entities = file.entities.len(),
            updates = file.updates.len(),
            "Loaded descriptor file"
        );
        Ok(file)
    }

    /// Every entity type an update descriptor refers to must be indexable.
    fn validate(&self) -> Result<(), SyncError> {
        if self.updates.is_empty() {
            return Err(SyncError::config("Descriptor file has no [[updates]] entries"));
        }
        for descriptor in &self.updates {
            for mapping in &descriptor.id_mappings {
                let entity = self
                    .entities
                    .iter()
                    .find(|e| e.entity_type == mapping.entity_type)
                    .ok_or_else(|| {
                        SyncError::config(format!(
                            "{} maps ids of {}, which has no [[entity]] entry",
                            descriptor.updates_table, mapping.entity_type
                        ))
                    })?;
                if entity.id_columns.len() != mapping.columns.len() {
                    return Err(SyncError::config(format!(
                        "{} maps {} id columns of {}, which has {}",
                        descriptor.updates_table,
                        mapping.columns.len(),
                        entity.entity_type,
                        entity.id_columns.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Entity types declared in the file.
    pub fn indexed_types(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.entity_type.clone()).collect()
    }
}
