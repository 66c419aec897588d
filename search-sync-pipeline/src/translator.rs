//! Turns raw shadow rows into typed update events.

use tracing::debug;

use crate::errors::PipelineError;
use search_sync_shared::{
    ColumnType, ColumnValue, EntityId, EntityUpdateDescriptor, EventCase, IdMapping, IdValue,
    RawUpdateRow, UpdateEvent,
};

/// Maps shadow rows to update events using their descriptor.
///
/// Translation is pure: the same row and descriptor always give the same
/// events, in mapping order.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateEventTranslator;

impl UpdateEventTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Translate one row.
    ///
    /// Emits one event per id mapping whose columns are all set. A mapping
    /// with a null column is skipped: the referenced entity is gone or not
    /// linked yet. Rows of association tables reindex both sides, so their
    /// events always carry [`EventCase::Update`].
    pub fn to_update_events(
        &self,
        row: &RawUpdateRow,
        descriptor: &EntityUpdateDescriptor,
    ) -> Result<Vec<UpdateEvent>, PipelineError> {
        let fail = |msg: String| PipelineError::translation(&row.updates_table, row.row_id, msg);

        if row.updates_table != descriptor.updates_table {
            return Err(fail(format!(
                "row does not belong to {}",
                descriptor.updates_table
            )));
        }
        let code = row
            .case_code
            .ok_or_else(|| fail("event case is null".to_string()))?;
        let row_case = EventCase::try_from(code).map_err(|e| fail(e.to_string()))?;
        let case = if descriptor.is_association() {
            EventCase::Update
        } else {
            row_case
        };

        let mut events = Vec::with_capacity(descriptor.id_mappings.len());
        for mapping in &descriptor.id_mappings {
            match resolve_id(row, mapping).map_err(fail)? {
                Some(id) => events.push(UpdateEvent::new(mapping.entity_type.clone(), id, case)),
                None => debug!(
                    updates_table = %row.updates_table,
                    row_id = row.row_id,
                    entity_type = %mapping.entity_type,
                    "Skipping mapping with null id"
                ),
            }
        }
        Ok(events)
    }
}

/// Build the id of one mapping, `None` if any of its columns is null.
fn resolve_id(row: &RawUpdateRow, mapping: &IdMapping) -> Result<Option<EntityId>, String> {
    let mut parts = Vec::with_capacity(mapping.columns.len());
    for (column, column_type) in mapping.columns.iter().zip(&mapping.column_types) {
        let value = row
            .values
            .get(column)
            .ok_or_else(|| format!("column {} is missing", column))?;
        match id_value(value, *column_type) {
            Ok(Some(part)) => parts.push(part),
            Ok(None) => return Ok(None),
            Err(e) => return Err(format!("column {}: {}", column, e)),
        }
    }
    Ok(EntityId::composite(parts))
}

fn id_value(value: &ColumnValue, column_type: ColumnType) -> Result<Option<IdValue>, String> {
    match (value, column_type.is_numeric()) {
        (ColumnValue::Null, _) => Ok(None),
        (ColumnValue::Integer(i), true) => Ok(Some(IdValue::Integer(*i))),
        (ColumnValue::Integer(i), false) => Ok(Some(IdValue::Text(i.to_string()))),
        (ColumnValue::Text(s), false) => Ok(Some(IdValue::Text(s.clone()))),
        (ColumnValue::Text(s), true) => s
            .trim()
            .parse::<i64>()
            .map(|i| Some(IdValue::Integer(i)))
            .map_err(|_| format!("'{}' is not a numeric id", s)),
        (ColumnValue::Other(type_name), _) => Err(format!("unsupported value of type {}", type_name)),
    }
}
