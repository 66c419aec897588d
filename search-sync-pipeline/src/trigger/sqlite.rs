use super::TriggerDialect;
use search_sync_shared::{ColumnType, EntityUpdateDescriptor, EventCase};

/// SQLite row triggers with `BEGIN ... END` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl TriggerDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_type(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }

    fn distinct(&self, left: &str, right: &str) -> String {
        format!("{} IS NOT {}", left, right)
    }

    fn create_updates_table(&self, descriptor: &EntityUpdateDescriptor) -> String {
        let mut columns = vec![format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            self.quote(&descriptor.id_column)
        )];
        columns.extend(self.mapped_column_definitions(descriptor));
        columns.push(format!("{} INTEGER NOT NULL", self.quote(&descriptor.case_column)));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(&descriptor.updates_table),
            columns.join(", ")
        )
    }

    fn create_trigger(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String> {
        vec![format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER {} ON {} FOR EACH ROW BEGIN {}; END",
            self.quote(&self.trigger_name(descriptor, case)),
            case.as_str().to_ascii_uppercase(),
            self.quote(&descriptor.original_table),
            self.trigger_body(descriptor, case).join("; ")
        )]
    }

    fn drop_trigger(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String> {
        vec![format!(
            "DROP TRIGGER IF EXISTS {}",
            self.quote(&self.trigger_name(descriptor, case))
        )]
    }

    fn drop_updates_table(&self, descriptor: &EntityUpdateDescriptor) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(&descriptor.updates_table))
    }
}
