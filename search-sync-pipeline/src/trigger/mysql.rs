use super::TriggerDialect;
use search_sync_shared::{ColumnType, EntityUpdateDescriptor, EventCase};

/// MySQL and MariaDB: single-statement `FOR EACH ROW` triggers and
/// backtick-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl TriggerDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn column_type(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Text => "VARCHAR(255)",
        }
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier)
    }

    fn distinct(&self, left: &str, right: &str) -> String {
        format!("NOT ({} <=> {})", left, right)
    }

    fn select_source(&self) -> &'static str {
        " FROM DUAL"
    }

    fn create_updates_table(&self, descriptor: &EntityUpdateDescriptor) -> String {
        let mut columns = vec![format!(
            "{} BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            self.quote(&descriptor.id_column)
        )];
        columns.extend(self.mapped_column_definitions(descriptor));
        columns.push(format!("{} SMALLINT NOT NULL", self.quote(&descriptor.case_column)));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(&descriptor.updates_table),
            columns.join(", ")
        )
    }

    fn create_trigger(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String> {
        let body = match self.trigger_body(descriptor, case).as_slice() {
            [single] => single.clone(),
            statements => format!("BEGIN {}; END", statements.join("; ")),
        };
        vec![format!(
            "CREATE TRIGGER {} AFTER {} ON {} FOR EACH ROW {}",
            self.quote(&self.trigger_name(descriptor, case)),
            case.as_str().to_ascii_uppercase(),
            self.quote(&descriptor.original_table),
            body
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
