use super::TriggerDialect;
use search_sync_shared::{ColumnType, EntityUpdateDescriptor, EventCase};

/// PostgreSQL: triggers call a plpgsql function, so each event case
/// installs a function and a trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn function_name(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> String {
        format!("{}_fn", self.trigger_name(descriptor, case))
    }
}

impl TriggerDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn column_type(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Text => "TEXT",
        }
    }

    fn create_updates_table(&self, descriptor: &EntityUpdateDescriptor) -> String {
        let mut columns = vec![format!("{} BIGSERIAL PRIMARY KEY", self.quote(&descriptor.id_column))];
        columns.extend(self.mapped_column_definitions(descriptor));
        columns.push(format!("{} SMALLINT NOT NULL", self.quote(&descriptor.case_column)));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(&descriptor.updates_table),
            columns.join(", ")
        )
    }

    fn create_trigger(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String> {
        let function = self.quote(&self.function_name(descriptor, case));
        vec![
            format!(
                "CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER AS $$ BEGIN {}; RETURN NULL; END; $$ LANGUAGE plpgsql",
                function,
                self.trigger_body(descriptor, case).join("; ")
            ),
            format!(
                "CREATE TRIGGER {} AFTER {} ON {} FOR EACH ROW EXECUTE PROCEDURE {}()",
                self.quote(&self.trigger_name(descriptor, case)),
                case.as_str().to_ascii_uppercase(),
                self.quote(&descriptor.original_table),
                function
            ),
        ]
    }

    fn drop_trigger(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String> {
        vec![
            format!(
                "DROP TRIGGER IF EXISTS {} ON {}",
                self.quote(&self.trigger_name(descriptor, case)),
                self.quote(&descriptor.original_table)
            ),
            format!(
                "DROP FUNCTION IF EXISTS {}()",
                self.quote(&self.function_name(descriptor, case))
            ),
        ]
    }

    fn drop_updates_table(&self, descriptor: &EntityUpdateDescriptor) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(&descriptor.updates_table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::tests::place_descriptor;
    use crate::trigger::TriggerSqlGenerator;

    #[test]
    fn test_trigger_calls_function() {
        let sql = PostgresDialect.create_trigger(&place_descriptor(), EventCase::Update);
        assert_eq!(sql.len(), 2);
        assert!(sql[0].starts_with("CREATE OR REPLACE FUNCTION \"PlaceUpdates_update_fn\"()"));
        assert!(sql[0].contains(
            "VALUES (NEW.\"id\", 1); INSERT INTO \"PlaceUpdates\" (\"placeId\", \"eventcase\") \
             SELECT OLD.\"id\", 1 WHERE OLD.\"id\" IS DISTINCT FROM NEW.\"id\"; RETURN NULL;"
        ));
        assert_eq!(
            sql[1],
            "CREATE TRIGGER \"PlaceUpdates_update\" AFTER UPDATE ON \"Place\" \
             FOR EACH ROW EXECUTE PROCEDURE \"PlaceUpdates_update_fn\"()"
        );
    }

    #[test]
    fn test_setup_and_teardown_counts() {
        let generator = TriggerSqlGenerator::new(Box::new(PostgresDialect));
        let statements = generator.generate(&place_descriptor()).unwrap();
        assert_eq!(statements.setup.len(), 7);
        assert_eq!(statements.teardown.len(), 7);
        assert!(statements.setup[0].contains("\"updateid\" BIGSERIAL PRIMARY KEY"));
    }
}
