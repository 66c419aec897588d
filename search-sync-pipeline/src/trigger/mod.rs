//! Trigger SQL generation.
//!
//! For every monitored table a shadow ("Updates") table is created, plus one
//! row trigger per event case on the original table. Each trigger copies the
//! mapped id columns of the affected row into the shadow table together with
//! the event-case code. An update that changes a mapped column also records
//! the previous ids. How that is spelled depends on the database, so the
//! statements are rendered through a [`TriggerDialect`].

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use tracing::debug;

use crate::errors::PipelineError;
use search_sync_shared::{ColumnType, EntityUpdateDescriptor, EventCase};

/// Renders shadow-table and trigger statements for one database engine.
pub trait TriggerDialect: Send + Sync {
    /// Short name of the dialect, as used in configuration.
    fn name(&self) -> &'static str;

    /// SQL type for a mapped id column.
    fn column_type(&self, column_type: ColumnType) -> &'static str;

    fn create_updates_table(&self, descriptor: &EntityUpdateDescriptor) -> String;

    /// Statements installing the trigger for one event case.
    fn create_trigger(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String>;

    /// Statements removing what [`create_trigger`](Self::create_trigger) installed.
    fn drop_trigger(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String>;

    fn drop_updates_table(&self, descriptor: &EntityUpdateDescriptor) -> String;

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier)
    }

    fn trigger_name(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> String {
        format!("{}_{}", descriptor.updates_table, case.as_str())
    }

    /// The row a trigger reads ids from: the new row for inserts and
    /// updates, the old row for deletes.
    fn row_reference(&self, case: EventCase) -> &'static str {
        match case {
            EventCase::Insert | EventCase::Update => "NEW",
            EventCase::Delete => "OLD",
        }
    }

    /// Null-safe inequality of two column references.
    fn distinct(&self, left: &str, right: &str) -> String {
        format!("{} IS DISTINCT FROM {}", left, right)
    }

    /// What a table-less `SELECT` needs before its `WHERE`.
    fn select_source(&self) -> &'static str {
        ""
    }

    /// The `INSERT` recording the ids of the affected row.
    fn shadow_insert(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> String {
        let (columns, values) = shadow_row(self, descriptor, self.row_reference(case), case);
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(&descriptor.updates_table),
            columns.join(", "),
            values.join(", ")
        )
    }

    /// The `INSERT` recording the previous ids of an updated row, run only
    /// when a mapped column changed. The entities those ids pointed at are
    /// reloaded, or removed if they are gone.
    fn previous_ids_insert(&self, descriptor: &EntityUpdateDescriptor) -> String {
        let (columns, values) = shadow_row(self, descriptor, "OLD", EventCase::Update);
        let changed = descriptor
            .id_mappings
            .iter()
            .flat_map(|mapping| &mapping.columns_in_original)
            .map(|original| {
                let original = self.quote(original);
                self.distinct(&format!("OLD.{}", original), &format!("NEW.{}", original))
            })
            .collect::<Vec<_>>()
            .join(" OR ");

        format!(
            "INSERT INTO {} ({}) SELECT {}{} WHERE {}",
            self.quote(&descriptor.updates_table),
            columns.join(", "),
            values.join(", "),
            self.select_source(),
            changed
        )
    }

    /// Statements a trigger body runs for one event case.
    fn trigger_body(&self, descriptor: &EntityUpdateDescriptor, case: EventCase) -> Vec<String> {
        let mut body = vec![self.shadow_insert(descriptor, case)];
        if matches!(case, EventCase::Update) {
            body.push(self.previous_ids_insert(descriptor));
        }
        body
    }

    /// Column definitions of the mapped id columns.
    fn mapped_column_definitions(&self, descriptor: &EntityUpdateDescriptor) -> Vec<String> {
        descriptor
            .id_mappings
            .iter()
            .flat_map(|mapping| mapping.columns.iter().zip(&mapping.column_types))
            .map(|(column, ty)| format!("{} {}", self.quote(column), self.column_type(*ty)))
            .collect()
    }
}

/// Shadow columns and the values copied from `row` into them.
fn shadow_row<D: TriggerDialect + ?Sized>(
    dialect: &D,
    descriptor: &EntityUpdateDescriptor,
    row: &str,
    case: EventCase,
) -> (Vec<String>, Vec<String>) {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for mapping in &descriptor.id_mappings {
        for (column, original) in mapping.columns.iter().zip(&mapping.columns_in_original) {
            columns.push(dialect.quote(column));
            values.push(format!("{}.{}", row, dialect.quote(original)));
        }
    }
    columns.push(dialect.quote(&descriptor.case_column));
    values.push(case.code().to_string());
    (columns, values)
}

/// Resolve a dialect from its configured name.
pub fn dialect_for_name(name: &str) -> Result<Box<dyn TriggerDialect>, PipelineError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sqlite" => Ok(Box::new(SqliteDialect)),
        "mysql" | "mariadb" => Ok(Box::new(MySqlDialect)),
        "postgres" | "postgresql" => Ok(Box::new(PostgresDialect)),
        other => Err(PipelineError::configuration(format!(
            "Unsupported trigger dialect: {}",
            other
        ))),
    }
}

/// Statements to install and remove change capture for one or more tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerStatements {
    /// Shadow table first, then one trigger per event case.
    pub setup: Vec<String>,
    /// Triggers first, then the shadow table.
    pub teardown: Vec<String>,
}

impl TriggerStatements {
    fn extend(&mut self, other: TriggerStatements) {
        self.setup.extend(other.setup);
        self.teardown.extend(other.teardown);
    }
}

/// Generates change-capture DDL for update descriptors.
pub struct TriggerSqlGenerator {
    dialect: Box<dyn TriggerDialect>,
}

impl TriggerSqlGenerator {
    pub fn new(dialect: Box<dyn TriggerDialect>) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &dyn TriggerDialect {
        self.dialect.as_ref()
    }

    /// Render the statements for one descriptor.
    ///
    /// Fails with a configuration error if the descriptor is incomplete.
    pub fn generate(
        &self,
        descriptor: &EntityUpdateDescriptor,
    ) -> Result<TriggerStatements, PipelineError> {
        descriptor.validate()?;

        let mut setup = vec![self.dialect.create_updates_table(descriptor)];
        let mut teardown = Vec::new();
        for case in EventCase::ALL {
            setup.extend(self.dialect.create_trigger(descriptor, case));
            teardown.extend(self.dialect.drop_trigger(descriptor, case));
        }
        teardown.push(self.dialect.drop_updates_table(descriptor));

        debug!(
            dialect = self.dialect.name(),
            original_table = %descriptor.original_table,
            updates_table = %descriptor.updates_table,
            statements = setup.len(),
            "Generated trigger statements"
        );
        Ok(TriggerStatements { setup, teardown })
    }

    /// Render the statements for several descriptors, failing on the first
    /// invalid one.
    pub fn generate_all(
        &self,
        descriptors: &[EntityUpdateDescriptor],
    ) -> Result<TriggerStatements, PipelineError> {
        let mut all = TriggerStatements::default();
        for descriptor in descriptors {
            all.extend(self.generate(descriptor)?);
        }
        Ok(all)
    }
}
