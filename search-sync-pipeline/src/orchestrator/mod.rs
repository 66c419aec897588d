//! Orchestrator module for the sync pipeline.
//!
//! Runs the poll, translate, dispatch and acknowledge cycle and schedules it
//! with a fixed delay.

mod scheduler;

pub use scheduler::SchedulerHandle;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::dispatcher::{DispatchReport, IndexUpdateDispatcher, UpdateConsumer};
use crate::errors::PipelineError;
use crate::source::{DeliveryMode, UpdateSource};
use search_sync_shared::{RawUpdateRow, UpdateEvent};

/// Outcome of one sync cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Shadow rows read.
    pub rows_fetched: usize,
    /// Events produced by translation.
    pub events: usize,
    /// Rows that could not be translated.
    pub skipped_rows: usize,
    pub dispatch: DispatchReport,
    /// Rows deleted from the shadow tables.
    pub rows_acknowledged: usize,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            rows_fetched: 0,
            events: 0,
            skipped_rows: 0,
            dispatch: DispatchReport::default(),
            rows_acknowledged: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.rows_fetched == 0
    }
}

/// Coordinates the update source, the dispatcher and additional consumers.
///
/// Cycles never overlap: [`run_cycle`](Self::run_cycle) holds a lock for
/// the whole cycle, so a scheduled cycle and a manual poll are serialized.
pub struct Orchestrator {
    source: UpdateSource,
    dispatcher: IndexUpdateDispatcher,
    consumers: Vec<Arc<dyn UpdateConsumer>>,
    delivery_mode: DeliveryMode,
    cycle_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(source: UpdateSource, dispatcher: IndexUpdateDispatcher) -> Self {
        Self {
            source,
            dispatcher,
            consumers: Vec::new(),
            delivery_mode: DeliveryMode::default(),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }

    /// Notify `consumer` of every dispatched batch.
    pub fn with_consumer(mut self, consumer: Arc<dyn UpdateConsumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn source(&self) -> &UpdateSource {
        &self.source
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    /// Run one cycle: read a batch of shadow rows, translate them, apply the
    /// events and delete the consumed rows.
    ///
    /// Rows that cannot be translated are logged and deleted. With
    /// at-least-once delivery, rows whose events belong to a type that
    /// failed to apply are kept for the next cycle.
    ///
    /// # Returns
    ///
    /// * `Ok(CycleReport)` - What the cycle did, including per-type failures
    /// * `Err(PipelineError)` - If reading or deleting shadow rows failed
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let _cycle = self.cycle_lock.lock().await;
        let mut report = CycleReport::new();

        let rows = self.source.get_updates().await?;
        report.rows_fetched = rows.len();
        if rows.is_empty() {
            return Ok(report);
        }

        if self.delivery_mode == DeliveryMode::AtMostOnce {
            report.rows_acknowledged = self.source.delete_updates(&rows).await?;
        }

        let translated = self.source.get_update_events(&rows);
        let mut events: Vec<UpdateEvent> = Vec::new();
        for (row, result) in rows.iter().zip(&translated) {
            match result {
                Ok(row_events) => events.extend(row_events.iter().cloned()),
                Err(e) => {
                    warn!(
                        updates_table = %row.updates_table,
                        row_id = row.row_id,
                        case = ?row.case_code,
                        error = %e,
                        "Skipping shadow row that cannot be translated"
                    );
                    report.skipped_rows += 1;
                }
            }
        }
        report.events = events.len();

        if !events.is_empty() {
            report.dispatch = self.dispatcher.update_events(&events).await;
            self.notify_consumers(&events).await;
        }

        if self.delivery_mode == DeliveryMode::AtLeastOnce {
            let acknowledged = {
                let failed = report.dispatch.failed_types();
                acknowledged_rows(&rows, &translated, &failed)
            };
            let held_back = rows.len() - acknowledged.len();
            if held_back > 0 {
                warn!(
                    rows = held_back,
                    "Keeping shadow rows of failed entity types for redelivery"
                );
            }
            report.rows_acknowledged = self.source.delete_updates(acknowledged).await?;
        }

        info!(
            cycle = %report.cycle_id,
            rows = report.rows_fetched,
            events = report.events,
            skipped = report.skipped_rows,
            failed_types = report.dispatch.failed.len(),
            acknowledged = report.rows_acknowledged,
            "Sync cycle completed"
        );
        Ok(report)
    }

    async fn notify_consumers(&self, events: &[UpdateEvent]) {
        for consumer in &self.consumers {
            if let Err(e) = consumer.updated(events).await {
                warn!(error = %e, events = events.len(), "Update consumer failed");
            }
        }
    }

    /// Run cycles until the shadow tables are empty or `max_cycles` ran.
    ///
    /// Returns the number of cycles that read at least one row.
    pub async fn drain(&self, max_cycles: usize) -> Result<usize, PipelineError> {
        let mut busy = 0;
        for _ in 0..max_cycles {
            let report = self.run_cycle().await?;
            if report.is_idle() {
                break;
            }
            busy += 1;
        }
        debug!(cycles = busy, "Drained shadow tables");
        Ok(busy)
    }

    /// Run cycles on `handle` with `delay` between the end of one cycle and
    /// the start of the next.
    pub fn spawn(self: Arc<Self>, handle: &Handle, delay: Duration) -> SchedulerHandle {
        scheduler::spawn(self, handle, delay)
    }
}

/// Rows that can be deleted: untranslatable rows, and rows none of whose
/// events belong to a failed entity type.
fn acknowledged_rows<'a>(
    rows: &'a [RawUpdateRow],
    translated: &[Result<Vec<UpdateEvent>, PipelineError>],
    failed_types: &HashSet<&str>,
) -> Vec<&'a RawUpdateRow> {
    rows.iter()
        .zip(translated)
        .filter(|(_, result)| match result {
            Ok(events) => events
                .iter()
                .all(|e| !failed_types.contains(e.entity_type.as_str())),
            Err(_) => true,
        })
        .map(|(row, _)| row)
        .collect()
}
