//! Writing a classification back to the store.
//!
//! Side effects happen in a fixed order: bulk insert of new rows, one update
//! per changed row, the summary log row, the "last run" cell, and finally a
//! single flush of the log sheet's cell writes.
//!
//! Failure policy: the insert is not guarded, so its error aborts the run.
//! Everything after it is one unit; the first store error there stops the
//! remaining steps, is logged, and the run still counts as finished. The next
//! scheduled run redoes whatever was skipped, since it diffs against the
//! store again.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::diff::Classification;
use crate::error::{StoreError, StoreResult};
use crate::normalize::DisplayZone;
use crate::store::{CellRef, CellValue, RowStore, SheetRef};

/// Cell on the log sheet that always holds the last run time (`H1`).
pub const LAST_RUN_CELL: CellRef = CellRef::new(0, 7);

/// What one run changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub completed_at: String,
    pub updated_ids: Vec<String>,
    pub new_ids: Vec<String>,
}

impl RunSummary {
    pub fn new(classification: &Classification, completed_at: String) -> Self {
        RunSummary {
            completed_at,
            updated_ids: classification
                .changed_identities()
                .into_iter()
                .map(String::from)
                .collect(),
            new_ids: classification
                .new_identities()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn updated(&self) -> usize {
        self.updated_ids.len()
    }

    pub fn created(&self) -> usize {
        self.new_ids.len()
    }

    pub fn has_changes(&self) -> bool {
        self.updated() > 0 || self.created() > 0
    }

    /// Log row: time, updated count, new count, updated ids, new ids.
    pub fn to_cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::from(self.completed_at.clone()),
            CellValue::from(self.updated()),
            CellValue::from(self.created()),
            CellValue::from(self.updated_ids.join(", ")),
            CellValue::from(self.new_ids.join(", ")),
        ]
    }
}

/// How far the write-back got.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyProgress {
    pub rows_inserted: usize,
    pub rows_updated: usize,
    pub summary_appended: bool,
    pub last_run_refreshed: bool,
}

#[derive(Debug)]
pub struct ApplyOutcome {
    pub summary: RunSummary,
    pub progress: ApplyProgress,
    /// The error that cut the write-back short, if any.
    pub interrupted: Option<StoreError>,
}

impl ApplyOutcome {
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

pub struct SyncApplier<'a> {
    store: &'a dyn RowStore,
    events_sheet: &'a SheetRef,
    log_sheet: &'a SheetRef,
    zone: DisplayZone,
}

impl<'a> SyncApplier<'a> {
    pub fn new(
        store: &'a dyn RowStore,
        events_sheet: &'a SheetRef,
        log_sheet: &'a SheetRef,
        zone: DisplayZone,
    ) -> Self {
        SyncApplier {
            store,
            events_sheet,
            log_sheet,
            zone,
        }
    }

    /// Apply a classification. Only an insert failure is returned as an error.
    pub async fn apply(&self, classification: &Classification) -> StoreResult<ApplyOutcome> {
        let mut progress = ApplyProgress::default();

        if classification.new.is_empty() {
            info!("no new events to add");
        } else {
            let rows: Vec<Vec<String>> = classification.new.iter().map(|e| e.to_row()).collect();
            info!(count = rows.len(), "adding new events");
            self.store.append_rows(self.events_sheet, &rows).await?;
            progress.rows_inserted = rows.len();
        }

        let mut summary = RunSummary::new(classification, String::new());
        let interrupted = match self.write_back(classification, &mut summary, &mut progress).await {
            Ok(()) => None,
            Err(e) if e.is_transient() => {
                info!(
                    error = %e,
                    "write-back stopped early (probably rate limited); the next run will retry"
                );
                Some(e)
            }
            Err(e) => {
                warn!(error = %e, "write-back stopped early; the next run will retry");
                Some(e)
            }
        };

        Ok(ApplyOutcome {
            summary,
            progress,
            interrupted,
        })
    }

    async fn write_back(
        &self,
        classification: &Classification,
        summary: &mut RunSummary,
        progress: &mut ApplyProgress,
    ) -> StoreResult<()> {
        if classification.changed.is_empty() {
            info!("no events to update");
        } else {
            info!(count = classification.changed.len(), "updating events");
            for changed in &classification.changed {
                let mut row = changed.previous.clone();
                row.overwrite_from(&changed.event);
                self.store
                    .update_row(self.events_sheet, row.row, &row.to_cells())
                    .await?;
                progress.rows_updated += 1;
            }
        }

        let now = self.zone.render(chrono::Utc::now());
        summary.completed_at = now.clone();

        if summary.has_changes() {
            self.store
                .append_log_row(self.log_sheet, &summary.to_cells())
                .await?;
            progress.summary_appended = true;
        }

        self.store.set_cell(self.log_sheet, LAST_RUN_CELL, now).await?;
        self.store.flush_cell_writes(self.log_sheet).await?;
        progress.last_run_refreshed = true;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangedEvent;
    use crate::event::{NormalizedEvent, PersistedRow, RowRef};

    fn event(identity: &str) -> NormalizedEvent {
        NormalizedEvent {
            identity: identity.into(),
            title: "T".into(),
            category: "C".into(),
            start: "s".into(),
            end: "e".into(),
            link: String::new(),
        }
    }

    #[test]
    fn test_summary_cells() {
        let classification = Classification {
            new: vec![event("n1"), event("n2")],
            changed: vec![ChangedEvent {
                event: event("c1"),
                previous: PersistedRow::from_cells(RowRef(2), &event("c1").to_row()),
            }],
            unchanged: vec![],
        };

        let summary = RunSummary::new(&classification, "2024-01-01 9:00:00".into());

        assert_eq!(
            summary.to_cells(),
            vec![
                CellValue::from("2024-01-01 9:00:00"),
                CellValue::Number(1),
                CellValue::Number(2),
                CellValue::from("c1"),
                CellValue::from("n1, n2"),
            ]
        );
    }

    #[test]
    fn test_empty_summary_has_no_changes() {
        let summary = RunSummary::new(&Classification::default(), String::new());

        assert!(!summary.has_changes());
        assert_eq!(summary.to_cells()[3], CellValue::from(""));
    }
}
