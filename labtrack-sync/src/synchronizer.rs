//! Remote synchronization passes.
//!
//! Three operations, all idempotent and all flag-driven:
//! - [`Synchronizer::ensure_folder_and_template`] makes the remote folder,
//!   `Samples` subfolder, documentation workbook, metadata cells, and view
//!   link exist, then clears `new`
//! - [`Synchronizer::sync_sample_ids`] reconciles the workbook id column
//!   with the local sample set, then clears `needs_update`
//! - [`Synchronizer::export_documentation`] uploads a CSV snapshot for the
//!   sales folder and bumps the export bookkeeping
//!
//! Flags are cleared only after the remote write is confirmed; any failure
//! leaves them set so the next scheduler cycle retries.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};

use labtrack_core::types::{OpportunityNumber, RemoteFolderRef, SampleId};
use labtrack_core::StateTracker;
use labtrack_remote::{DocumentStore, ItemRef, LinkScope, RemoteError};

use crate::archive::{self, ArchiveOutcome};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::reconcile::{self, RowPlan};

/// Metadata cells in the documentation workbook, column B rows 1-4:
/// customer, RSM, opportunity number, description.
const METADATA_RANGE: &str = "B1:B4";

pub struct Synchronizer<'a> {
    store: &'a dyn DocumentStore,
    tracker: StateTracker,
    config: SyncConfig,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn DocumentStore, tracker: StateTracker, config: SyncConfig) -> Self {
        Self {
            store,
            tracker,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Make the opportunity's remote presence exist, end to end.
    ///
    /// Resolution order for the folder itself: already active, restorable
    /// from the archive, else created. Creation is optimistic; losing the
    /// create race to a concurrent writer downgrades to a re-find. The
    /// metadata cells are rewritten unconditionally so edited fields heal
    /// on every pass.
    pub fn ensure_folder_and_template(
        &self,
        number: &OpportunityNumber,
    ) -> Result<RemoteFolderRef, SyncError> {
        let record = self.tracker.read(number)?;
        let folder = self.ensure_folder(number)?;
        self.ensure_subfolder(&self.config.samples_path(number), "Samples")?;

        let doc_path = self.config.doc_path(number);
        if self.store.find_by_path(&doc_path)?.is_none() {
            self.store.copy_item(
                &self.config.template_path,
                &self.config.samples_path(number),
                &self.config.doc_name(number),
            )?;
            debug!("copied documentation template to {doc_path}");
        }

        self.store.write_range(
            &doc_path,
            &self.config.worksheet,
            METADATA_RANGE,
            &vec![
                vec![json!(record.opportunity.customer)],
                vec![json!(record.opportunity.rsm)],
                vec![json!(number.0)],
                vec![json!(record.opportunity.description)],
            ],
        )?;

        let url = self
            .store
            .create_view_link(&self.config.folder_path(number), LinkScope::Organization)?;
        let folder_ref = RemoteFolderRef {
            id: folder.id,
            url,
        };
        self.tracker.clear_new(number, folder_ref.clone())?;
        info!("opportunity {number}: remote folder and template ready");
        Ok(folder_ref)
    }

    /// Bring the workbook id column in line with the local sample set.
    ///
    /// Removed ids are blanked in place; new ids are appended in ascending
    /// order after the last occupied row, paired with their received date.
    pub fn sync_sample_ids(&self, number: &OpportunityNumber) -> Result<RowPlan, SyncError> {
        let record = self.tracker.read(number)?;
        if record.opportunity.new || record.opportunity.remote_folder_ref.is_none() {
            return Err(SyncError::FolderNotProvisioned {
                number: number.clone(),
            });
        }

        let doc_path = self.config.doc_path(number);
        let grid = self.store.read_range(
            &doc_path,
            &self.config.worksheet,
            &self.config.id_scan_range(),
        )?;
        let observed: Vec<Option<u16>> =
            grid.iter().map(|row| parse_id_cell(row.first())).collect();

        let desired = record.sample_ids();
        let plan = reconcile::plan(self.config.first_id_row, &observed, &desired);
        let received: HashMap<SampleId, NaiveDate> = record
            .samples
            .iter()
            .map(|s| (s.unique_id, s.date_received))
            .collect();

        for row in &plan.blank_rows {
            self.store.write_range(
                &doc_path,
                &self.config.worksheet,
                &format!("A{row}:B{row}"),
                &vec![vec![Value::Null, Value::Null]],
            )?;
        }
        for (row, id) in &plan.appends {
            let date = received
                .get(id)
                .map(|d| json!(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
            self.store.write_range(
                &doc_path,
                &self.config.worksheet,
                &format!("A{row}:B{row}"),
                &vec![vec![json!(id.0), date]],
            )?;
        }

        self.tracker.clear_needs_update(number)?;
        info!(
            "opportunity {number}: id column reconciled ({} blanked, {} appended)",
            plan.blank_rows.len(),
            plan.appends.len()
        );
        Ok(plan)
    }

    /// Upload a dated CSV snapshot of the sample set to the sales folder.
    /// Export bookkeeping is bumped only after the upload succeeded.
    pub fn export_documentation(
        &self,
        number: &OpportunityNumber,
        today: NaiveDate,
    ) -> Result<String, SyncError> {
        let record = self.tracker.read(number)?;
        let bytes = crate::export::snapshot_csv(&record)?;

        archive::ensure_root(self.store, &self.config.sales_root)?;
        let name = self.config.export_name(number, today);
        self.store
            .upload_file(&self.config.sales_root, &name, &bytes)?;

        let count = self.tracker.record_export(number, Utc::now())?;
        info!("opportunity {number}: exported {name} (export #{count})");
        Ok(name)
    }

    /// Move the opportunity folder under the archive root and drop the
    /// stored folder reference, re-flagging the opportunity as `new` so a
    /// future sample addition re-provisions (by restoring) the folder.
    pub fn archive_opportunity(
        &self,
        number: &OpportunityNumber,
    ) -> Result<ArchiveOutcome, SyncError> {
        let outcome = archive::archive_folder(self.store, &self.config, number)?;
        if matches!(
            outcome,
            ArchiveOutcome::Archived | ArchiveOutcome::AlreadyArchived
        ) {
            self.tracker.with_record(number, |record| {
                record.opportunity.remote_folder_ref = None;
                record.opportunity.new = true;
                // No remote id column left to update.
                record.opportunity.needs_update = false;
            })?;
        }
        Ok(outcome)
    }

    // -- helpers -----------------------------------------------------------

    fn ensure_folder(&self, number: &OpportunityNumber) -> Result<ItemRef, SyncError> {
        if let Some(folder) = archive::restore_folder(self.store, &self.config, number)? {
            return Ok(folder);
        }

        archive::ensure_root(self.store, &self.config.active_root)?;
        match self.store.create_folder(&self.config.active_root, &number.0) {
            Ok(folder) => Ok(folder),
            Err(RemoteError::Conflict { .. }) => {
                // A concurrent pass created it between our find and create.
                let path = self.config.folder_path(number);
                self.store
                    .find_by_path(&path)?
                    .ok_or(RemoteError::NotFound { path })
                    .map_err(SyncError::from)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_subfolder(&self, path: &str, name: &str) -> Result<(), SyncError> {
        if self.store.find_by_path(path)?.is_some() {
            return Ok(());
        }
        let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("/");
        match self.store.create_folder(parent, name) {
            Ok(_) => Ok(()),
            Err(RemoteError::Conflict { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Interpret one id cell: numbers directly, numeric strings leniently,
/// anything else (including header text) as empty.
fn parse_id_cell(value: Option<&Value>) -> Option<u16> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|raw| u16::try_from(raw).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_cells_parse_numbers_and_numeric_strings() {
        assert_eq!(parse_id_cell(Some(&json!(1001))), Some(1001));
        assert_eq!(parse_id_cell(Some(&json!(" 1002 "))), Some(1002));
        assert_eq!(parse_id_cell(Some(&json!("Sample ID"))), None);
        assert_eq!(parse_id_cell(Some(&Value::Null)), None);
        assert_eq!(parse_id_cell(None), None);
    }

    #[test]
    fn out_of_range_numbers_are_ignored() {
        assert_eq!(parse_id_cell(Some(&json!(70000))), None);
        assert_eq!(parse_id_cell(Some(&json!(-3))), None);
    }
}
