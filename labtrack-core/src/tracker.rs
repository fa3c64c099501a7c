//! Synchronization flag tracking.
//!
//! The synchronizer and the CRUD layer both mutate opportunity flags, and a
//! flag transition must never clobber a concurrent write to the same record.
//! [`StateTracker`] serializes access per opportunity: every mutation goes
//! through a per-opportunity mutex wrapping a load-modify-save cycle, so two
//! flag writers interleave at record granularity, never mid-file.
//!
//! Flag semantics:
//! - `new` is cleared only after the remote folder, template, and metadata
//!   all exist (the folder reference is stored in the same write)
//! - `needs_update` is cleared after the remote id column has been
//!   confirmed written, or when the folder is archived and no id column
//!   remains
//! - a failed remote pass leaves both flags untouched, so the next scheduler
//!   cycle retries the work

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store;
use crate::types::{OpportunityNumber, OpportunityRecord, RemoteFolderRef};

/// Per-opportunity serialized access to flag state.
///
/// Cheap to clone; clones share the same lock table.
#[derive(Debug, Clone)]
pub struct StateTracker {
    home: PathBuf,
    locks: Arc<Mutex<HashMap<OpportunityNumber, Arc<Mutex<()>>>>>,
}

impl StateTracker {
    /// Tracker rooted at an explicit home directory.
    pub fn new_at(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Tracker rooted at the real home directory.
    pub fn new() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Ok(Self::new_at(&home))
    }

    /// Run a locked load-modify-save cycle on one opportunity record.
    ///
    /// The record is re-read under the lock, so the closure always sees the
    /// latest committed state.
    pub fn with_record<T>(
        &self,
        number: &OpportunityNumber,
        mutate: impl FnOnce(&mut OpportunityRecord) -> T,
    ) -> Result<T, StoreError> {
        let lock = self.lock_for(number);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut record = store::load_record_at(&self.home, number)?;
        let out = mutate(&mut record);
        record.opportunity.updated_at = Utc::now();
        store::save_record_at(&self.home, &record)?;
        Ok(out)
    }

    /// Read a record without mutating it (still under the lock, so a reader
    /// never observes a half-applied transition).
    pub fn read(&self, number: &OpportunityNumber) -> Result<OpportunityRecord, StoreError> {
        let lock = self.lock_for(number);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        store::load_record_at(&self.home, number)
    }

    /// Flag an opportunity as needing folder provisioning.
    pub fn mark_new(&self, number: &OpportunityNumber) -> Result<(), StoreError> {
        self.with_record(number, |record| {
            record.opportunity.new = true;
        })
    }

    /// Flag an opportunity's remote id column as stale.
    pub fn mark_needs_update(&self, number: &OpportunityNumber) -> Result<(), StoreError> {
        self.with_record(number, |record| {
            record.opportunity.needs_update = true;
        })
    }

    /// Record successful folder provisioning: stores the remote folder
    /// reference and clears `new` in one write.
    pub fn clear_new(
        &self,
        number: &OpportunityNumber,
        folder_ref: RemoteFolderRef,
    ) -> Result<(), StoreError> {
        self.with_record(number, |record| {
            record.opportunity.remote_folder_ref = Some(folder_ref);
            record.opportunity.new = false;
        })
    }

    /// Record a confirmed id column write.
    pub fn clear_needs_update(&self, number: &OpportunityNumber) -> Result<(), StoreError> {
        self.with_record(number, |record| {
            record.opportunity.needs_update = false;
        })
    }

    /// Record a completed documentation export: bumps the counter and stamps
    /// the export time. Called only after the snapshot upload succeeded.
    pub fn record_export(
        &self,
        number: &OpportunityNumber,
        at: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.with_record(number, |record| {
            record.opportunity.export_count += 1;
            record.opportunity.last_export_at = Some(at);
            record.opportunity.export_count
        })
    }

    fn lock_for(&self, number: &OpportunityNumber) -> Arc<Mutex<()>> {
        let mut table = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table
            .entry(number.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StateTracker, OpportunityNumber) {
        let home = TempDir::new().expect("tempdir");
        let number = OpportunityNumber::from("7001");
        store::create_opportunity_at(home.path(), number.clone(), "Acme Foods", "Pat Doe", "Trial")
            .expect("create");
        let tracker = StateTracker::new_at(home.path());
        (home, tracker, number)
    }

    fn folder_ref() -> RemoteFolderRef {
        RemoteFolderRef {
            id: "item-7001".to_string(),
            url: "https://docs.example/7001".to_string(),
        }
    }

    #[test]
    fn clear_new_stores_folder_ref_atomically() {
        let (home, tracker, number) = setup();
        tracker.clear_new(&number, folder_ref()).expect("clear");

        let record = store::load_record_at(home.path(), &number).expect("load");
        assert!(!record.opportunity.new);
        assert!(record.opportunity.is_consistent());
        let stored = record.opportunity.remote_folder_ref.expect("folder ref");
        assert_eq!(stored.id, "item-7001");
    }

    #[test]
    fn needs_update_round_trip() {
        let (home, tracker, number) = setup();
        tracker.mark_needs_update(&number).expect("mark");
        assert!(
            store::load_record_at(home.path(), &number)
                .expect("load")
                .opportunity
                .needs_update
        );

        tracker.clear_needs_update(&number).expect("clear");
        assert!(
            !store::load_record_at(home.path(), &number)
                .expect("load")
                .opportunity
                .needs_update
        );
    }

    #[test]
    fn record_export_bumps_count_and_timestamp() {
        let (_home, tracker, number) = setup();
        let at = Utc::now();
        assert_eq!(tracker.record_export(&number, at).expect("export"), 1);
        assert_eq!(tracker.record_export(&number, at).expect("export"), 2);

        let record = tracker.read(&number).expect("read");
        assert_eq!(record.opportunity.export_count, 2);
        assert_eq!(record.opportunity.last_export_at, Some(at));
    }

    #[test]
    fn missing_opportunity_propagates_not_found() {
        let home = TempDir::new().expect("tempdir");
        let tracker = StateTracker::new_at(home.path());
        let err = tracker
            .mark_new(&OpportunityNumber::from("9999"))
            .unwrap_err();
        assert!(matches!(err, StoreError::OpportunityNotFound { .. }));
    }

    #[test]
    fn concurrent_transitions_do_not_lose_writes() {
        let (home, tracker, number) = setup();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                let number = number.clone();
                std::thread::spawn(move || {
                    tracker
                        .with_record(&number, |record| {
                            record.opportunity.export_count += 1;
                        })
                        .expect("locked write");
                })
            })
            .collect();
        for handle in threads {
            handle.join().expect("join");
        }

        let record = store::load_record_at(home.path(), &number).expect("load");
        assert_eq!(record.opportunity.export_count, 8);
    }
}
