//! Per-opportunity YAML store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.labtrack/
//!   opportunities/
//!     <opportunity_number>.yaml  (one record per opportunity — mode 0600)
//! ```
//!
//! Each file holds an [`OpportunityRecord`]: the opportunity row, its
//! synchronization flags, and all of its samples. A flag mutation and the
//! sample mutation that caused it are always written in the same atomic
//! save, so the flag can never be observed without the fact.
//!
//! # API pattern
//!
//! Every mutating function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use rand::Rng;
use tracing::debug;

use crate::error::StoreError;
use crate::types::{
    Opportunity, OpportunityNumber, OpportunityRecord, Sample, SampleId, StorageLocation,
};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.labtrack/opportunities/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn opportunities_dir_at(home: &Path) -> Result<PathBuf, StoreError> {
    let dir = home.join(".labtrack").join("opportunities");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.labtrack/opportunities/<number>.yaml` — pure, no I/O.
pub fn record_path_at(home: &Path, number: &OpportunityNumber) -> PathBuf {
    home.join(".labtrack")
        .join("opportunities")
        .join(format!("{}.yaml", number.0))
}

/// Lists all opportunity numbers with a record file, sorted.
pub fn list_numbers_at(home: &Path) -> Result<Vec<OpportunityNumber>, StoreError> {
    let dir = home.join(".labtrack").join("opportunities");
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut numbers: Vec<OpportunityNumber> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.strip_suffix(".yaml")
                .map(|stem| OpportunityNumber::from(stem.to_owned()))
        })
        .collect();
    numbers.sort();
    Ok(numbers)
}

/// `list_numbers_at` convenience wrapper.
pub fn list_numbers() -> Result<Vec<OpportunityNumber>, StoreError> {
    list_numbers_at(&home()?)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load a single opportunity record.
///
/// Returns `StoreError::OpportunityNotFound` if absent,
/// `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_record_at(
    home: &Path,
    number: &OpportunityNumber,
) -> Result<OpportunityRecord, StoreError> {
    let path = record_path_at(home, number);
    if !path.exists() {
        return Err(StoreError::OpportunityNotFound {
            number: number.clone(),
            path,
        });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// `load_record_at` convenience wrapper.
pub fn load_record(number: &OpportunityNumber) -> Result<OpportunityRecord, StoreError> {
    load_record_at(&home()?, number)
}

/// Load every opportunity record, sorted by opportunity number.
pub fn list_records_at(home: &Path) -> Result<Vec<OpportunityRecord>, StoreError> {
    let mut records = Vec::new();
    for number in list_numbers_at(home)? {
        records.push(load_record_at(home, &number)?);
    }
    Ok(records)
}

/// `list_records_at` convenience wrapper.
pub fn list_records() -> Result<Vec<OpportunityRecord>, StoreError> {
    list_records_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save an opportunity record.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub fn save_record_at(home: &Path, record: &OpportunityRecord) -> Result<(), StoreError> {
    opportunities_dir_at(home)?; // create dir + 0700 if absent
    let number = &record.opportunity.opportunity_number;
    let path = record_path_at(home, number);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", number.0));

    let yaml = serde_yaml::to_string(record)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_record_at` convenience wrapper.
pub fn save_record(record: &OpportunityRecord) -> Result<(), StoreError> {
    save_record_at(&home()?, record)
}

// ---------------------------------------------------------------------------
// 4. Sample id pool
// ---------------------------------------------------------------------------

/// Collect every sample id currently assigned across all opportunities.
pub fn used_sample_ids_at(home: &Path) -> Result<BTreeSet<u16>, StoreError> {
    let mut used = BTreeSet::new();
    for record in list_records_at(home)? {
        for sample in &record.samples {
            used.insert(sample.unique_id.0);
        }
    }
    Ok(used)
}

/// Draw an unused id from the 1000–9999 pool and reserve it in `used`.
///
/// Random draw with bounded retries, then a linear sweep so the pool is
/// fully usable even when nearly exhausted.
fn draw_sample_id(used: &mut BTreeSet<u16>) -> Result<SampleId, StoreError> {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let candidate = rng.gen_range(SampleId::MIN..=SampleId::MAX);
        if used.insert(candidate) {
            return Ok(SampleId(candidate));
        }
    }
    for candidate in SampleId::MIN..=SampleId::MAX {
        if used.insert(candidate) {
            return Ok(SampleId(candidate));
        }
    }
    Err(StoreError::IdPoolExhausted)
}

// ---------------------------------------------------------------------------
// 5. Opportunity CRUD
// ---------------------------------------------------------------------------

/// Synchronizer work that a CRUD write has made necessary.
///
/// Returned by the mutating functions below so the caller can enqueue the
/// matching tasks *after* the local write has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Folder/template/metadata must be created or restored remotely.
    EnsureFolder,
    /// The remote id column is stale.
    SyncSampleIds,
    /// The last sample is gone; the remote folder moves to the archive.
    ArchiveFolder,
}

/// Register an opportunity.
///
/// Idempotent: if the record already exists, loads and returns it unchanged.
/// New records start with `new = true` and no samples.
pub fn create_opportunity_at(
    home: &Path,
    number: OpportunityNumber,
    customer: &str,
    rsm: &str,
    description: &str,
) -> Result<OpportunityRecord, StoreError> {
    let path = record_path_at(home, &number);
    if path.exists() {
        return load_record_at(home, &number);
    }

    let now = Utc::now();
    let record = OpportunityRecord {
        opportunity: Opportunity {
            opportunity_number: number,
            customer: customer.to_owned(),
            rsm: rsm.to_owned(),
            description: description.to_owned(),
            remote_folder_ref: None,
            new: true,
            needs_update: false,
            export_count: 0,
            last_export_at: None,
            created_at: now,
            updated_at: now,
        },
        samples: vec![],
    };
    save_record_at(home, &record)?;
    debug!("registered opportunity {}", record.opportunity.opportunity_number);
    Ok(record)
}

/// `create_opportunity_at` convenience wrapper.
pub fn create_opportunity(
    number: OpportunityNumber,
    customer: &str,
    rsm: &str,
    description: &str,
) -> Result<OpportunityRecord, StoreError> {
    create_opportunity_at(&home()?, number, customer, rsm, description)
}

/// Result of a batch sample creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBatch {
    pub created: Vec<SampleId>,
    pub triggers: Vec<SyncTrigger>,
}

/// Create `quantity` samples under one opportunity in a single atomic write.
///
/// Creates the opportunity record first if it does not exist. Ids are drawn
/// from the shared unused pool; the `needs_update` flag is set in the same
/// save as the new sample rows. The returned triggers tell the caller which
/// synchronizer tasks to enqueue post-commit:
/// - an opportunity with no remote presence yet (or whose folder may be in
///   the archive because it had zero samples) also needs `EnsureFolder`;
/// - every batch needs `SyncSampleIds`.
pub fn add_samples_at(
    home: &Path,
    number: &OpportunityNumber,
    quantity: u32,
    customer: &str,
    rsm: &str,
    description: &str,
    date_received: NaiveDate,
) -> Result<SampleBatch, StoreError> {
    let mut record = match load_record_at(home, number) {
        Ok(record) => record,
        Err(StoreError::OpportunityNotFound { .. }) => {
            create_opportunity_at(home, number.clone(), customer, rsm, description)?
        }
        Err(err) => return Err(err),
    };

    let had_samples = !record.samples.is_empty();
    let mut used = used_sample_ids_at(home)?;
    let mut created = Vec::with_capacity(quantity as usize);
    for _ in 0..quantity {
        let id = draw_sample_id(&mut used)?;
        created.push(id);
        record.samples.push(Sample {
            unique_id: id,
            opportunity_number: number.clone(),
            customer: customer.to_owned(),
            rsm: rsm.to_owned(),
            description: description.to_owned(),
            quantity: 1,
            date_received,
            storage_location: None,
            audit_due_date: None,
            last_audit_date: None,
            audit: false,
        });
    }

    record.opportunity.needs_update = true;
    record.opportunity.updated_at = Utc::now();
    save_record_at(home, &record)?;

    let mut triggers = Vec::new();
    if record.opportunity.new || !had_samples {
        // First-time creation, or the folder may sit in the archive after
        // the sample count previously dropped to zero. EnsureFolder resolves
        // both: restore if archived, create if absent.
        triggers.push(SyncTrigger::EnsureFolder);
    }
    triggers.push(SyncTrigger::SyncSampleIds);

    debug!(
        "added {} sample(s) to opportunity {number}: {:?}",
        created.len(),
        created
    );
    Ok(SampleBatch { created, triggers })
}

/// `add_samples_at` convenience wrapper.
#[allow(clippy::too_many_arguments)]
pub fn add_samples(
    number: &OpportunityNumber,
    quantity: u32,
    customer: &str,
    rsm: &str,
    description: &str,
    date_received: NaiveDate,
) -> Result<SampleBatch, StoreError> {
    add_samples_at(
        &home()?,
        number,
        quantity,
        customer,
        rsm,
        description,
        date_received,
    )
}

/// Delete one sample, retiring its id back to the unused pool.
///
/// Sets `needs_update` in the same write. When the deleted sample was the
/// opportunity's last, an `ArchiveFolder` trigger is also returned.
pub fn delete_sample_at(
    home: &Path,
    number: &OpportunityNumber,
    id: SampleId,
) -> Result<Vec<SyncTrigger>, StoreError> {
    let mut record = load_record_at(home, number)?;
    let before = record.samples.len();
    record.samples.retain(|s| s.unique_id != id);
    if record.samples.len() == before {
        return Err(StoreError::SampleNotFound {
            id,
            number: number.clone(),
        });
    }

    record.opportunity.needs_update = true;
    record.opportunity.updated_at = Utc::now();
    save_record_at(home, &record)?;

    let mut triggers = vec![SyncTrigger::SyncSampleIds];
    if record.samples.is_empty() {
        triggers.push(SyncTrigger::ArchiveFolder);
    }
    debug!("deleted sample {id} from opportunity {number}; id retired");
    Ok(triggers)
}

/// `delete_sample_at` convenience wrapper.
pub fn delete_sample(
    number: &OpportunityNumber,
    id: SampleId,
) -> Result<Vec<SyncTrigger>, StoreError> {
    delete_sample_at(&home()?, number, id)
}

// ---------------------------------------------------------------------------
// 6. Sample field mutations
// ---------------------------------------------------------------------------

/// Assign (or clear) a sample's storage location; re-derives the audit due
/// date. Does not touch synchronization flags — location is not mirrored
/// into the remote spreadsheet.
pub fn set_storage_location_at(
    home: &Path,
    number: &OpportunityNumber,
    id: SampleId,
    location: Option<StorageLocation>,
    today: NaiveDate,
) -> Result<(), StoreError> {
    with_sample(home, number, id, |sample| {
        sample.set_storage_location(location, today);
    })
}

/// Record a completed audit for one sample.
pub fn record_audit_at(
    home: &Path,
    number: &OpportunityNumber,
    id: SampleId,
    today: NaiveDate,
) -> Result<(), StoreError> {
    with_sample(home, number, id, |sample| {
        sample.record_audit(today);
    })
}

fn with_sample(
    home: &Path,
    number: &OpportunityNumber,
    id: SampleId,
    mutate: impl FnOnce(&mut Sample),
) -> Result<(), StoreError> {
    let mut record = load_record_at(home, number)?;
    let Some(sample) = record.samples.iter_mut().find(|s| s.unique_id == id) else {
        return Err(StoreError::SampleNotFound {
            id,
            number: number.clone(),
        });
    };
    mutate(sample);
    record.opportunity.updated_at = Utc::now();
    save_record_at(home, &record)
}

/// Update descriptive opportunity fields when new values differ.
///
/// Returns `true` (and marks `needs_update`, since the metadata cells in
/// the remote workbook are now stale) if anything changed.
pub fn update_opportunity_fields_at(
    home: &Path,
    number: &OpportunityNumber,
    customer: Option<&str>,
    rsm: Option<&str>,
    description: Option<&str>,
) -> Result<bool, StoreError> {
    let mut record = load_record_at(home, number)?;
    let opp = &mut record.opportunity;

    let mut changed = false;
    if let Some(customer) = customer {
        if customer != opp.customer {
            opp.customer = customer.to_owned();
            changed = true;
        }
    }
    if let Some(rsm) = rsm {
        if rsm != opp.rsm {
            opp.rsm = rsm.to_owned();
            changed = true;
        }
    }
    if let Some(description) = description {
        if description != opp.description {
            opp.description = description.to_owned();
            changed = true;
        }
    }

    if changed {
        opp.needs_update = true;
        opp.updated_at = Utc::now();
        save_record_at(home, &record)?;
    }
    Ok(changed)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
