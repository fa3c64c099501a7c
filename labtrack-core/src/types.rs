//! Domain types for the LabTrack store.
//!
//! All timestamps are `chrono` UTC values; calendar-only fields (received
//! dates, audit due dates) use `NaiveDate`. Everything is serializable via
//! serde + serde_yaml.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed opportunity number — the immutable key that names the
/// local record, the remote folder, and the documentation workbook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpportunityNumber(pub String);

impl fmt::Display for OpportunityNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for OpportunityNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OpportunityNumber {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A sample's globally unique 4-digit identifier (1000–9999).
///
/// Assigned from the unused pool at creation, retired back to the pool on
/// deletion. Never reused while a sample still references it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SampleId(pub u16);

impl SampleId {
    pub const MIN: u16 = 1000;
    pub const MAX: u16 = 9999;

    /// Whether the raw value lies in the valid 4-digit pool.
    pub fn in_pool(raw: u16) -> bool {
        (Self::MIN..=Self::MAX).contains(&raw)
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Named physical storage locations, each bound to an audit-cycle length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLocation {
    #[serde(rename = "Test Lab Fridge")]
    TestLabFridge,
    #[serde(rename = "Test Lab Freezer")]
    TestLabFreezer,
    #[serde(rename = "Walk-in Fridge")]
    WalkInFridge,
    #[serde(rename = "Walk-in Freezer")]
    WalkInFreezer,
    #[serde(rename = "Dry Food Storage")]
    DryFoodStorage,
    #[serde(rename = "Empty Case Storage")]
    EmptyCaseStorage,
}

impl StorageLocation {
    pub const ALL: [StorageLocation; 6] = [
        StorageLocation::TestLabFridge,
        StorageLocation::TestLabFreezer,
        StorageLocation::WalkInFridge,
        StorageLocation::WalkInFreezer,
        StorageLocation::DryFoodStorage,
        StorageLocation::EmptyCaseStorage,
    ];

    /// Audit cycle for samples stored at this location.
    ///
    /// Fridges are audited every 3 weeks; freezers and dry/empty-case
    /// storage every 8.
    pub fn audit_cycle(self) -> Duration {
        match self {
            StorageLocation::TestLabFridge | StorageLocation::WalkInFridge => Duration::weeks(3),
            StorageLocation::TestLabFreezer
            | StorageLocation::WalkInFreezer
            | StorageLocation::DryFoodStorage
            | StorageLocation::EmptyCaseStorage => Duration::weeks(8),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StorageLocation::TestLabFridge => "Test Lab Fridge",
            StorageLocation::TestLabFreezer => "Test Lab Freezer",
            StorageLocation::WalkInFridge => "Walk-in Fridge",
            StorageLocation::WalkInFreezer => "Walk-in Freezer",
            StorageLocation::DryFoodStorage => "Dry Food Storage",
            StorageLocation::EmptyCaseStorage => "Empty Case Storage",
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Reference to the opportunity's folder in the remote document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolderRef {
    /// Opaque item id assigned by the remote store.
    pub id: String,
    /// Shareable browser URL for the folder.
    pub url: String,
}

/// A customer/project grouping that owns zero or more samples and one
/// remote documentation folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_number: OpportunityNumber,
    pub customer: String,
    pub rsm: String,
    #[serde(default)]
    pub description: String,
    /// Set once the remote folder exists; cleared when archived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_folder_ref: Option<RemoteFolderRef>,
    /// True until the folder/template/metadata have been created remotely.
    pub new: bool,
    /// True while the remote id column is stale relative to local samples.
    pub needs_update: bool,
    #[serde(default)]
    pub export_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_export_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Invariant from the data model: a non-new opportunity always has a
    /// remote folder reference.
    pub fn is_consistent(&self) -> bool {
        self.new || self.remote_folder_ref.is_some()
    }
}

/// A physical item tracked by a unique 4-digit id, belonging to exactly
/// one opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub unique_id: SampleId,
    pub opportunity_number: OpportunityNumber,
    pub customer: String,
    pub rsm: String,
    #[serde(default)]
    pub description: String,
    pub quantity: u32,
    pub date_received: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<StorageLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_audit_date: Option<NaiveDate>,
    /// "Currently compliant" flag, mutated only by an explicit audit action.
    #[serde(default)]
    pub audit: bool,
}

impl Sample {
    /// Assign (or clear) the storage location and re-derive the audit due
    /// date from `now` + the location's cycle length.
    pub fn set_storage_location(&mut self, location: Option<StorageLocation>, now: NaiveDate) {
        self.storage_location = location;
        self.audit_due_date = location.map(|loc| now + loc.audit_cycle());
    }

    /// Record a completed audit: compliant as of `now`, next due one cycle
    /// out. No-op on the due date when no location is assigned.
    pub fn record_audit(&mut self, now: NaiveDate) {
        self.last_audit_date = Some(now);
        self.audit = true;
        self.audit_due_date = self.storage_location.map(|loc| now + loc.audit_cycle());
    }
}

/// On-disk record: one opportunity plus its samples, persisted as a single
/// YAML document so flag and sample mutations commit atomically together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub opportunity: Opportunity,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl OpportunityRecord {
    /// Sample ids for this opportunity in ascending numeric order.
    pub fn sample_ids(&self) -> Vec<SampleId> {
        let mut ids: Vec<SampleId> = self.samples.iter().map(|s| s.unique_id).collect();
        ids.sort();
        ids
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(OpportunityNumber::from("7001").to_string(), "7001");
        assert_eq!(SampleId(1042).to_string(), "1042");
    }

    #[test]
    fn sample_id_pool_bounds() {
        assert!(!SampleId::in_pool(999));
        assert!(SampleId::in_pool(1000));
        assert!(SampleId::in_pool(9999));
        assert!(!SampleId::in_pool(10000));
    }

    #[test]
    fn fridge_locations_use_three_week_cycle() {
        assert_eq!(
            StorageLocation::TestLabFridge.audit_cycle(),
            Duration::weeks(3)
        );
        assert_eq!(
            StorageLocation::WalkInFridge.audit_cycle(),
            Duration::weeks(3)
        );
    }

    #[test]
    fn freezer_and_dry_locations_use_eight_week_cycle() {
        for loc in [
            StorageLocation::TestLabFreezer,
            StorageLocation::WalkInFreezer,
            StorageLocation::DryFoodStorage,
            StorageLocation::EmptyCaseStorage,
        ] {
            assert_eq!(loc.audit_cycle(), Duration::weeks(8));
        }
    }

    fn sample(id: u16) -> Sample {
        Sample {
            unique_id: SampleId(id),
            opportunity_number: OpportunityNumber::from("7001"),
            customer: "Acme Foods".to_string(),
            rsm: "Pat Doe".to_string(),
            description: String::new(),
            quantity: 1,
            date_received: NaiveDate::from_ymd_opt(2025, 3, 10).expect("date"),
            storage_location: None,
            audit_due_date: None,
            last_audit_date: None,
            audit: false,
        }
    }

    #[test]
    fn location_change_recomputes_due_date() {
        let mut s = sample(1001);
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).expect("date");

        s.set_storage_location(Some(StorageLocation::TestLabFridge), day);
        assert_eq!(s.audit_due_date, Some(day + Duration::weeks(3)));

        s.set_storage_location(Some(StorageLocation::WalkInFreezer), day);
        assert_eq!(s.audit_due_date, Some(day + Duration::weeks(8)));

        s.set_storage_location(None, day);
        assert_eq!(s.audit_due_date, None);
    }

    #[test]
    fn audit_resets_due_date_from_audit_moment() {
        let mut s = sample(1001);
        let received = NaiveDate::from_ymd_opt(2025, 3, 10).expect("date");
        let audited = NaiveDate::from_ymd_opt(2025, 3, 24).expect("date");

        s.set_storage_location(Some(StorageLocation::TestLabFridge), received);
        s.record_audit(audited);

        assert!(s.audit);
        assert_eq!(s.last_audit_date, Some(audited));
        assert_eq!(s.audit_due_date, Some(audited + Duration::weeks(3)));
    }

    #[test]
    fn record_sample_ids_sorted_ascending() {
        let now = Utc::now();
        let record = OpportunityRecord {
            opportunity: Opportunity {
                opportunity_number: OpportunityNumber::from("7001"),
                customer: "Acme Foods".to_string(),
                rsm: "Pat Doe".to_string(),
                description: String::new(),
                remote_folder_ref: None,
                new: true,
                needs_update: false,
                export_count: 0,
                last_export_at: None,
                created_at: now,
                updated_at: now,
            },
            samples: vec![sample(1004), sample(1001), sample(1002)],
        };
        assert_eq!(
            record.sample_ids(),
            vec![SampleId(1001), SampleId(1002), SampleId(1004)]
        );
    }

    #[test]
    fn consistency_invariant() {
        let now = Utc::now();
        let mut opp = Opportunity {
            opportunity_number: OpportunityNumber::from("7001"),
            customer: String::new(),
            rsm: String::new(),
            description: String::new(),
            remote_folder_ref: None,
            new: true,
            needs_update: false,
            export_count: 0,
            last_export_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(opp.is_consistent());

        opp.new = false;
        assert!(!opp.is_consistent(), "non-new without folder ref is broken");

        opp.remote_folder_ref = Some(RemoteFolderRef {
            id: "item-1".to_string(),
            url: "https://docs.example/7001".to_string(),
        });
        assert!(opp.is_consistent());
    }

    #[test]
    fn record_serde_roundtrip() {
        let now = Utc::now();
        let record = OpportunityRecord {
            opportunity: Opportunity {
                opportunity_number: OpportunityNumber::from("7001"),
                customer: "Acme Foods".to_string(),
                rsm: "Pat Doe".to_string(),
                description: "Case packer trial".to_string(),
                remote_folder_ref: None,
                new: true,
                needs_update: true,
                export_count: 2,
                last_export_at: Some(now),
                created_at: now,
                updated_at: now,
            },
            samples: vec![sample(1001)],
        };
        let yaml = serde_yaml::to_string(&record).expect("serialize");
        let back: OpportunityRecord = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn storage_location_serde_uses_display_names() {
        let yaml = serde_yaml::to_string(&StorageLocation::WalkInFreezer).expect("serialize");
        assert_eq!(yaml.trim(), "Walk-in Freezer");
    }
}
