//! Documentation export snapshots.
//!
//! Builds the CSV handed to the sales folder: one row per sample, ordered
//! by sample id. Pure byte-building lives here; the synchronizer owns the
//! upload and the export bookkeeping.

use labtrack_core::types::OpportunityRecord;

use crate::error::SyncError;

const HEADER: [&str; 10] = [
    "Sample ID",
    "Opportunity Number",
    "Customer",
    "RSM",
    "Description",
    "Quantity",
    "Date Received",
    "Storage Location",
    "Audit Due Date",
    "Last Audit Date",
];

/// Render one opportunity's samples as CSV bytes.
pub fn snapshot_csv(record: &OpportunityRecord) -> Result<Vec<u8>, SyncError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    let mut samples: Vec<_> = record.samples.iter().collect();
    samples.sort_by_key(|s| s.unique_id);
    for sample in samples {
        writer.write_record([
            sample.unique_id.to_string(),
            sample.opportunity_number.to_string(),
            sample.customer.clone(),
            sample.rsm.clone(),
            sample.description.clone(),
            sample.quantity.to_string(),
            sample.date_received.format("%Y-%m-%d").to_string(),
            sample
                .storage_location
                .map(|loc| loc.as_str().to_string())
                .unwrap_or_default(),
            sample
                .audit_due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            sample
                .last_audit_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| SyncError::Csv(csv::Error::from(e.into_error())))
}
