//! Id column reconciliation planning.
//!
//! Pure planning over an observed id column and the desired id set. The
//! plan preserves existing row positions:
//! - rows whose id is no longer desired are blanked in place, never
//!   compacted, so neighbouring manual annotations keep their rows
//! - missing ids are appended in ascending order after the last observed
//!   occupied row, so a just-blanked row is never immediately reused

use std::collections::BTreeSet;

use labtrack_core::types::SampleId;

/// Worksheet edits that bring the id column in line with the desired set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPlan {
    /// Absolute worksheet rows to blank (id and date cells).
    pub blank_rows: Vec<u32>,
    /// `(row, id)` pairs to write, ids ascending, rows consecutive.
    pub appends: Vec<(u32, SampleId)>,
}

impl RowPlan {
    pub fn is_empty(&self) -> bool {
        self.blank_rows.is_empty() && self.appends.is_empty()
    }
}

/// Plan the edits for one workbook.
///
/// `observed[i]` is the id found at worksheet row `first_row + i`, `None`
/// for an empty cell. Duplicate observed rows for the same id keep the
/// first and blank the rest.
pub fn plan(first_row: u32, observed: &[Option<u16>], desired: &[SampleId]) -> RowPlan {
    let desired_set: BTreeSet<u16> = desired.iter().map(|id| id.0).collect();

    let mut blank_rows = Vec::new();
    let mut kept = BTreeSet::new();
    let mut last_occupied: Option<u32> = None;
    for (offset, cell) in observed.iter().enumerate() {
        let row = first_row + offset as u32;
        let Some(id) = cell else { continue };
        // Every occupied row pushes the append cursor past it, kept or not;
        // a blanked row keeps whatever row-tied annotations it had, so new
        // ids must not land on it.
        last_occupied = Some(row);
        if !(desired_set.contains(id) && kept.insert(*id)) {
            blank_rows.push(row);
        }
    }

    let mut next_row = last_occupied.map_or(first_row, |row| row + 1);
    let mut appends = Vec::new();
    for id in &desired_set {
        if kept.contains(id) {
            continue;
        }
        appends.push((next_row, SampleId(*id)));
        next_row += 1;
    }

    RowPlan {
        blank_rows,
        appends,
    }
}
