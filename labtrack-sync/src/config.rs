//! Synchronizer configuration.
//!
//! Loaded from `~/.labtrack/config.yaml` when present; every field has a
//! default, so a missing file means default layout. Paths are document
//! library paths, not filesystem paths.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use labtrack_core::types::OpportunityNumber;

use crate::error::{io_err, SyncError};

/// Remote library layout and workbook geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Root folder holding one folder per active opportunity.
    pub active_root: String,
    /// Root folder archived opportunity folders move under.
    pub archive_root: String,
    /// Folder the sales team reads CSV exports from.
    pub sales_root: String,
    /// Blank documentation workbook copied for each opportunity.
    pub template_path: String,
    /// Worksheet holding metadata cells and the id column.
    pub worksheet: String,
    /// First worksheet row of the sample id column.
    pub first_id_row: u32,
    /// Rows scanned when reading the id column.
    pub id_scan_rows: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_root: "/Opportunities".to_string(),
            archive_root: "/_Archive".to_string(),
            sales_root: "/Sales".to_string(),
            template_path: "/Templates/Documentation_Template.xlsx".to_string(),
            worksheet: "Sheet1".to_string(),
            first_id_row: 8,
            id_scan_rows: 200,
        }
    }
}

impl SyncConfig {
    /// `<home>/.labtrack/config.yaml`
    pub fn path_at(home: &Path) -> PathBuf {
        home.join(".labtrack").join("config.yaml")
    }

    /// Load from the config file, falling back to defaults when absent.
    pub fn load_at(home: &Path) -> Result<Self, SyncError> {
        let path = Self::path_at(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| SyncError::Config { path, source: e })
    }

    // -- layout ------------------------------------------------------------

    /// Active folder for one opportunity.
    pub fn folder_path(&self, number: &OpportunityNumber) -> String {
        format!("{}/{}", self.active_root, number.0)
    }

    /// Archived folder for one opportunity.
    pub fn archive_path(&self, number: &OpportunityNumber) -> String {
        format!("{}/{}", self.archive_root, number.0)
    }

    /// `Samples` subfolder inside the opportunity folder.
    pub fn samples_path(&self, number: &OpportunityNumber) -> String {
        format!("{}/Samples", self.folder_path(number))
    }

    /// Documentation workbook file name.
    pub fn doc_name(&self, number: &OpportunityNumber) -> String {
        format!("Documentation_{}.xlsx", number.0)
    }

    /// Full path to the documentation workbook.
    pub fn doc_path(&self, number: &OpportunityNumber) -> String {
        format!("{}/{}", self.samples_path(number), self.doc_name(number))
    }

    /// CSV snapshot file name, dated so successive exports are distinct.
    pub fn export_name(&self, number: &OpportunityNumber, date: NaiveDate) -> String {
        format!("Samples_{}_{}.csv", number.0, date.format("%Y-%m-%d"))
    }

    /// A1 range covering the id scan window: the id column only. Date
    /// cells are written per row from local records, never read back.
    pub fn id_scan_range(&self) -> String {
        let last = self.first_id_row + self.id_scan_rows - 1;
        format!("A{}:A{}", self.first_id_row, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing() {
        let home = TempDir::new().expect("tempdir");
        let config = SyncConfig::load_at(home.path()).expect("load");
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.worksheet, "Sheet1");
        assert_eq!(config.first_id_row, 8);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let home = TempDir::new().expect("tempdir");
        let dir = home.path().join(".labtrack");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("config.yaml"), "active_root: /Projects\n").expect("write");

        let config = SyncConfig::load_at(home.path()).expect("load");
        assert_eq!(config.active_root, "/Projects");
        assert_eq!(config.archive_root, "/_Archive");
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().expect("tempdir");
        let dir = home.path().join(".labtrack");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("config.yaml"), "active_root: [unclosed\n").expect("write");

        let err = SyncConfig::load_at(home.path()).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn layout_paths() {
        let config = SyncConfig::default();
        let number = OpportunityNumber::from("7001");
        assert_eq!(config.folder_path(&number), "/Opportunities/7001");
        assert_eq!(config.samples_path(&number), "/Opportunities/7001/Samples");
        assert_eq!(
            config.doc_path(&number),
            "/Opportunities/7001/Samples/Documentation_7001.xlsx"
        );
        assert_eq!(
            config.export_name(&number, NaiveDate::from_ymd_opt(2025, 3, 10).expect("date")),
            "Samples_7001_2025-03-10.csv"
        );
        assert_eq!(config.id_scan_range(), "A8:A207");
    }
}
