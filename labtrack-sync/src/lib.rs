//! Labtrack sync library — remote folder lifecycle, id column
//! reconciliation, exports, archival, retry.
//!
//! Public API surface:
//! - [`config`] — [`SyncConfig`] library layout and workbook geometry
//! - [`error`] — [`SyncError`]
//! - [`reconcile`] — pure id column planning ([`reconcile::RowPlan`])
//! - [`synchronizer`] — [`Synchronizer`] flag-driven remote passes
//! - [`archive`] — folder moves between active and archive roots
//! - [`export`] — CSV snapshot building
//! - [`retry`] — [`RetryPolicy`] bounded backoff

pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod reconcile;
pub mod retry;
pub mod synchronizer;

pub use archive::ArchiveOutcome;
pub use config::SyncConfig;
pub use error::SyncError;
pub use retry::RetryPolicy;
pub use synchronizer::Synchronizer;
