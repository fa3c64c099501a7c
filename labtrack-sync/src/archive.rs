//! Opportunity folder archival.
//!
//! Folders move between the active root and the archive root as a
//! copy-then-delete, so an interrupted move leaves two copies rather than
//! none; the next pass re-checks both sides and converges. On a name
//! collision at the destination the incoming copy wins, because it is the
//! one that reflects current record state.

use labtrack_core::types::OpportunityNumber;
use labtrack_remote::{DocumentStore, ItemRef, RemoteError};
use tracing::info;

use crate::config::SyncConfig;
use crate::error::SyncError;

/// What an archive pass found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// The active folder was moved under the archive root.
    Archived,
    /// No active folder, but an archived one already exists.
    AlreadyArchived,
    /// Neither side has a folder for this opportunity.
    NothingToArchive,
}

/// Move an opportunity folder from the active root to the archive root.
/// Idempotent: safe to run when already archived or never provisioned.
pub fn archive_folder(
    store: &dyn DocumentStore,
    config: &SyncConfig,
    number: &OpportunityNumber,
) -> Result<ArchiveOutcome, SyncError> {
    let active = config.folder_path(number);
    let archived = config.archive_path(number);

    if store.find_by_path(&active)?.is_none() {
        return if store.find_by_path(&archived)?.is_some() {
            Ok(ArchiveOutcome::AlreadyArchived)
        } else {
            Ok(ArchiveOutcome::NothingToArchive)
        };
    }

    if store.find_by_path(&archived)?.is_some() {
        store.delete_item(&archived)?;
    }
    ensure_root(store, &config.archive_root)?;
    store.copy_item(&active, &config.archive_root, &number.0)?;
    store.delete_item(&active)?;
    info!("archived opportunity folder {active} -> {archived}");
    Ok(ArchiveOutcome::Archived)
}

/// Bring an archived opportunity folder back under the active root.
/// Returns the active folder when one exists afterwards, `None` when there
/// is nothing to restore.
pub fn restore_folder(
    store: &dyn DocumentStore,
    config: &SyncConfig,
    number: &OpportunityNumber,
) -> Result<Option<ItemRef>, SyncError> {
    let active = config.folder_path(number);
    if let Some(existing) = store.find_by_path(&active)? {
        return Ok(Some(existing));
    }

    let archived = config.archive_path(number);
    if store.find_by_path(&archived)?.is_none() {
        return Ok(None);
    }

    ensure_root(store, &config.active_root)?;
    let restored = store.copy_item(&archived, &config.active_root, &number.0)?;
    store.delete_item(&archived)?;
    info!("restored opportunity folder {archived} -> {active}");
    Ok(Some(restored))
}

/// Create a root folder if it does not exist yet. Roots have no parent
/// folder to create under, so this goes through the path's components.
pub(crate) fn ensure_root(store: &dyn DocumentStore, root: &str) -> Result<(), SyncError> {
    if store.find_by_path(root)?.is_some() {
        return Ok(());
    }
    let mut parent = String::from("/");
    for segment in root.split('/').filter(|s| !s.is_empty()) {
        let path = if parent == "/" {
            format!("/{segment}")
        } else {
            format!("{parent}/{segment}")
        };
        if store.find_by_path(&path)?.is_none() {
            match store.create_folder(parent.trim_end_matches('/'), segment) {
                Ok(_) => {}
                // Concurrent creator won; the folder exists either way.
                Err(RemoteError::Conflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        parent = path;
    }
    Ok(())
}
