//! Labtrack core library — domain types, record store, flag tracking, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs
//! - [`error`] — [`StoreError`]
//! - [`store`] — per-opportunity YAML persistence, sample id pool, CRUD
//! - [`tracker`] — [`StateTracker`] serialized flag transitions

pub mod error;
pub mod store;
pub mod tracker;
pub mod types;

pub use error::StoreError;
pub use tracker::StateTracker;
pub use types::{
    Opportunity, OpportunityNumber, OpportunityRecord, RemoteFolderRef, Sample, SampleId,
    StorageLocation,
};
