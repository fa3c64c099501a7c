//! Labtrack remote library — document store client, credentials, errors.
//!
//! Public API surface:
//! - [`error`] — [`RemoteError`] classification
//! - [`auth`] — [`Credential`], [`CredentialProvider`], token scopes
//! - [`client`] — [`DocumentApi`] driver trait, [`DocumentStore`] session
//!   trait, [`Client`] with transparent token refresh
//! - [`memory`] — [`MemoryStore`] fake for tests

pub mod auth;
pub mod client;
pub mod error;
pub mod memory;

pub use auth::{Credential, CredentialProvider, StaticCredentialProvider, SCOPES};
pub use client::{CellGrid, Client, DocumentApi, DocumentStore, ItemRef, LinkScope};
pub use error::RemoteError;
pub use memory::MemoryStore;
