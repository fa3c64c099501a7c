//! Document store client.
//!
//! Two traits split the transport from the session:
//! - [`DocumentApi`] is the raw driver surface. Every call takes the
//!   credential explicitly and may fail with [`RemoteError::AuthExpired`].
//! - [`DocumentStore`] is what the synchronizer programs against. No
//!   credentials in the signatures; token lifecycle is the client's problem.
//!
//! [`Client`] bridges the two: it caches one credential, refreshes it when
//! expired, and on an `AuthExpired` rejection refreshes and retries the call
//! exactly once. A second rejection propagates.

use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use crate::auth::{Credential, CredentialProvider};
use crate::error::RemoteError;

/// Handle to a remote item (folder or file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    /// Store-assigned opaque id, stable across renames and moves.
    pub id: String,
    pub name: String,
    pub web_url: String,
}

/// A rectangular block of worksheet cells. Empty cells are JSON null.
pub type CellGrid = Vec<Vec<serde_json::Value>>;

/// Audience of a sharing link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScope {
    Organization,
    Anonymous,
}

impl LinkScope {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkScope::Organization => "organization",
            LinkScope::Anonymous => "anonymous",
        }
    }
}

/// Raw driver surface. Paths are absolute within the document library,
/// `/`-separated, rooted at the library root (for example
/// `/Opportunities/7001/Samples`).
pub trait DocumentApi: Send + Sync {
    /// Resolve a path to an item, or `None` when nothing exists there.
    fn find_by_path(
        &self,
        cred: &Credential,
        path: &str,
    ) -> Result<Option<ItemRef>, RemoteError>;

    /// Create a folder under `parent`. Fails with [`RemoteError::Conflict`]
    /// when the name is already taken.
    fn create_folder(
        &self,
        cred: &Credential,
        parent: &str,
        name: &str,
    ) -> Result<ItemRef, RemoteError>;

    /// Deep-copy an item (folders recursively) to a new parent and name.
    fn copy_item(
        &self,
        cred: &Credential,
        source: &str,
        dest_parent: &str,
        new_name: &str,
    ) -> Result<ItemRef, RemoteError>;

    /// Delete an item, recursively for folders.
    fn delete_item(&self, cred: &Credential, path: &str) -> Result<(), RemoteError>;

    /// Create or overwrite a file with raw bytes.
    fn upload_file(
        &self,
        cred: &Credential,
        parent: &str,
        name: &str,
        content: &[u8],
    ) -> Result<ItemRef, RemoteError>;

    /// Read a block of cells from a workbook, A1 notation (`"A8:B200"`).
    fn read_range(
        &self,
        cred: &Credential,
        file: &str,
        worksheet: &str,
        range: &str,
    ) -> Result<CellGrid, RemoteError>;

    /// Write a block of cells. `values` dimensions must match the range;
    /// JSON null clears the cell.
    fn write_range(
        &self,
        cred: &Credential,
        file: &str,
        worksheet: &str,
        range: &str,
        values: &CellGrid,
    ) -> Result<(), RemoteError>;

    /// Create (or fetch the existing) view-only sharing link for an item.
    fn create_view_link(
        &self,
        cred: &Credential,
        path: &str,
        scope: LinkScope,
    ) -> Result<String, RemoteError>;
}

/// Credential-free surface used by the synchronizer.
pub trait DocumentStore: Send + Sync {
    fn find_by_path(&self, path: &str) -> Result<Option<ItemRef>, RemoteError>;
    fn create_folder(&self, parent: &str, name: &str) -> Result<ItemRef, RemoteError>;
    fn copy_item(
        &self,
        source: &str,
        dest_parent: &str,
        new_name: &str,
    ) -> Result<ItemRef, RemoteError>;
    fn delete_item(&self, path: &str) -> Result<(), RemoteError>;
    fn upload_file(&self, parent: &str, name: &str, content: &[u8])
        -> Result<ItemRef, RemoteError>;
    fn read_range(
        &self,
        file: &str,
        worksheet: &str,
        range: &str,
    ) -> Result<CellGrid, RemoteError>;
    fn write_range(
        &self,
        file: &str,
        worksheet: &str,
        range: &str,
        values: &CellGrid,
    ) -> Result<(), RemoteError>;
    fn create_view_link(&self, path: &str, scope: LinkScope) -> Result<String, RemoteError>;
}

/// Session wrapper over a [`DocumentApi`] driver.
pub struct Client<A, P> {
    auth: A,
    api: P,
    cached: Mutex<Option<Credential>>,
}

impl<A: CredentialProvider, P: DocumentApi> Client<A, P> {
    pub fn new(auth: A, api: P) -> Self {
        Self {
            auth,
            api,
            cached: Mutex::new(None),
        }
    }

    /// Access the underlying driver (tests inspect fake stores through this).
    pub fn api(&self) -> &P {
        &self.api
    }

    fn current_credential(&self) -> Result<Credential, RemoteError> {
        let mut cached = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cred) = cached.as_ref() {
            if !cred.is_expired(Utc::now()) {
                return Ok(cred.clone());
            }
        }
        let fresh = self.auth.acquire()?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    fn refresh_credential(&self) -> Result<Credential, RemoteError> {
        let fresh = self.auth.acquire()?;
        let mut cached = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Run a driver call, refreshing the credential and retrying once when
    /// the token is rejected as expired.
    fn with_credential<T>(
        &self,
        call: impl Fn(&Credential) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let cred = self.current_credential()?;
        match call(&cred) {
            Err(RemoteError::AuthExpired) => {
                debug!("token rejected as expired; refreshing and retrying once");
                let fresh = self.refresh_credential()?;
                call(&fresh)
            }
            other => other,
        }
    }
}

impl<A: CredentialProvider, P: DocumentApi> DocumentStore for Client<A, P> {
    fn find_by_path(&self, path: &str) -> Result<Option<ItemRef>, RemoteError> {
        self.with_credential(|cred| self.api.find_by_path(cred, path))
    }

    fn create_folder(&self, parent: &str, name: &str) -> Result<ItemRef, RemoteError> {
        self.with_credential(|cred| self.api.create_folder(cred, parent, name))
    }

    fn copy_item(
        &self,
        source: &str,
        dest_parent: &str,
        new_name: &str,
    ) -> Result<ItemRef, RemoteError> {
        self.with_credential(|cred| self.api.copy_item(cred, source, dest_parent, new_name))
    }

    fn delete_item(&self, path: &str) -> Result<(), RemoteError> {
        self.with_credential(|cred| self.api.delete_item(cred, path))
    }

    fn upload_file(
        &self,
        parent: &str,
        name: &str,
        content: &[u8],
    ) -> Result<ItemRef, RemoteError> {
        self.with_credential(|cred| self.api.upload_file(cred, parent, name, content))
    }

    fn read_range(
        &self,
        file: &str,
        worksheet: &str,
        range: &str,
    ) -> Result<CellGrid, RemoteError> {
        self.with_credential(|cred| self.api.read_range(cred, file, worksheet, range))
    }

    fn write_range(
        &self,
        file: &str,
        worksheet: &str,
        range: &str,
        values: &CellGrid,
    ) -> Result<(), RemoteError> {
        self.with_credential(|cred| self.api.write_range(cred, file, worksheet, range, values))
    }

    fn create_view_link(&self, path: &str, scope: LinkScope) -> Result<String, RemoteError> {
        self.with_credential(|cred| self.api.create_view_link(cred, path, scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use chrono::Duration;

    use crate::memory::MemoryStore;

    /// Provider that hands out tokens from a fixed sequence.
    struct SequenceProvider {
        tokens: StdMutex<Vec<&'static str>>,
        acquired: StdMutex<u32>,
    }

    impl SequenceProvider {
        fn new(tokens: Vec<&'static str>) -> Self {
            Self {
                tokens: StdMutex::new(tokens),
                acquired: StdMutex::new(0),
            }
        }

        fn acquire_count(&self) -> u32 {
            *self.acquired.lock().expect("count")
        }
    }

    impl CredentialProvider for SequenceProvider {
        fn acquire(&self) -> Result<Credential, RemoteError> {
            let mut tokens = self.tokens.lock().expect("tokens");
            if tokens.is_empty() {
                return Err(RemoteError::AuthUnavailable {
                    message: "token sequence exhausted".into(),
                });
            }
            *self.acquired.lock().expect("count") += 1;
            Ok(Credential {
                access_token: tokens.remove(0).to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }
    }

    #[test]
    fn credential_is_cached_across_calls() {
        let api = MemoryStore::new();
        api.mkdir_all("/Opportunities");
        let provider = SequenceProvider::new(vec!["tok-1"]);
        let client = Client::new(provider, api);

        client.create_folder("/Opportunities", "7001").expect("create");
        client.find_by_path("/Opportunities/7001").expect("find");
        assert_eq!(client.auth.acquire_count(), 1);
    }

    #[test]
    fn expired_token_is_refreshed_and_call_retried_once() {
        let api = MemoryStore::new();
        api.mkdir_all("/Opportunities");
        // The store only honors the second token; the first is rejected as
        // expired even though its local expiry looks healthy.
        api.require_token("tok-2");
        let provider = SequenceProvider::new(vec!["tok-1", "tok-2"]);
        let client = Client::new(provider, api);

        let item = client
            .create_folder("/Opportunities", "7001")
            .expect("retry after refresh succeeds");
        assert_eq!(item.name, "7001");
        assert_eq!(client.auth.acquire_count(), 2);
    }

    #[test]
    fn second_rejection_propagates() {
        let api = MemoryStore::new();
        api.mkdir_all("/Opportunities");
        api.require_token("never-issued");
        let provider = SequenceProvider::new(vec!["tok-1", "tok-2"]);
        let client = Client::new(provider, api);

        let err = client.create_folder("/Opportunities", "7001").unwrap_err();
        assert_eq!(err, RemoteError::AuthExpired);
        assert_eq!(client.auth.acquire_count(), 2);
    }

    #[test]
    fn auth_unavailable_short_circuits() {
        let api = MemoryStore::new();
        let provider = SequenceProvider::new(vec![]);
        let client = Client::new(provider, api);

        let err = client.find_by_path("/Opportunities").unwrap_err();
        assert!(matches!(err, RemoteError::AuthUnavailable { .. }));
    }

    #[test]
    fn workflow_errors_pass_through_untouched() {
        let api = MemoryStore::new();
        api.mkdir_all("/Opportunities/7001");
        let provider = SequenceProvider::new(vec!["tok-1"]);
        let client = Client::new(provider, api);

        let err = client.create_folder("/Opportunities", "7001").unwrap_err();
        assert!(matches!(err, RemoteError::Conflict { .. }));
    }
}
