//! Credential acquisition for the document store.
//!
//! Tokens are short-lived bearer credentials scoped to site and file
//! read/write. The client layer caches one credential and asks its
//! [`CredentialProvider`] for a fresh one when the cached token expires or
//! a call comes back [`RemoteError::AuthExpired`].

use chrono::{DateTime, Duration, Utc};

use crate::error::RemoteError;

/// Delegated permission scopes requested for every token.
pub const SCOPES: &[&str] = &["Sites.ReadWrite.All", "Files.ReadWrite.All"];

/// A bearer token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Expired, with a 60s safety margin so a token never dies mid-call.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::seconds(60)
    }
}

/// Source of fresh credentials.
pub trait CredentialProvider: Send + Sync {
    /// Acquire a new credential. Returns [`RemoteError::AuthUnavailable`]
    /// when the identity provider cannot issue one.
    fn acquire(&self) -> Result<Credential, RemoteError>;
}

/// Provider returning a fixed token. Suitable for tests and for wiring a
/// pre-acquired token through the daemon.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            credential: Credential {
                access_token: access_token.into(),
                expires_at,
            },
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn acquire(&self) -> Result<Credential, RemoteError> {
        Ok(self.credential.clone())
    }
}
