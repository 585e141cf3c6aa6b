//! Object-storage credential resolution.
//!
//! Loaders never hold keys in their declaration; they carry a credential id
//! that a [`CredentialProvider`] resolves at execution time.

use crate::errors::StarflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An access-key / secret-key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
}

impl AwsCredentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Resolves a credential id to an access-key pair.
///
/// An id the provider does not know is a configuration error. Transient
/// lookup failures (an unreachable secrets service) are credential errors,
/// which the graph retries.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the credentials registered under `id`.
    async fn credentials(&self, id: &str) -> Result<AwsCredentials, StarflowError>;
}

/// Reads credentials from environment variables.
///
/// For id `aws_credentials` it reads `AWS_CREDENTIALS_ACCESS_KEY_ID` and
/// `AWS_CREDENTIALS_SECRET_ACCESS_KEY`. Falls back to the standard
/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` pair when configured to.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialProvider {
    fallback_to_default_chain: bool,
}

impl EnvCredentialProvider {
    /// Creates a provider that only reads id-scoped variables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accepts the unscoped `AWS_*` variables.
    #[must_use]
    pub fn with_default_fallback(mut self) -> Self {
        self.fallback_to_default_chain = true;
        self
    }

    /// Environment variable prefix for a credential id.
    #[must_use]
    pub fn env_prefix(id: &str) -> String {
        id.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }

    fn read_pair(access_var: &str, secret_var: &str) -> Option<AwsCredentials> {
        let access = std::env::var(access_var).ok().filter(|v| !v.is_empty())?;
        let secret = std::env::var(secret_var).ok().filter(|v| !v.is_empty())?;
        Some(AwsCredentials::new(access, secret))
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn credentials(&self, id: &str) -> Result<AwsCredentials, StarflowError> {
        let prefix = Self::env_prefix(id);
        let access_var = format!("{prefix}_ACCESS_KEY_ID");
        let secret_var = format!("{prefix}_SECRET_ACCESS_KEY");

        if let Some(creds) = Self::read_pair(&access_var, &secret_var) {
            return Ok(creds);
        }

        if self.fallback_to_default_chain {
            if let Some(creds) = Self::read_pair("AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY") {
                tracing::debug!(credentials_id = %id, "Using default AWS credential variables");
                return Ok(creds);
            }
        }

        Err(StarflowError::config(format!(
            "No credentials for '{id}': set {access_var} and {secret_var}"
        )))
    }
}

/// Serves credentials from an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    entries: HashMap<String, AwsCredentials>,
}

impl StaticCredentialProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds credentials under `id`.
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, credentials: AwsCredentials) -> Self {
        self.entries.insert(id.into(), credentials);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credentials(&self, id: &str) -> Result<AwsCredentials, StarflowError> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| StarflowError::config(format!("No credentials registered for '{id}'")))
    }
}
