use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::profile::Credential;

/// Which credential field could not be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    KeyId,
    Secret,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialField::KeyId => f.write_str("key id"),
            CredentialField::Secret => f.write_str("key secret"),
        }
    }
}

/// Errors produced while patching a local credential store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    /// The store no longer holds what the remote side considers current.
    #[error("unable to locate {field} in credentials file {path}")]
    FieldNotFound {
        field: CredentialField,
        path: PathBuf,
    },
    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Contract for the local store holding the profile's key pair.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Replace `old` with `new` in the store at `path`, leaving everything else intact.
    async fn update_credentials(
        &self,
        path: &Path,
        old: &Credential,
        new: &Credential,
    ) -> Result<(), StoreError>;
}

/// In-memory store keyed by path, for tests that only care about the orchestration.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    inner: Arc<Mutex<HashMap<PathBuf, Credential>>>,
    failure: Arc<Mutex<Option<StoreError>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, path: impl Into<PathBuf>, credential: Credential) -> Self {
        self.entries().insert(path.into(), credential);
        self
    }

    /// Make the next and all later updates fail with `error`.
    pub fn failing_with(self, error: StoreError) -> Self {
        *self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(error);
        self
    }

    pub fn get(&self, path: &Path) -> Option<Credential> {
        self.entries().get(path).cloned()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Credential>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn update_credentials(
        &self,
        path: &Path,
        old: &Credential,
        new: &Credential,
    ) -> Result<(), StoreError> {
        if let Some(err) = self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
        {
            return Err(err);
        }

        let mut entries = self.entries();
        let stored = entries.get_mut(path).ok_or_else(|| StoreError::Read {
            path: path.to_path_buf(),
            reason: "no such entry".to_string(),
        })?;
        if stored.access_key_id != old.access_key_id {
            return Err(StoreError::FieldNotFound {
                field: CredentialField::KeyId,
                path: path.to_path_buf(),
            });
        }
        if stored.secret_access_key != old.secret_access_key {
            return Err(StoreError::FieldNotFound {
                field: CredentialField::Secret,
                path: path.to_path_buf(),
            });
        }
        *stored = new.clone();
        Ok(())
    }
}
