//! Credential storage boundary.
//!
//! Job records only hold a [`SecretRef`]. The card number and PIN live behind
//! a [`SecretStore`], so a real vault can replace the file backend without
//! touching the scheduler.

use crate::error::SecretError;
use async_trait::async_trait;
use passbook_core::{Credentials, JobId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;

/// Opaque pointer to stored credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stores and resolves job credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stores credentials for a job.
    async fn put(&self, job_id: JobId, credentials: &Credentials)
    -> Result<SecretRef, SecretError>;

    /// Resolves a reference.
    async fn get(&self, reference: &SecretRef) -> Result<Credentials, SecretError>;

    /// Deletes the stored credentials; missing entries are not an error.
    async fn remove(&self, reference: &SecretRef) -> Result<(), SecretError>;
}

/// Keeps credentials in process memory only.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<SecretRef, Credentials>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn put(
        &self,
        job_id: JobId,
        credentials: &Credentials,
    ) -> Result<SecretRef, SecretError> {
        let reference = SecretRef::new(format!("mem:{job_id}"));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.clone(), credentials.clone());
        Ok(reference)
    }

    async fn get(&self, reference: &SecretRef) -> Result<Credentials, SecretError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned()
            .ok_or_else(|| SecretError::NotFound {
                reference: reference.as_str().to_string(),
            })
    }

    async fn remove(&self, reference: &SecretRef) -> Result<(), SecretError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(reference);
        Ok(())
    }
}

/// Writes credentials as plaintext JSON, one file per job.
///
/// **Unencrypted.** Files are created owner-only on Unix, but anyone who can
/// read the data directory can read every stored PIN. Replace with a real
/// vault before running anywhere shared.
#[derive(Debug)]
pub struct PlaintextFileSecretStore {
    dir: PathBuf,
}

impl PlaintextFileSecretStore {
    /// Opens (creating if needed) the secrets directory.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, SecretError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SecretError::Storage {
                reason: format!("{}: {e}", dir.display()),
            })?;
        tracing::warn!(
            dir = %dir.display(),
            "credentials are stored unencrypted; use a proper secret store outside development"
        );
        Ok(Self { dir })
    }

    fn path_for(&self, reference: &SecretRef) -> Result<PathBuf, SecretError> {
        let job_id: JobId = reference
            .as_str()
            .strip_prefix("file:")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| SecretError::NotFound {
                reference: reference.as_str().to_string(),
            })?;
        Ok(self.dir.join(format!("{job_id}.json")))
    }
}

#[async_trait]
impl SecretStore for PlaintextFileSecretStore {
    async fn put(
        &self,
        job_id: JobId,
        credentials: &Credentials,
    ) -> Result<SecretRef, SecretError> {
        let reference = SecretRef::new(format!("file:{job_id}"));
        let path = self.path_for(&reference)?;
        let body = serde_json::to_vec(credentials).map_err(|e| SecretError::Storage {
            reason: e.to_string(),
        })?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let storage = |e: std::io::Error| SecretError::Storage {
            reason: format!("{}: {e}", path.display()),
        };
        let mut file = options.open(&path).await.map_err(storage)?;
        file.write_all(&body).await.map_err(storage)?;
        file.sync_all().await.map_err(storage)?;
        Ok(reference)
    }

    async fn get(&self, reference: &SecretRef) -> Result<Credentials, SecretError> {
        let path = self.path_for(reference)?;
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SecretError::NotFound {
                    reference: reference.as_str().to_string(),
                });
            }
            Err(e) => {
                return Err(SecretError::Storage {
                    reason: format!("{}: {e}", path.display()),
                });
            }
        };
        serde_json::from_slice(&body).map_err(|e| SecretError::Storage {
            reason: format!("{}: {e}", path.display()),
        })
    }

    async fn remove(&self, reference: &SecretRef) -> Result<(), SecretError> {
        let path = self.path_for(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SecretError::Storage {
                reason: format!("{}: {e}", path.display()),
            }),
        }
    }
}
