//! Filesystem key store.
//!
//! One JSON document per user at `{base_path}/{sha256(user_id)}.json`.
//! Hashing the user id keeps arbitrary identifiers out of file names.
//! Writes go to a temporary file that is synced and then renamed over
//! the target, so readers see either the old or the new document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{KeyHistory, KeyStore};
use crate::error::{E2eError, E2eResult};
use crate::logging;

/// Current on-disk document version.
const DOCUMENT_VERSION: u8 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct KeyDocument {
    version: u8,
    #[serde(flatten)]
    history: KeyHistory,
}

/// Key store persisting one document per user in a directory.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    base_path: PathBuf,
}

impl FileKeyStore {
    /// Create a store rooted at `base_path`. The directory is created on
    /// first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory holding the documents.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn document_path(&self, user_id: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(user_id.as_bytes()));
        self.base_path.join(format!("{}.json", name))
    }

    /// Validate that the directory can be written, read and cleaned up.
    pub async fn validate(&self) -> E2eResult<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| unavailable("create_dir_all", &self.base_path, e))?;

        let check_path = self.base_path.join(".health-check");
        fs::write(&check_path, b"e2e-storage-health-check")
            .await
            .map_err(|e| unavailable("write", &check_path, e))?;
        fs::read(&check_path)
            .await
            .map_err(|e| unavailable("read", &check_path, e))?;
        fs::remove_file(&check_path)
            .await
            .map_err(|e| unavailable("remove_file", &check_path, e))?;
        Ok(())
    }

    /// Write `json` to `temp_path`, then rename it over `path` and sync the
    /// directory entry. The caller removes `temp_path` on error.
    async fn replace_document(&self, temp_path: &Path, path: &Path, json: &[u8]) -> E2eResult<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        // Owner read/write only from the first byte: the document holds private keys
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(temp_path)
            .await
            .map_err(|e| unavailable("create", temp_path, e))?;
        file.write_all(json)
            .await
            .map_err(|e| unavailable("write_all", temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| unavailable("sync_all", temp_path, e))?;
        drop(file);

        fs::rename(temp_path, path)
            .await
            .map_err(|e| unavailable("rename", path, e))?;

        // Persist the rename itself
        #[cfg(unix)]
        fs::File::open(&self.base_path)
            .await
            .map_err(|e| unavailable("open_dir", &self.base_path, e))?
            .sync_all()
            .await
            .map_err(|e| unavailable("sync_dir", &self.base_path, e))?;

        Ok(())
    }
}

fn unavailable(op: &str, path: &Path, err: std::io::Error) -> E2eError {
    warn!(
        subsystem = logging::SUBSYSTEM,
        store_backend = "file",
        path = %path.display(),
        error = %err,
        "key_store: {} failed",
        op
    );
    E2eError::StorageUnavailable(format!("{}({}): {}", op, path.display(), err))
}

#[async_trait]
impl KeyStore for FileKeyStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn load_history(&self, user_id: &str) -> E2eResult<Option<KeyHistory>> {
        let path = self.document_path(user_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable("read", &path, e)),
        };

        let document: KeyDocument = serde_json::from_slice(&bytes).map_err(|e| {
            E2eError::StorageUnavailable(format!("corrupt key document {}: {}", path.display(), e))
        })?;
        if document.version != DOCUMENT_VERSION {
            return Err(E2eError::StorageUnavailable(format!(
                "unsupported key document version {} in {}",
                document.version,
                path.display()
            )));
        }
        if document.history.user_id != user_id {
            return Err(E2eError::StorageUnavailable(format!(
                "key document {} belongs to another user",
                path.display()
            )));
        }

        debug!(
            subsystem = logging::SUBSYSTEM,
            store_backend = "file",
            user_id,
            generations = document.history.records.len(),
            "key_store: loaded"
        );
        Ok(Some(document.history))
    }

    async fn save_history(&self, history: &KeyHistory) -> E2eResult<()> {
        let path = self.document_path(&history.user_id);
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| unavailable("create_dir_all", &self.base_path, e))?;

        let document = KeyDocument {
            version: DOCUMENT_VERSION,
            history: history.clone(),
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| E2eError::StorageUnavailable(format!("serialize key document: {}", e)))?;

        // Unique per writer so concurrent saves never share a temp file
        let temp_path = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));
        if let Err(e) = self.replace_document(&temp_path, &path, &json).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        subsystem = logging::SUBSYSTEM,
                        store_backend = "file",
                        path = %temp_path.display(),
                        error = %cleanup,
                        "key_store: temp file cleanup failed"
                    );
                }
            }
            return Err(e);
        }

        debug!(
            subsystem = logging::SUBSYSTEM,
            store_backend = "file",
            user_id = %history.user_id,
            generations = history.records.len(),
            "key_store: saved"
        );
        Ok(())
    }
}
