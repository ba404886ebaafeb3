//! services/api/src/adapters/storage.rs
//!
//! Filesystem implementation of the `BlobStorage` port. Blobs live under
//! `{root}/{owner_id}/{uuid}-{file_name}` so one user's uploads never
//! collide with another's. Writes are chunked so progress callbacks fire
//! while the upload streams, matching the resumable-upload contract of a
//! managed object store.

use std::path::PathBuf;

use async_trait::async_trait;
use medintake_core::ports::{BlobStorage, PortError, PortResult, ProgressFn, StoredBlob, UploadProgress};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

const WRITE_CHUNK_BYTES: usize = 256 * 1024;

/// Stores uploaded blobs on the local filesystem.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Round-trips a test file at startup to catch permission or mount
    /// problems before the first real upload.
    pub async fn validate(&self) -> PortResult<()> {
        let probe_dir = self.root.join(".health-check");
        let probe_file = probe_dir.join("probe.bin");

        fs::create_dir_all(&probe_dir)
            .await
            .map_err(|e| PortError::Unavailable(format!("storage root not writable: {}", e)))?;
        fs::write(&probe_file, b"storage-probe")
            .await
            .map_err(|e| PortError::Unavailable(format!("storage write failed: {}", e)))?;
        let read_back = fs::read(&probe_file)
            .await
            .map_err(|e| PortError::Unavailable(format!("storage read failed: {}", e)))?;
        if read_back != b"storage-probe" {
            return Err(PortError::Unavailable(
                "storage read-back mismatch".to_string(),
            ));
        }
        fs::remove_file(&probe_file).await.ok();
        fs::remove_dir(&probe_dir).await.ok();
        Ok(())
    }

    fn full_path(&self, storage_path: &str) -> PathBuf {
        self.root.join(storage_path)
    }
}

/// Strips path separators and control characters from a client-supplied
/// file name so it cannot escape the owner's directory.
fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0'..='\x1f' => '_',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds the storage-relative path for a new upload.
fn storage_path_for(owner_id: Uuid, file_name: &str) -> String {
    format!("{}/{}-{}", owner_id, Uuid::new_v4(), sanitize_file_name(file_name))
}

#[async_trait]
impl BlobStorage for FilesystemStorage {
    async fn upload(
        &self,
        owner_id: Uuid,
        file_name: &str,
        content_type: &str,
        data: &[u8],
        on_progress: Option<ProgressFn>,
    ) -> PortResult<StoredBlob> {
        let storage_path = storage_path_for(owner_id, file_name);
        let full_path = self.full_path(&storage_path);
        debug!(
            storage_path = %storage_path,
            size = data.len(),
            content_type = %content_type,
            "blob upload"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unavailable(e.to_string()))?;
        }

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        let total_bytes = data.len() as u64;
        let mut bytes_sent: u64 = 0;
        for chunk in data.chunks(WRITE_CHUNK_BYTES) {
            file.write_all(chunk)
                .await
                .map_err(|e| PortError::Unavailable(e.to_string()))?;
            bytes_sent += chunk.len() as u64;
            if let Some(callback) = &on_progress {
                callback(UploadProgress {
                    bytes_sent,
                    total_bytes,
                });
            }
        }
        file.flush()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        // Zero-byte uploads still get one terminal progress report.
        if total_bytes == 0 {
            if let Some(callback) = &on_progress {
                callback(UploadProgress {
                    bytes_sent: 0,
                    total_bytes: 0,
                });
            }
        }

        Ok(StoredBlob {
            storage_url: Some(format!("file://{}", full_path.display())),
            storage_path,
            size_bytes: data.len() as i64,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, storage_path: &str) -> PortResult<()> {
        match fs::remove_file(self.full_path(storage_path)).await {
            Ok(()) => Ok(()),
            // A blob that is already gone is not an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unavailable(e.to_string())),
        }
    }
}
