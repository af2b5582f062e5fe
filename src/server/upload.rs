//! Upload state machine (C8, spec §4.6).
//!
//! `Created -> Received -> Verified -> (Extracted) -> Published`, with a
//! `Failed` path reachable from any state that unlinks staging, releases
//! the lock and removes the Upload row. Only publication (§4.6.5, see
//! [`crate::server::publish`]) touches the project directory.

use std::path::{Path, PathBuf};

use pifs_api_types::{ApiError, Upload, UploadId, UploadType};
use pifs_store::checksum::{self, ChecksumAlgorithm, Checksum};
use sqlx::PgPool;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::server::lock::LockManager;
use crate::server::project::ProjectStore;

pub struct UploadStore {
    db: PgPool,
}

impl UploadStore {
    pub fn new(db: PgPool) -> Self {
        UploadStore { db }
    }

    pub async fn insert(&self, upload: &Upload) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO uploads (id, project_id, relative_path, upload_type, declared_size, \
             source_checksum, is_resumable, bytes_received) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&upload.id)
        .bind(&upload.project_id)
        .bind(&upload.relative_path)
        .bind(upload.upload_type)
        .bind(upload.declared_size)
        .bind(&upload.source_checksum)
        .bind(upload.is_resumable)
        .bind(upload.bytes_received)
        .execute(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(())
    }

    pub async fn get(&self, id: &UploadId) -> Result<Option<Upload>, ApiError> {
        sqlx::query_as::<_, Upload>(
            "SELECT id, project_id, relative_path, upload_type, declared_size, source_checksum, \
             is_resumable, bytes_received FROM uploads WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))
    }

    pub async fn set_bytes_received(&self, id: &UploadId, bytes: i64) -> Result<(), ApiError> {
        sqlx::query("UPDATE uploads SET bytes_received = $1 WHERE id = $2")
            .bind(bytes)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(())
    }

    pub async fn delete(&self, id: &UploadId) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(())
    }
}

pub struct StagingPaths {
    pub upload_dir: PathBuf,
    pub source: PathBuf,
    pub tmp_storage: PathBuf,
}

impl StagingPaths {
    pub fn new(tmp_root: &Path, upload_id: &str) -> Self {
        let upload_dir = tmp_root.join(upload_id);
        StagingPaths {
            source: upload_dir.join("source"),
            tmp_storage: upload_dir.join("tmp_storage"),
            upload_dir,
        }
    }
}

/// Inputs to creation (spec §4.6.1).
pub struct CreateUploadRequest<'a> {
    pub project_id: &'a str,
    pub relative_path: &'a str,
    pub upload_type: UploadType,
    pub declared_size: i64,
    pub checksum: Option<&'a str>,
}

/// Performs the creation checks and persists the Upload row plus staging
/// directory. The caller already holds (or is about to acquire) the
/// project lock for `resolved_path`; this function does not acquire it
/// itself so the same lock can span creation through publication for
/// large uploads (spec §4.6.1 step 5).
pub async fn create_upload(
    store: &UploadStore,
    projects: &ProjectStore,
    tmp_root: &Path,
    max_content_length: i64,
    req: CreateUploadRequest<'_>,
) -> Result<(Upload, StagingPaths), ApiError> {
    if req.declared_size > max_content_length {
        return Err(ApiError::PayloadTooLarge(
            "declared size exceeds the configured maximum".to_string(),
        ));
    }

    if let Some(checksum) = req.checksum {
        checksum
            .parse::<Checksum>()
            .map_err(|e| ApiError::UploadError(e.to_string()))?;
    }

    let project = projects.get(req.project_id).await?;
    let reserved = projects.reserved_bytes(req.project_id).await?;
    let remaining = project.quota - project.used_quota - reserved;
    if remaining < req.declared_size {
        return Err(ApiError::PayloadTooLarge("quota exceeded".to_string()));
    }

    let id: UploadId = uuid::Uuid::new_v4().to_string();
    let upload = Upload {
        id: id.clone(),
        project_id: req.project_id.to_string(),
        relative_path: req.relative_path.to_string(),
        upload_type: req.upload_type,
        declared_size: req.declared_size,
        source_checksum: req.checksum.map(|s| s.to_string()),
        is_resumable: false,
        bytes_received: 0,
    };
    store.insert(&upload).await?;

    let staging = StagingPaths::new(tmp_root, &id);
    tokio::fs::create_dir_all(&staging.upload_dir)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok((upload, staging))
}

/// Writes `chunk` at `offset` into the staging source file, growing the
/// file as needed (spec §4.6.2 tus semantics; a single-shot upload is
/// just the degenerate `offset == 0`, whole-body case).
pub async fn write_chunk(
    store: &UploadStore,
    upload: &Upload,
    source_path: &Path,
    offset: u64,
    chunk: &[u8],
) -> Result<u64, ApiError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(source_path)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    file.seek(std::io::SeekFrom::Start(offset))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    file.write_all(chunk)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    file.flush().await.map_err(|e| ApiError::Internal(e.into()))?;

    let bytes_received = offset + chunk.len() as u64;
    store
        .set_bytes_received(&upload.id, bytes_received as i64)
        .await?;
    Ok(bytes_received)
}

pub struct VerifiedSource {
    pub md5: String,
}

/// Verification (spec §4.6.3): always computes MD5; if a checksum was
/// declared at creation, verifies it in the same pass.
pub fn verify_source(source_path: &Path, declared: Option<&str>) -> Result<VerifiedSource, ApiError> {
    let declared_checksum = declared
        .map(|s| s.parse::<Checksum>())
        .transpose()
        .map_err(|e| ApiError::UploadError(e.to_string()))?;

    let algorithm = declared_checksum
        .as_ref()
        .map(|c| c.algorithm)
        .filter(|a| *a != ChecksumAlgorithm::Md5);

    let file = std::fs::File::open(source_path).map_err(|e| ApiError::Internal(e.into()))?;
    let digests = checksum::digest(file, algorithm).map_err(|e| ApiError::Internal(e.into()))?;

    if let Some(declared) = &declared_checksum {
        checksum::verify_checksum(declared, &digests).map_err(|_| ApiError::ChecksumMismatch)?;
    }

    Ok(VerifiedSource { md5: digests.md5 })
}

/// Whether verification and everything downstream must be deferred to a
/// background task (spec §4.6.3).
pub fn needs_background_processing(declared_size: i64, async_threshold_bytes: u64) -> bool {
    declared_size as u64 > async_threshold_bytes
}

/// Cleanup for the `Failed` terminal state: unlink staging, release the
/// lock, delete the Upload record (spec §4.6).
pub async fn fail_upload(
    store: &UploadStore,
    lock_manager: &LockManager,
    upload: &Upload,
    staging: &StagingPaths,
    resolved_path: &str,
) {
    let _ = tokio::fs::remove_dir_all(&staging.upload_dir).await;
    let _ = lock_manager.release(&upload.project_id, resolved_path).await;
    let _ = store.delete(&upload.id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_processing_threshold_is_exclusive() {
        assert!(!needs_background_processing(64, 64));
        assert!(needs_background_processing(65, 64));
    }
}
