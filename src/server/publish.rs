//! Publication (C10, spec §4.6.5): the atomic flip that makes an upload
//! visible. The only step in the whole pipeline that touches the project
//! directory.

use std::path::{Path, PathBuf};

use pifs_api_types::{ApiError, FileRecord};
use pifs_client::{CatalogueClient, FileRecordInput};

use crate::server::project::ProjectStore;
use crate::server::registry::FileRegistry;

pub struct StagedFile {
    pub relative_path: String,
    pub absolute_staging_path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

/// Publishes every staged file into `project_root`, following spec
/// §4.6.5 steps 2-7. Conflict detection against the catalogue must have
/// already run (callers differ on whether that's a per-path lookup or a
/// whole-project listing, depending on single-file vs. batch upload).
pub async fn publish(
    catalogue: &CatalogueClient,
    registry: &FileRegistry,
    projects: &ProjectStore,
    project_id: &str,
    storage_id: &str,
    project_root: &Path,
    files: Vec<StagedFile>,
) -> Result<Vec<FileRecord>, ApiError> {
    let mut inputs = Vec::with_capacity(files.len());
    let mut records = Vec::with_capacity(files.len());

    for file in &files {
        let identifier = uuid::Uuid::new_v4().to_string();
        let absolute_path = project_root.join(&file.relative_path);
        inputs.push(FileRecordInput {
            project_identifier: storage_id.to_string(),
            pathname: format!("/{}", file.relative_path),
            checksum: file.checksum.clone(),
            identifier: identifier.clone(),
        });
        records.push(FileRecord {
            path: absolute_path.to_string_lossy().to_string(),
            checksum: file.checksum.clone(),
            identifier,
        });
    }

    catalogue
        .post_files(&inputs)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    if let Err(e) = registry.insert_all(&records).await {
        // Compensating delete: the catalogue must not end up with rows
        // whose registry counterpart failed to land (spec §4.6.5).
        let ids: Vec<String> = inputs.iter().map(|i| i.identifier.clone()).collect();
        let _ = catalogue.delete_files(&ids).await;
        return Err(e);
    }

    for file in &files {
        let target = project_root.join(&file.relative_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Internal(e.into()))?;
        }
        rename_into_place(&file.absolute_staging_path, &target).await?;
    }

    let used_quota = projects.reconcile_used_quota(project_id, project_root).await?;
    log::info!("published {} file(s) into project {project_id}; used_quota={used_quota}", files.len());

    Ok(records)
}

/// `rename(2)` into place, retrying a single `mkdir -p` on `ENOENT`
/// (spec §4.6.5 step 5), then fixing the mode to `0o664`.
async fn rename_into_place(source: &Path, target: &Path) -> Result<(), ApiError> {
    match tokio::fs::rename(source, target).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ApiError::Internal(e.into()))?;
            }
            tokio::fs::rename(source, target)
                .await
                .map_err(|e| ApiError::Internal(e.into()))?;
        }
        Err(e) => return Err(ApiError::Internal(e.into())),
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(0o664))
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }

    Ok(())
}
