//! Delete-to-trash (C11, spec §4.8).
//!
//! Directory deletion must race-safely with concurrent uploads into the
//! same subtree: the target is renamed out of the live tree under the
//! caller's lock, then a background job does the slow part (catalogue
//! calls, registry rows, recursive removal) without holding anything up.

use std::path::{Path, PathBuf};

use pifs_api_types::ApiError;

/// Step 2-3 of spec §4.8: atomically rename the target out of the
/// project tree and, if it was the project root itself, recreate an
/// empty one immediately so new uploads aren't blocked.
pub async fn move_to_trash(
    trash_root: &Path,
    project_id: &str,
    target: &Path,
    project_root: &Path,
    relative_path: &str,
) -> Result<PathBuf, ApiError> {
    let token = uuid::Uuid::new_v4().to_string();
    let trash_path = trash_root.join(&token).join(project_id).join(relative_path);

    if let Some(parent) = trash_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }

    match tokio::fs::rename(target, &trash_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("no files found".to_string()));
        }
        Err(e) => return Err(ApiError::Internal(e.into())),
    }

    if target == project_root {
        tokio::fs::create_dir_all(project_root)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }

    Ok(trash_path)
}

/// Translates a trashed path back to the upload-root path it originally
/// had, for the background job's registry/catalogue lookups (spec §4.8
/// step 5).
pub fn trash_path_to_original(
    trash_root: &Path,
    upload_root: &Path,
    trash_path: &Path,
) -> Option<PathBuf> {
    let relative = trash_path.strip_prefix(trash_root).ok()?;
    // relative is `<token>/<project_id>/<relative_path...>`; drop the token.
    let mut components = relative.components();
    components.next()?;
    Some(upload_root.join(components.as_path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trash_path_translates_back_dropping_the_token() {
        let trash_root = Path::new("/var/pifs/trash");
        let upload_root = Path::new("/var/pifs/projects");
        let trash_path = Path::new("/var/pifs/trash/tok123/demo/a/b.txt");

        let original = trash_path_to_original(trash_root, upload_root, trash_path).unwrap();
        assert_eq!(original, Path::new("/var/pifs/projects/demo/a/b.txt"));
    }
}
