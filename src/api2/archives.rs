//! `POST /v1/archives/{pid}?dir=...` (spec §6, §4.6.4): archive upload,
//! always deferred to a background task.

use std::sync::Arc;

use hyper::{Body, Request, Response};
use pifs_api_types::{ApiError, UploadType};
use pifs_store::path::resolve;

use crate::api2::formatter;
use crate::server::task::{Job, QUEUE_UPLOAD};
use crate::server::upload::{self, CreateUploadRequest};
use crate::server::AppState;


pub async fn upload_archive(
    state: &Arc<AppState>,
    project_id: &str,
    target_dir: &str,
    req: Request<Body>,
) -> Result<Response<Body>, ApiError> {
    let content_length = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(ApiError::MissingContentLength)?;

    let project_root = std::path::Path::new(&state.config.upload_projects_path).join(project_id);
    let resolved = resolve(&project_root, target_dir)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;
    if resolved.is_file() {
        return Err(ApiError::conflict(
            format!("'{target_dir}' is an existing file"),
            vec![target_dir.to_string()],
        ));
    }

    let resolved_str = resolved.to_string_lossy().to_string();
    state
        .locks
        .acquire(
            project_id,
            &resolved_str,
            state.config.upload_lock_ttl,
            state.config.upload_lock_timeout,
        )
        .await
        .map_err(|_| ApiError::LockAlreadyTaken)?;

    let create_result = upload::create_upload(
        &state.uploads,
        &state.projects,
        std::path::Path::new(&state.config.upload_tmp_path),
        state.config.max_content_length as i64,
        CreateUploadRequest {
            project_id,
            relative_path: target_dir,
            upload_type: UploadType::Archive,
            declared_size: content_length,
            checksum: None,
        },
    )
    .await;

    let (created_upload, staging) = match create_result {
        Ok(v) => v,
        Err(e) => {
            let _ = state.locks.release(project_id, &resolved_str).await;
            return Err(e);
        }
    };

    if let Err(e) = write_archive_body(req, &staging.source).await {
        upload::fail_upload(&state.uploads, &state.locks, &created_upload, &staging, &resolved_str).await;
        return Err(e);
    }

    // Archive extraction, conflict detection and publication all run in
    // the background (spec §4.6.4): even the smallest archive can expand
    // well past the inline-processing threshold.
    let task = pifs_api_types::Task::new(created_upload.id.clone(), project_id);
    state
        .tasks
        .create(&task)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    state
        .tasks
        .enqueue(
            QUEUE_UPLOAD,
            &Job {
                task_id: task.id.clone(),
                project_id: project_id.to_string(),
                payload: serde_json::json!({
                    "upload_id": created_upload.id,
                    "resolved_path": resolved_str,
                    "target_dir": target_dir,
                    "archive": true,
                }),
            },
        )
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(formatter::accepted_response(&task.id))
}

async fn write_archive_body(req: Request<Body>, dest: &std::path::Path) -> Result<(), ApiError> {
    use hyper::body::HttpBody;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    let mut body = req.into_body();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| ApiError::UploadError(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }
    file.flush().await.map_err(|e| ApiError::Internal(e.into()))?;
    Ok(())
}
