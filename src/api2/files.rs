//! `/v1/files/{pid}/{p}` (spec §6): single-shot upload, file/directory
//! metadata lookup, and file/directory delete.

use std::sync::Arc;

use hyper::{Body, Request, Response};
use pifs_api_types::{ApiError, UploadType};
use pifs_store::path::resolve;

use crate::api2::formatter;
use crate::server::task::{Job, QUEUE_FILES};
use crate::server::upload::{self, CreateUploadRequest, StagingPaths};
use crate::server::{publish, trash, AppState};


/// `POST /v1/files/{pid}/{p}` — single-shot upload (spec §6, §4.6).
pub async fn upload_file(
    state: &Arc<AppState>,
    project_id: &str,
    relative_path: &str,
    md5: Option<&str>,
    req: Request<Body>,
) -> Result<Response<Body>, ApiError> {
    let content_length = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(ApiError::MissingContentLength)?;

    let content_type_ok = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "application/octet-stream")
        .unwrap_or(false);
    if !content_type_ok {
        return Err(ApiError::UnsupportedContentType);
    }

    let project_root = std::path::Path::new(&state.config.upload_projects_path).join(project_id);
    let resolved = resolve(&project_root, relative_path)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;
    if resolved.is_dir() || resolved.exists() {
        return Err(ApiError::conflict(
            format!("File '{relative_path}' already exists"),
            vec![relative_path.to_string()],
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

    let checksum = md5.map(|hex| format!("md5:{hex}"));
    let create_result = upload::create_upload(
        &state.uploads,
        &state.projects,
        std::path::Path::new(&state.config.upload_tmp_path),
        state.config.max_content_length as i64,
        CreateUploadRequest {
            project_id,
            relative_path,
            upload_type: UploadType::File,
            declared_size: content_length,
            checksum: checksum.as_deref(),
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

    if let Err(e) = stream_body_to_file(req, &staging).await {
        upload::fail_upload(&state.uploads, &state.locks, &created_upload, &staging, &resolved_str).await;
        return Err(e);
    }

    let verified = match upload::verify_source(&staging.source, checksum.as_deref()) {
        Ok(v) => v,
        Err(e) => {
            upload::fail_upload(&state.uploads, &state.locks, &created_upload, &staging, &resolved_str).await;
            return Err(e);
        }
    };

    if upload::needs_background_processing(content_length, state.config.upload_async_threshold_bytes) {
        let task = pifs_api_types::Task::new(created_upload.id.clone(), project_id);
        state
            .tasks
            .create(&task)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        state
            .tasks
            .enqueue(
                crate::server::task::QUEUE_UPLOAD,
                &Job {
                    task_id: task.id.clone(),
                    project_id: project_id.to_string(),
                    payload: serde_json::json!({
                        "upload_id": created_upload.id,
                        "resolved_path": resolved_str,
                    }),
                },
            )
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        return Ok(formatter::accepted_response(&task.id));
    }

    let staged = vec![publish::StagedFile {
        relative_path: relative_path.to_string(),
        absolute_staging_path: staging.source.clone(),
        size: content_length as u64,
        checksum: verified.md5,
    }];

    let catalogue_path = format!("/{relative_path}");
    let existing = state
        .catalogue
        .list_project_files(project_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    if existing.contains_key(&catalogue_path) {
        upload::fail_upload(&state.uploads, &state.locks, &created_upload, &staging, &resolved_str).await;
        return Err(ApiError::conflict(
            format!("File '{relative_path}' already exists"),
            vec![relative_path.to_string()],
        ));
    }

    let publish_result = publish::publish(
        &state.catalogue,
        &state.registry,
        &state.projects,
        project_id,
        &state.config.storage_id,
        &project_root,
        staged,
    )
    .await;

    let _ = tokio::fs::remove_dir_all(&staging.upload_dir).await;
    let _ = state.uploads.delete(&created_upload.id).await;
    let _ = state.locks.release(project_id, &resolved_str).await;

    publish_result?;
    Ok(formatter::json_data_response(serde_json::json!({ "status": "published" })))
}

async fn stream_body_to_file(
    req: Request<Body>,
    staging: &StagingPaths,
) -> Result<(), ApiError> {
    use hyper::body::HttpBody;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(&staging.source)
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

/// `GET /v1/files/{pid}/{p}` (spec §6).
pub async fn get_file(
    state: &Arc<AppState>,
    project_id: &str,
    relative_path: &str,
) -> Result<Response<Body>, ApiError> {
    let project_root = std::path::Path::new(&state.config.upload_projects_path).join(project_id);
    let resolved = resolve(&project_root, relative_path)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;

    if resolved.is_file() {
        let record = state
            .registry
            .get(&resolved.to_string_lossy())
            .await?
            .ok_or_else(|| ApiError::NotFound(relative_path.to_string()))?;
        let timestamp = tokio::fs::metadata(&resolved)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        return Ok(formatter::json_data_response(serde_json::json!({
            "file_path": relative_path,
            "md5": record.checksum,
            "identifier": record.identifier,
            "timestamp": timestamp,
        })));
    }

    if resolved.is_dir() {
        let identifier = state
            .catalogue
            .get_project_directory(project_id, relative_path)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .map(|d| d.identifier);

        let mut files = Vec::new();
        let mut directories = Vec::new();
        let mut entries = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| ApiError::Internal(e.into()))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                directories.push(name);
            } else {
                files.push(name);
            }
        }

        return Ok(formatter::json_data_response(serde_json::json!({
            "identifier": identifier,
            "files": files,
            "directories": directories,
        })));
    }

    Err(ApiError::NotFound(relative_path.to_string()))
}

/// `DELETE /v1/files/{pid}/{p}` (spec §6, §4.8, §4.9).
pub async fn delete_file(
    state: &Arc<AppState>,
    project_id: &str,
    relative_path: &str,
) -> Result<Response<Body>, ApiError> {
    let project_root = std::path::Path::new(&state.config.upload_projects_path).join(project_id);
    let resolved = resolve(&project_root, relative_path)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;

    if !resolved.exists() {
        return Err(ApiError::NotFound(relative_path.to_string()));
    }

    let records = state.registry.list_under(&resolved.to_string_lossy()).await?;
    let file_ids: Vec<String> = records.iter().map(|r| r.identifier.clone()).collect();

    let guard = pifs_client::guard_delete(&state.catalogue, &file_ids)
        .await
        .map_err(|e| match e {
            pifs_client::DatasetGuardError::HasPendingDataset => ApiError::HasPendingDataset,
            other => ApiError::Internal(other.into()),
        })?;

    if resolved.is_file() {
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

        tokio::fs::remove_file(&resolved)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;

        if !guard.keep_catalogue_metadata {
            state.registry.delete_under(&resolved_str).await?;
            let _ = state.catalogue.delete_files(&file_ids).await;
        }

        state
            .projects
            .reconcile_used_quota(project_id, &project_root)
            .await?;
        let _ = state.locks.release(project_id, &resolved_str).await;

        return Ok(formatter::json_data_response(serde_json::json!({ "status": "deleted" })));
    }

    // Directory delete: async, via the trash staging mechanism (C11).
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

    let trash_root = std::path::Path::new(&state.config.upload_trash_path);
    let trash_path = match trash::move_to_trash(
        trash_root,
        project_id,
        &resolved,
        &project_root,
        relative_path,
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            let _ = state.locks.release(project_id, &resolved_str).await;
            return Err(e);
        }
    };

    let task = pifs_api_types::Task::new(uuid::Uuid::new_v4().to_string(), project_id);
    state.tasks.create(&task).await.map_err(|e| ApiError::Internal(e.into()))?;
    state
        .tasks
        .enqueue(
            QUEUE_FILES,
            &Job {
                task_id: task.id.clone(),
                project_id: project_id.to_string(),
                payload: serde_json::json!({
                    "trash_path": trash_path.to_string_lossy(),
                    "trash_root": trash_root.to_string_lossy(),
                    "resolved_path": resolved_str,
                    "keep_catalogue_metadata": guard.keep_catalogue_metadata,
                    "file_ids": file_ids,
                }),
            },
        )
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(formatter::accepted_response(&task.id))
}
