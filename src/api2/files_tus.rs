//! `/v1/files_tus` and `/v1/files_tus/<id>` (spec §6, §4.6.2): the
//! resumable upload protocol's creation, offset query and chunk-append
//! endpoints, mapped onto the upload state machine in
//! [`crate::server::upload`].

use std::sync::Arc;

use hyper::{Body, Request, Response, StatusCode};
use pifs_api_types::{ApiError, Principal, UploadType};
use pifs_store::path::resolve;

use crate::api2::formatter;
use crate::server::task::{Job, QUEUE_UPLOAD};
use crate::server::upload::{self, CreateUploadRequest, StagingPaths};
use crate::server::{publish, tus, AppState};

fn header_str<'a>(req: &'a Request<Body>, name: hyper::header::HeaderName) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// `POST /v1/files_tus`: the tus creation call (spec §6 metadata fields).
pub async fn create(
    state: &Arc<AppState>,
    principal: &Principal,
    req: Request<Body>,
) -> Result<Response<Body>, ApiError> {
    let declared_size = header_str(&req, hyper::header::HeaderName::from_static("upload-length"))
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(ApiError::MissingContentLength)?;
    let metadata_header = header_str(&req, hyper::header::HeaderName::from_static("upload-metadata"))
        .ok_or_else(|| ApiError::UploadError("missing Upload-Metadata header".to_string()))?
        .to_string();
    let metadata = tus::parse_metadata(&metadata_header)?;
    if !principal.can_access(&metadata.project_id) {
        return Err(ApiError::Forbidden);
    }

    let project_root =
        std::path::Path::new(&state.config.upload_projects_path).join(&metadata.project_id);
    let resolved = resolve(&project_root, &metadata.upload_path)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;
    if metadata.upload_type == UploadType::File && (resolved.is_dir() || resolved.exists()) {
        return Err(ApiError::conflict(
            format!("File '{}' already exists", metadata.upload_path),
            vec![metadata.upload_path.clone()],
        ));
    }

    let resolved_str = resolved.to_string_lossy().to_string();
    state
        .locks
        .acquire(
            &metadata.project_id,
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
            project_id: &metadata.project_id,
            relative_path: &metadata.upload_path,
            upload_type: metadata.upload_type,
            declared_size,
            checksum: metadata.checksum.as_deref(),
        },
    )
    .await;

    let (created_upload, _staging) = match create_result {
        Ok(v) => v,
        Err(e) => {
            let _ = state.locks.release(&metadata.project_id, &resolved_str).await;
            return Err(e);
        }
    };

    let mut response = formatter::json_data_response(serde_json::json!({ "id": created_upload.id }));
    *response.status_mut() = StatusCode::CREATED;
    response.headers_mut().insert(
        hyper::header::LOCATION,
        hyper::header::HeaderValue::from_str(&format!("/v1/files_tus/{}", created_upload.id))
            .map_err(|e| ApiError::Internal(e.into()))?,
    );
    Ok(response)
}

/// `HEAD /v1/files_tus/<id>`: reports the current received offset.
pub async fn head(
    state: &Arc<AppState>,
    principal: &Principal,
    upload_id: &str,
) -> Result<Response<Body>, ApiError> {
    let upload = state
        .uploads
        .get(&upload_id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(upload_id.to_string()))?;
    if !principal.can_access(&upload.project_id) {
        return Err(ApiError::Forbidden);
    }

    let mut response = Response::new(Body::empty());
    response.headers_mut().insert(
        hyper::header::HeaderName::from_static("upload-offset"),
        hyper::header::HeaderValue::from(upload.bytes_received),
    );
    response.headers_mut().insert(
        hyper::header::HeaderName::from_static("upload-length"),
        hyper::header::HeaderValue::from(upload.declared_size),
    );
    Ok(response)
}

/// `PATCH /v1/files_tus/<id>`: appends one chunk, completing the upload
/// once the full declared size has been received (spec §4.6.2-§4.6.5).
pub async fn patch(
    state: &Arc<AppState>,
    principal: &Principal,
    upload_id: &str,
    req: Request<Body>,
) -> Result<Response<Body>, ApiError> {
    let offset = header_str(&req, hyper::header::HeaderName::from_static("upload-offset"))
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or(ApiError::MissingContentLength)?;

    let upload_record = state
        .uploads
        .get(&upload_id.to_string())
        .await?
        .ok_or_else(|| ApiError::NotFound(upload_id.to_string()))?;
    if !principal.can_access(&upload_record.project_id) {
        return Err(ApiError::Forbidden);
    }

    let staging = StagingPaths::new(
        std::path::Path::new(&state.config.upload_tmp_path),
        upload_id,
    );

    let body = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| ApiError::UploadError(e.to_string()))?;
    let bytes_received =
        upload::write_chunk(&state.uploads, &upload_record, &staging.source, offset, &body).await?;

    let project_root =
        std::path::Path::new(&state.config.upload_projects_path).join(&upload_record.project_id);
    let resolved = resolve(&project_root, &upload_record.relative_path)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;
    let resolved_str = resolved.to_string_lossy().to_string();

    if (bytes_received as i64) < upload_record.declared_size {
        let mut response = Response::new(Body::empty());
        response.headers_mut().insert(
            hyper::header::HeaderName::from_static("upload-offset"),
            hyper::header::HeaderValue::from(bytes_received),
        );
        return Ok(response);
    }

    if upload_record.upload_type == UploadType::Archive {
        let task = pifs_api_types::Task::new(upload_record.id.clone(), &upload_record.project_id);
        state.tasks.create(&task).await.map_err(|e| ApiError::Internal(e.into()))?;
        state
            .tasks
            .enqueue(
                QUEUE_UPLOAD,
                &Job {
                    task_id: task.id.clone(),
                    project_id: upload_record.project_id.clone(),
                    payload: serde_json::json!({
                        "upload_id": upload_record.id,
                        "resolved_path": resolved_str,
                        "target_dir": upload_record.relative_path,
                        "archive": true,
                    }),
                },
            )
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        return Ok(formatter::accepted_response(&task.id));
    }

    let verified = match upload::verify_source(&staging.source, upload_record.source_checksum.as_deref())
    {
        Ok(v) => v,
        Err(e) => {
            upload::fail_upload(&state.uploads, &state.locks, &upload_record, &staging, &resolved_str)
                .await;
            return Err(e);
        }
    };

    if upload::needs_background_processing(
        upload_record.declared_size,
        state.config.upload_async_threshold_bytes,
    ) {
        let task = pifs_api_types::Task::new(upload_record.id.clone(), &upload_record.project_id);
        state.tasks.create(&task).await.map_err(|e| ApiError::Internal(e.into()))?;
        state
            .tasks
            .enqueue(
                QUEUE_UPLOAD,
                &Job {
                    task_id: task.id.clone(),
                    project_id: upload_record.project_id.clone(),
                    payload: serde_json::json!({
                        "upload_id": upload_record.id,
                        "resolved_path": resolved_str,
                    }),
                },
            )
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        return Ok(formatter::accepted_response(&task.id));
    }

    let catalogue_path = format!("/{}", upload_record.relative_path);
    let existing = state
        .catalogue
        .list_project_files(&upload_record.project_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    if existing.contains_key(&catalogue_path) {
        upload::fail_upload(&state.uploads, &state.locks, &upload_record, &staging, &resolved_str)
            .await;
        return Err(ApiError::conflict(
            format!("File '{}' already exists", upload_record.relative_path),
            vec![upload_record.relative_path.clone()],
        ));
    }

    let staged = vec![publish::StagedFile {
        relative_path: upload_record.relative_path.clone(),
        absolute_staging_path: staging.source.clone(),
        size: bytes_received,
        checksum: verified.md5,
    }];

    let publish_result = publish::publish(
        &state.catalogue,
        &state.registry,
        &state.projects,
        &upload_record.project_id,
        &state.config.storage_id,
        &project_root,
        staged,
    )
    .await;

    let _ = tokio::fs::remove_dir_all(&staging.upload_dir).await;
    let _ = state.uploads.delete(&upload_record.id).await;
    let _ = state.locks.release(&upload_record.project_id, &resolved_str).await;

    publish_result?;
    Ok(formatter::json_data_response(serde_json::json!({ "status": "published" })))
}
