//! HTTP surface (spec §6). Each submodule owns one resource area; this
//! module only does request plumbing: pulling out the principal, naive
//! path-segment routing, and handing off to the resource handler.

pub mod archives;
pub mod datasets;
pub mod directories;
pub mod files;
pub mod files_tus;
pub mod formatter;
pub mod projects;
pub mod tasks;
pub mod tokens;
pub mod users;

use std::sync::Arc;

use hyper::{Body, Method, Request, Response};
use percent_encoding::percent_decode_str;
use pifs_api_types::{ApiError, Principal};

use crate::server::AppState;

/// Resolves the request's `Authorization` header into a [`Principal`]
/// (spec §6): `Bearer <token>` or HTTP Basic.
pub async fn authenticate(state: &AppState, req: &Request<Body>) -> Result<Principal, ApiError> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        return state.auth.authenticate_bearer(token).await;
    }

    if let Some(encoded) = header.strip_prefix("Basic ") {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ApiError::Unauthorized)?;
        let decoded = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;
        let (username, password) = decoded.split_once(':').ok_or(ApiError::Unauthorized)?;
        return state.auth.authenticate_basic(username, password).await;
    }

    Err(ApiError::Unauthorized)
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            Some(decode_segment(v))
        } else {
            None
        }
    })
}

fn check_access(principal: &Principal, project_id: &str) -> Result<(), ApiError> {
    if principal.can_access(project_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Top-level dispatch: matches `(method, path segments)` against the
/// table in spec §6. `/v1/files_tus` is checked before the generic
/// `/v1/files/{pid}/{p}` route since both start with `files`.
pub async fn route(state: Arc<AppState>, req: Request<Body>) -> Response<Body> {
    match dispatch(&state, req).await {
        Ok(response) => response,
        Err(err) => formatter::json_error_response(&err),
    }
}

async fn dispatch(state: &Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, ApiError> {
    let principal = authenticate(state, &req).await?;

    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let segments: Vec<String> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect();
    let seg: Vec<&str> = segments.iter().map(String::as_str).collect();
    let method = req.method().clone();

    match (method, seg.as_slice()) {
        (Method::POST, ["v1", "files_tus"]) => files_tus::create(state, &principal, req).await,
        (Method::HEAD, ["v1", "files_tus", id]) => files_tus::head(state, &principal, id).await,
        (Method::PATCH, ["v1", "files_tus", id]) => {
            files_tus::patch(state, &principal, id, req).await
        }

        (Method::POST, ["v1", "archives", pid]) => {
            check_access(&principal, pid)?;
            let dir = query_param(&query, "dir").unwrap_or_default();
            archives::upload_archive(state, pid, &dir, req).await
        }

        (Method::POST, ["v1", "files", pid, rest @ ..]) if !rest.is_empty() => {
            check_access(&principal, pid)?;
            let md5 = query_param(&query, "md5");
            files::upload_file(state, pid, &rest.join("/"), md5.as_deref(), req).await
        }
        (Method::GET, ["v1", "files", pid, rest @ ..]) => {
            check_access(&principal, pid)?;
            files::get_file(state, pid, &rest.join("/")).await
        }
        (Method::DELETE, ["v1", "files", pid, rest @ ..]) => {
            check_access(&principal, pid)?;
            files::delete_file(state, pid, &rest.join("/")).await
        }

        (Method::POST, ["v1", "directories", pid, rest @ ..]) if !rest.is_empty() => {
            check_access(&principal, pid)?;
            directories::create_directory(state, pid, &rest.join("/")).await
        }

        (Method::GET, ["v1", "datasets", pid, rest @ ..]) => {
            check_access(&principal, pid)?;
            datasets::list_datasets(state, pid, &rest.join("/")).await
        }

        (Method::GET, ["v1", "tasks", id]) => {
            tasks::get_task(state, &principal, &id.to_string()).await
        }
        (Method::DELETE, ["v1", "tasks", id]) => {
            tasks::delete_task(state, &principal, &id.to_string()).await
        }

        (Method::POST, ["v1", "tokens"]) => {
            let body = hyper::body::to_bytes(req.into_body())
                .await
                .map_err(|e| ApiError::UploadError(e.to_string()))?;
            let payload: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| ApiError::UploadError(format!("invalid JSON body: {e}")))?;
            let username = payload["username"]
                .as_str()
                .ok_or_else(|| ApiError::UploadError("missing 'username'".to_string()))?;
            let projects = payload["projects"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let admin = payload["admin"].as_bool().unwrap_or(false);
            let expires_at = payload["expires_at"].as_i64();
            tokens::create_token(state, &principal, username, projects, admin, expires_at).await
        }
        (Method::GET, ["v1", "tokens"]) => tokens::list_tokens(state, &principal).await,
        (Method::DELETE, ["v1", "tokens", id]) => {
            tokens::delete_token(state, &principal, id).await
        }

        (Method::GET, ["v1", "users", "projects"]) => users::list_projects(state, &principal).await,

        (Method::POST, ["v1", "projects"]) => {
            let body = hyper::body::to_bytes(req.into_body())
                .await
                .map_err(|e| ApiError::UploadError(e.to_string()))?;
            let payload: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| ApiError::UploadError(format!("invalid JSON body: {e}")))?;
            let project_id = payload["id"]
                .as_str()
                .ok_or_else(|| ApiError::UploadError("missing 'id'".to_string()))?;
            let quota = payload["quota"]
                .as_i64()
                .ok_or_else(|| ApiError::UploadError("missing 'quota'".to_string()))?;
            projects::create_project(state, &principal, project_id, quota).await
        }
        (Method::GET, ["v1", "projects"]) => projects::list_projects(state, &principal).await,
        (Method::PUT, ["v1", "projects", pid, "quota"]) => {
            let body = hyper::body::to_bytes(req.into_body())
                .await
                .map_err(|e| ApiError::UploadError(e.to_string()))?;
            let payload: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| ApiError::UploadError(format!("invalid JSON body: {e}")))?;
            let quota = payload["quota"]
                .as_i64()
                .ok_or_else(|| ApiError::UploadError("missing 'quota'".to_string()))?;
            projects::set_quota(state, &principal, pid, quota).await
        }
        (Method::DELETE, ["v1", "projects", pid]) => {
            projects::delete_project(state, &principal, pid).await
        }

        _ => Err(ApiError::NotFound(path)),
    }
}
