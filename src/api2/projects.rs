//! `/v1/projects` (spec §9 Section B supplement): admin project
//! lifecycle. Every handler here is admin-only, same gate as
//! `crate::api2::tokens`.

use std::sync::Arc;

use hyper::{Body, Response};
use pifs_api_types::{ApiError, Principal};

use crate::api2::formatter;
use crate::server::AppState;

fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn project_json(project: &pifs_api_types::Project) -> serde_json::Value {
    serde_json::json!({
        "id": project.id,
        "quota": project.quota,
        "used_quota": project.used_quota,
    })
}

/// `POST /v1/projects` — creates a project with the given quota (bytes).
pub async fn create_project(
    state: &Arc<AppState>,
    principal: &Principal,
    project_id: &str,
    quota: i64,
) -> Result<Response<Body>, ApiError> {
    require_admin(principal)?;
    let project = state.projects.create(project_id, quota).await?;
    Ok(formatter::json_data_response(project_json(&project)))
}

/// `GET /v1/projects` — lists every project, regardless of the
/// principal's own project grants.
pub async fn list_projects(
    state: &Arc<AppState>,
    principal: &Principal,
) -> Result<Response<Body>, ApiError> {
    require_admin(principal)?;
    let all = state.projects.list_all().await?;
    let projects: Vec<_> = all.iter().map(project_json).collect();
    Ok(formatter::json_data_response(
        serde_json::json!({ "projects": projects }),
    ))
}

/// `PUT /v1/projects/<id>/quota` — sets a project's quota (bytes).
pub async fn set_quota(
    state: &Arc<AppState>,
    principal: &Principal,
    project_id: &str,
    quota: i64,
) -> Result<Response<Body>, ApiError> {
    require_admin(principal)?;
    let project = state.projects.set_quota(project_id, quota).await?;
    Ok(formatter::json_data_response(project_json(&project)))
}

/// `DELETE /v1/projects/<id>` — removes the project's catalogue row.
/// Does not touch files already on disk under the project.
pub async fn delete_project(
    state: &Arc<AppState>,
    principal: &Principal,
    project_id: &str,
) -> Result<Response<Body>, ApiError> {
    require_admin(principal)?;
    state.projects.delete(project_id).await?;
    Ok(formatter::json_data_response(
        serde_json::json!({ "status": "deleted" }),
    ))
}
