//! `/v1/tasks/<id>` (spec §6, §4.7): poll-and-delete-on-terminal, and
//! explicit removal.

use std::sync::Arc;

use hyper::{Body, Response};
use pifs_api_types::{ApiError, Principal, TaskId};

use crate::api2::formatter;
use crate::server::AppState;

/// `GET /v1/tasks/<id>`. A terminal read deletes the task on the way out
/// so a second poll sees 404 (spec §4.7 "exactly-once observation").
pub async fn get_task(
    state: &Arc<AppState>,
    principal: &Principal,
    task_id: &TaskId,
) -> Result<Response<Body>, ApiError> {
    let task = state
        .tasks
        .get_reconciled(task_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or_else(|| ApiError::NotFound(task_id.clone()))?;
    if !principal.can_access(&task.project_id) {
        return Err(ApiError::Forbidden);
    }

    let body = serde_json::json!({
        "status": task.status,
        "message": task.message,
        "errors": task.errors,
    });

    if task.status != pifs_api_types::TaskStatus::Pending {
        state
            .tasks
            .delete(task_id)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }

    Ok(formatter::json_data_response(body))
}

/// `DELETE /v1/tasks/<id>`: explicit removal regardless of status.
pub async fn delete_task(
    state: &Arc<AppState>,
    principal: &Principal,
    task_id: &TaskId,
) -> Result<Response<Body>, ApiError> {
    if let Some(task) = state
        .tasks
        .get_reconciled(task_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
    {
        if !principal.can_access(&task.project_id) {
            return Err(ApiError::Forbidden);
        }
    }

    state
        .tasks
        .delete(task_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(formatter::json_data_response(
        serde_json::json!({ "status": "deleted" }),
    ))
}
