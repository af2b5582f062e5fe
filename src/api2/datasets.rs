//! `GET /v1/datasets/{pid}/{p}` (spec §6, §4.9).

use std::sync::Arc;

use hyper::{Body, Response};
use pifs_api_types::ApiError;
use pifs_store::path::resolve;

use crate::api2::formatter;
use crate::server::AppState;

pub async fn list_datasets(
    state: &Arc<AppState>,
    project_id: &str,
    relative_path: &str,
) -> Result<Response<Body>, ApiError> {
    let project_root = std::path::Path::new(&state.config.upload_projects_path).join(project_id);
    let resolved = resolve(&project_root, relative_path)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;

    let records = state.registry.list_under(&resolved.to_string_lossy()).await?;
    let file_ids: Vec<String> = records.iter().map(|r| r.identifier.clone()).collect();

    let file_to_datasets = state
        .catalogue
        .files_to_datasets(&file_ids)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let dataset_ids: Vec<String> = file_to_datasets
        .into_values()
        .flatten()
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();

    let mut datasets = Vec::with_capacity(dataset_ids.len());
    let mut has_pending_dataset = false;
    for id in dataset_ids {
        let dataset = state
            .catalogue
            .dataset(&id)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        if dataset.preservation_state.is_pending() {
            has_pending_dataset = true;
        }
        datasets.push(serde_json::json!({
            "id": dataset.identifier,
            "preservation_state": dataset.preservation_state,
        }));
    }

    Ok(formatter::json_data_response(serde_json::json!({
        "datasets": datasets,
        "has_pending_dataset": has_pending_dataset,
    })))
}
