//! `POST /v1/directories/{pid}/{p}` (spec §6): create an empty directory.

use std::sync::Arc;

use hyper::{Body, Response};
use pifs_api_types::ApiError;
use pifs_store::path::resolve;

use crate::api2::formatter;
use crate::server::AppState;

pub async fn create_directory(
    state: &Arc<AppState>,
    project_id: &str,
    relative_path: &str,
) -> Result<Response<Body>, ApiError> {
    let project_root = std::path::Path::new(&state.config.upload_projects_path).join(project_id);
    let resolved = resolve(&project_root, relative_path)
        .map_err(|e| ApiError::InvalidPath(e.to_string()))?;

    if resolved.exists() {
        return Err(ApiError::conflict(
            format!("'{relative_path}' already exists"),
            vec![relative_path.to_string()],
        ));
    }

    tokio::fs::create_dir_all(&resolved)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(formatter::json_data_response(
        serde_json::json!({ "status": "created" }),
    ))
}
