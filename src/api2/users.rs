//! `GET /v1/users/projects` (spec §6): projects the current principal may
//! access.

use std::sync::Arc;

use hyper::{Body, Response};
use pifs_api_types::{ApiError, Principal};

use crate::api2::formatter;
use crate::server::AppState;

pub async fn list_projects(
    state: &Arc<AppState>,
    principal: &Principal,
) -> Result<Response<Body>, ApiError> {
    let all = state.projects.list_all().await?;
    let visible: Vec<_> = all
        .into_iter()
        .filter(|p| principal.can_access(&p.id))
        .map(|p| serde_json::json!({ "id": p.id, "quota": p.quota, "used_quota": p.used_quota }))
        .collect();

    Ok(formatter::json_data_response(
        serde_json::json!({ "projects": visible }),
    ))
}
