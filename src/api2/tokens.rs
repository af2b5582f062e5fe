//! `/v1/tokens/...` (spec §6): token administration, admin principal only.

use std::sync::Arc;

use hyper::{Body, Response};
use pifs_api_types::{ApiError, Principal};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::api2::formatter;
use crate::server::AppState;

fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// `POST /v1/tokens` — mints a token for `username`, scoped to `projects`
/// (empty means "all of the user's projects", per spec §3).
pub async fn create_token(
    state: &Arc<AppState>,
    principal: &Principal,
    username: &str,
    projects: Vec<String>,
    admin: bool,
    expires_at: Option<i64>,
) -> Result<Response<Body>, ApiError> {
    require_admin(principal)?;

    let mut raw = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let token = hex::encode(&raw);
    let token_hash = hex::encode(Sha256::digest(token.as_bytes()));
    let id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO tokens (id, username, projects, token_hash, expires_at, admin, session) \
         VALUES ($1, $2, $3, $4, $5, $6, false)",
    )
    .bind(&id)
    .bind(username)
    .bind(&projects)
    .bind(&token_hash)
    .bind(expires_at)
    .bind(admin)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(formatter::json_data_response(serde_json::json!({
        "id": id,
        "token": token,
    })))
}

/// `GET /v1/tokens` — lists tokens, metadata only; the raw token value is
/// never stored so it cannot be returned again after creation.
pub async fn list_tokens(
    state: &Arc<AppState>,
    principal: &Principal,
) -> Result<Response<Body>, ApiError> {
    require_admin(principal)?;

    let rows: Vec<(String, String, Vec<String>, bool)> = sqlx::query_as(
        "SELECT id, username, projects, admin FROM tokens ORDER BY id",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;

    let tokens: Vec<_> = rows
        .into_iter()
        .map(|(id, username, projects, admin)| {
            serde_json::json!({ "id": id, "username": username, "projects": projects, "admin": admin })
        })
        .collect();

    Ok(formatter::json_data_response(serde_json::json!({ "tokens": tokens })))
}

/// `DELETE /v1/tokens/<id>`.
pub async fn delete_token(
    state: &Arc<AppState>,
    principal: &Principal,
    token_id: &str,
) -> Result<Response<Body>, ApiError> {
    require_admin(principal)?;

    sqlx::query("DELETE FROM tokens WHERE id = $1")
        .bind(token_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(formatter::json_data_response(
        serde_json::json!({ "status": "deleted" }),
    ))
}
