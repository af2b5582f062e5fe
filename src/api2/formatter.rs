//! Translates an [`ApiError`] (or success value) into the wire response
//! shape from spec §6: `{code, error, files?}` on failure, a bare JSON
//! body on success.

use hyper::{Body, Response, StatusCode};
use pifs_api_types::ApiError;
use serde_json::Value;

const JSON_CONTENT_TYPE: &str = "application/json";

pub fn json_data_response(data: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(data.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

pub fn json_error_response(err: &ApiError) -> Response<Body> {
    if !matches!(err, ApiError::Internal(_)) {
        log::warn!("request failed: {err}");
    } else {
        log::error!("request failed: {err:#}");
    }

    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = json_data_response(err.to_json());
    *response.status_mut() = status;
    response
}

/// 202 Accepted for async operations, with the polling URL in the body
/// (spec §6 archive upload / directory delete responses).
pub fn accepted_response(task_id: &str) -> Response<Body> {
    let mut response = json_data_response(serde_json::json!({
        "task_id": task_id,
        "polling_url": format!("/v1/tasks/{task_id}"),
    }));
    *response.status_mut() = StatusCode::ACCEPTED;
    response
}
