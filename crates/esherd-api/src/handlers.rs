//! Control surface handlers.
//!
//! Each handler checks the API key, delegates to the membership store or
//! the lifecycle client, and wraps the result in the response envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use tracing::error;

use crate::ApiState;

/// Response envelope shared by every endpoint.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            status: "OK",
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ApiResponse::<()> {
            status: "ERROR",
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn authorized(state: &ApiState, headers: &HeaderMap) -> bool {
    headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        == Some(state.api_key.as_str())
}

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return error_response("invalid api key", StatusCode::UNAUTHORIZED);
    }
    ApiResponse::ok(state.membership.list().await).into_response()
}

/// POST /api/v1/nodes
///
/// Provisions one node. Blocks until the instance reports status OK and
/// is registered, which can take minutes.
pub async fn provision_node(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return error_response("invalid api key", StatusCode::UNAUTHORIZED);
    }
    match state.lifecycle.provision().await {
        Ok(()) => ApiResponse::ok(state.membership.list().await).into_response(),
        Err(e) => {
            error!(error = %e, "provisioning via api failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// DELETE /api/v1/nodes/:ip
pub async fn decommission_node(
    State(state): State<ApiState>,
    Path(ip): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return error_response("invalid api key", StatusCode::UNAUTHORIZED);
    }
    match state.lifecycle.decommission(&ip).await {
        Ok(()) => ApiResponse::ok(state.membership.list().await).into_response(),
        Err(e) => {
            error!(%ip, error = %e, "decommissioning via api failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
