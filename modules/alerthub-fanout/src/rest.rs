//! User-facing query surface: liveness and per-user active events.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use tracing::warn;

use alerthub_common::PUBLIC_SCOPE;
use directory_client::DirectoryClient;

use crate::clients::IngestClient;

pub struct AppState {
    pub directory: Arc<DirectoryClient>,
    pub ingest: Arc<IngestClient>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /events/{user_id}`: the active alerts relevant to one user,
/// resolved through their directory record (organization role + regions).
/// Collaborator outages degrade to an empty list.
pub async fn user_events(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let user = match state.directory.user(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "User not found"})),
            )
                .into_response();
        }
        Err(e) => {
            warn!(user_id, error = %e, "Directory lookup degraded to empty");
            return Json(serde_json::json!([])).into_response();
        }
    };

    if user.region.is_empty() {
        return Json(serde_json::json!([])).into_response();
    }
    let organization = user.role.as_deref().unwrap_or(PUBLIC_SCOPE);

    match state
        .ingest
        .active_events(organization, &user.region, Utc::now())
        .await
    {
        Ok(events) => Json(events).into_response(),
        Err(e) => {
            warn!(user_id, error = %e, "Active events query degraded to empty");
            Json(serde_json::json!([])).into_response()
        }
    }
}
