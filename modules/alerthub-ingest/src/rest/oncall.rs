use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use alerthub_common::OnCallEntry;

use crate::AppState;

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub on_call: Vec<OnCallEntry>,
}

/// `POST /organizations/{name}/oncall`: ingest on-call entries. Exact
/// duplicates are reported back as `exists`.
pub async fn add_schedule(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<ScheduleRequest>,
) -> impl IntoResponse {
    if body.on_call.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "on_call list is empty"})),
        )
            .into_response();
    }

    let org_id = match state.store.organization_id(&name).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Organization not found"})),
            )
                .into_response();
        }
        Err(e) => {
            warn!(error = %e, "Organization lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state
        .store
        .insert_oncall_schedule(org_id, &body.on_call)
        .await
    {
        Ok(results) => Json(serde_json::json!({
            "organization_id": org_id,
            "results": results,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "On-call schedule insert failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct ActiveOnCallQuery {
    pub organization_name: String,
    pub area: String,
    pub now: Option<DateTime<Utc>>,
}

/// `GET /oncall/active`: entries covering this organization and area at the
/// given (or current) time. Consumed by the fan-out resolver.
pub async fn active_oncall(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActiveOnCallQuery>,
) -> impl IntoResponse {
    let org_id = match state.store.organization_id(&query.organization_name).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Organization not found"})),
            )
                .into_response();
        }
        Err(e) => {
            warn!(error = %e, "Organization lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let now = query.now.unwrap_or_else(Utc::now);
    match state.store.active_oncall(org_id, &query.area, now).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            warn!(error = %e, "Active on-call query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
