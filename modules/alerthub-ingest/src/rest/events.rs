use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use alerthub_common::{NormalizedAlert, PUBLIC_SCOPE};
use alerthub_store::store::clean_org_name;
use alerthub_store::HistoryFilter;

use crate::ingest::process_submission;
use crate::AppState;

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub organization_name: String,
    #[serde(default)]
    pub events: Vec<NormalizedAlert>,
}

/// `POST /events`: ingest a batch of alerts for one organization. Returns a
/// per-alert outcome so the submitter can audit what happened to each entry.
pub async fn submit_events(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> impl IntoResponse {
    if body.organization_name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "organization_name is required"})),
        )
            .into_response();
    }

    match process_submission(
        &state.store,
        state.publisher.as_ref(),
        &state.org_routing_key,
        &body.organization_name,
        body.events,
    )
    .await
    {
        Ok(results) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "organization": clean_org_name(&body.organization_name),
                "results": results,
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Submission processing failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub organization_name: String,
    pub area: Option<String>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
    pub urgency: Option<String>,
}

/// `GET /events`: historical alerts for an organization, optionally
/// filtered.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
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

    let filter = HistoryFilter {
        area: query.area,
        effective_from: query.effective_from,
        effective_until: query.effective_until,
        urgency: query.urgency,
    };
    match state.store.org_alert_history(org_id, &filter).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(error = %e, "Event history query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct ActiveQuery {
    pub organization_name: String,
    /// Comma-separated area list.
    pub areas: String,
    pub now: Option<DateTime<Utc>>,
}

/// `GET /events/active`: alerts still inside their validity window for the
/// given areas. The public marker serves the feed table.
pub async fn active_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActiveQuery>,
) -> impl IntoResponse {
    let areas: Vec<String> = query
        .areas
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if areas.is_empty() {
        return Json(serde_json::json!([])).into_response();
    }
    let now = query.now.unwrap_or_else(Utc::now);

    if query.organization_name == PUBLIC_SCOPE {
        return match state.store.active_feed_alerts(&areas, now).await {
            Ok(rows) => Json(rows).into_response(),
            Err(e) => {
                warn!(error = %e, "Active feed alerts query failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
    }

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

    match state.store.active_org_alerts(org_id, &areas, now).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(error = %e, "Active org alerts query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
