use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;

#[derive(Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

/// `POST /organizations`: idempotent create.
pub async fn create_organization(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateOrganizationRequest>,
) -> impl IntoResponse {
    if body.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "name is required"})),
        )
            .into_response();
    }

    match state.store.ensure_organization(&body.name).await {
        Ok((id, existed)) => {
            let status = if existed { "exists" } else { "inserted" };
            info!(organization = %body.name, status, "Organization ensured");
            Json(serde_json::json!({
                "status": status,
                "organization_id": id,
            }))
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Organization create failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /organizations`: list all organizations.
pub async fn list_organizations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_organizations().await {
        Ok(orgs) => {
            let body: Vec<serde_json::Value> = orgs
                .into_iter()
                .map(|(id, name)| {
                    serde_json::json!({
                        "organization_id": id,
                        "organization_name": name,
                    })
                })
                .collect();
            Json(body).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Organization listing failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
