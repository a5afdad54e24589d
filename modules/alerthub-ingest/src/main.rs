use std::sync::Arc;

use anyhow::Result;
use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use alerthub_broker::Publisher;
use alerthub_common::Config;
use alerthub_ingest::{rest, AppState};
use alerthub_store::{connect_and_migrate, AlertStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("alerthub=info".parse()?))
        .init();

    let config = Config::ingest_from_env();

    let pool = connect_and_migrate(&config.database_url).await?;
    let store = AlertStore::new(pool);
    let publisher = Arc::new(Publisher::new(
        config.amqp_url.as_str(),
        config.alerts_exchange.as_str(),
    ));

    let state = Arc::new(AppState {
        store,
        publisher,
        org_routing_key: config.org_routing_key.clone(),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route(
            "/events",
            post(rest::events::submit_events).get(rest::events::list_events),
        )
        .route("/events/active", get(rest::events::active_events))
        .route(
            "/organizations",
            post(rest::organizations::create_organization)
                .get(rest::organizations::list_organizations),
        )
        .route(
            "/organizations/{name}/oncall",
            post(rest::oncall::add_schedule),
        )
        .route("/oncall/active", get(rest::oncall::active_oncall))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.http_host, config.http_port);
    info!("AlertHub ingest starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
