//! Fan-out service: one supervised consumer task plus a small query API.

use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alerthub_broker::Consumer;
use alerthub_common::Config;
use alerthub_fanout::clients::IngestClient;
use alerthub_fanout::rest::{self, AppState};
use alerthub_fanout::{Dispatcher, FanoutHandler, Resolver};
use directory_client::DirectoryClient;
use notify_client::NotifyClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("alerthub=info".parse()?))
        .init();

    let config = Config::fanout_from_env();

    let directory = Arc::new(DirectoryClient::new(config.users_service_url.as_str()));
    let ingest = Arc::new(IngestClient::new(config.ingest_base_url.as_str()));
    let notify = Arc::new(NotifyClient::new(
        config.notify_url.clone(),
        config.notify_token.clone(),
    ));

    let resolver = Resolver::new(
        directory.clone(),
        ingest.clone(),
        config.feed_routing_key.as_str(),
    );
    let dispatcher = Dispatcher::new(notify);
    let handler = Arc::new(FanoutHandler::new(resolver, dispatcher));

    // The consumer owns its broker connection and runs as one supervised
    // background task with an explicit shutdown signal.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Consumer::new(
        config.amqp_url.as_str(),
        config.alerts_exchange.as_str(),
        config.alerts_queue.as_str(),
        vec![
            config.feed_routing_key.clone(),
            config.org_routing_key.clone(),
        ],
    );
    let consumer_task = tokio::spawn(async move {
        consumer.run(handler, shutdown_rx).await;
    });

    let state = Arc::new(AppState { directory, ingest });
    let app = Router::new()
        .route("/health", get(rest::health))
        .route("/events/{user_id}", get(rest::user_events))
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
    info!("AlertHub fan-out starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    consumer_task.await?;

    Ok(())
}
