//! Public-feed sync service: one sweep per invocation (run it from cron or a
//! scheduler). Fetches the upstream CAP document per region, persists every
//! variant, and publishes the new or changed ones on the feed routing key.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alerthub_broker::Publisher;
use alerthub_common::Config;
use alerthub_store::{connect_and_migrate, AlertStore};

mod cap;
mod normalize;
mod sync;

use sync::FeedSync;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("alerthub=info".parse()?))
        .init();

    info!("AlertHub feed sync starting");

    let config = Config::feed_from_env();
    let pool = connect_and_migrate(&config.database_url).await?;
    let store = AlertStore::new(pool);

    let publisher = Arc::new(Publisher::new(
        config.amqp_url.as_str(),
        config.alerts_exchange.as_str(),
    ));

    let sync = FeedSync::new(
        store,
        publisher,
        config.feed_base_url.as_str(),
        config.feed_routing_key.as_str(),
        config.feed_publish_language.as_str(),
    );
    let stats = sync.run(&config.feed_regions).await;

    info!("Feed sync complete. {stats}");
    Ok(())
}
