//! One sweep over the upstream feed: fetch, normalize, upsert, publish.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use alerthub_broker::AlertPublisher;
use alerthub_common::publish_worthy;
use alerthub_store::AlertStore;

use crate::{cap, normalize};

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Polite pause between region fetches.
const REGION_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct SyncStats {
    pub regions_ok: u32,
    pub regions_failed: u32,
    pub alerts_seen: u32,
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub published: u32,
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "regions ok={} failed={}, alerts seen={} inserted={} updated={} unchanged={} published={}",
            self.regions_ok,
            self.regions_failed,
            self.alerts_seen,
            self.inserted,
            self.updated,
            self.unchanged,
            self.published
        )
    }
}

pub struct FeedSync {
    store: AlertStore,
    publisher: Arc<dyn AlertPublisher>,
    http: reqwest::Client,
    /// URL template with a `{region}` placeholder.
    base_url: String,
    routing_key: String,
    publish_language: String,
}

impl FeedSync {
    pub fn new(
        store: AlertStore,
        publisher: Arc<dyn AlertPublisher>,
        base_url: impl Into<String>,
        routing_key: impl Into<String>,
        publish_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            routing_key: routing_key.into(),
            publish_language: publish_language.into(),
        }
    }

    /// Sweep all configured regions once. A failing region is logged and
    /// skipped; the sweep carries on.
    pub async fn run(&self, regions: &[String]) -> SyncStats {
        let mut stats = SyncStats::default();

        for (i, region) in regions.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(REGION_DELAY).await;
            }
            match self.sync_region(region, &mut stats).await {
                Ok(()) => stats.regions_ok += 1,
                Err(e) => {
                    warn!(region = region.as_str(), error = %e, "Region sync failed");
                    stats.regions_failed += 1;
                }
            }
        }

        stats
    }

    async fn sync_region(&self, region: &str, stats: &mut SyncStats) -> Result<()> {
        let url = self.base_url.replace("{region}", region);
        let xml = self
            .http
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let doc = cap::parse_cap(&xml).context("CAP parse failed")?;
        let alerts = normalize::normalize(&doc);
        info!(
            region,
            identifier = %doc.identifier,
            variants = alerts.len(),
            "Fetched upstream document"
        );

        let now = Utc::now();
        for alert in alerts {
            stats.alerts_seen += 1;

            let class = match self.store.upsert_feed_alert(&alert).await {
                Ok(class) => class,
                Err(e) => {
                    warn!(headline = %alert.headline, error = %e, "Upsert failed");
                    continue;
                }
            };
            match class {
                alerthub_common::ChangeClass::Inserted => stats.inserted += 1,
                alerthub_common::ChangeClass::Updated => stats.updated += 1,
                alerthub_common::ChangeClass::DuplicateNoChange => stats.unchanged += 1,
            }

            let primary_language = alert.language.as_deref() == Some(&*self.publish_language);
            if primary_language && publish_worthy(class, alert.effective_until, now) {
                match self.publisher.publish(&alert, &self.routing_key).await {
                    Ok(()) => {
                        info!(headline = %alert.headline, "Published alert");
                        stats.published += 1;
                    }
                    Err(e) => {
                        // Unroutable publishes are lost by policy; anything
                        // else already exhausted the publisher's retries.
                        warn!(headline = %alert.headline, error = %e, "Publish failed");
                    }
                }
            }
        }

        Ok(())
    }
}
