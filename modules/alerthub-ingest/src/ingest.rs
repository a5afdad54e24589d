//! Submission processing: upsert, classify, gate, publish.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use alerthub_broker::AlertPublisher;
use alerthub_common::{publish_worthy, NormalizedAlert};
use alerthub_store::{store::clean_org_name, AlertStore};

/// Per-alert audit record returned to the submitter.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub headline: String,
    /// `inserted` / `updated` / `duplicate_no_change` / `error`.
    pub status: String,
    pub published: bool,
}

/// Process one batch of alerts for an organization. The organization is
/// provisioned on first contact. Each alert gets its own outcome; one bad
/// alert never aborts the batch.
pub async fn process_submission(
    store: &AlertStore,
    publisher: &dyn AlertPublisher,
    routing_key: &str,
    organization_name: &str,
    events: Vec<NormalizedAlert>,
) -> anyhow::Result<Vec<SubmissionResult>> {
    let clean_name = clean_org_name(organization_name);
    let (org_id, _) = store.ensure_organization(&clean_name).await?;
    let now = Utc::now();

    let mut results = Vec::with_capacity(events.len());
    for event in events {
        let alert = NormalizedAlert {
            organization_name: Some(clean_name.clone()),
            ..event
        }
        .normalized();

        if let Err(e) = alert.validate() {
            warn!(headline = %alert.headline, error = %e, "Rejected invalid alert");
            results.push(SubmissionResult {
                headline: alert.headline,
                status: "error".to_string(),
                published: false,
            });
            continue;
        }
        if alert.area.is_none() {
            warn!(headline = %alert.headline, "Rejected alert without area");
            results.push(SubmissionResult {
                headline: alert.headline,
                status: "error".to_string(),
                published: false,
            });
            continue;
        }

        let class = match store.upsert_org_alert(org_id, &alert).await {
            Ok(class) => class,
            Err(e) => {
                warn!(headline = %alert.headline, error = %e, "Upsert failed");
                results.push(SubmissionResult {
                    headline: alert.headline,
                    status: "error".to_string(),
                    published: false,
                });
                continue;
            }
        };

        let mut published = false;
        if publish_worthy(class, alert.effective_until, now) {
            match publisher.publish(&alert, routing_key).await {
                Ok(()) => {
                    info!(headline = %alert.headline, status = %class, "Published alert");
                    published = true;
                }
                Err(e) => {
                    // Persisted but not propagated; unroutable means lost by
                    // policy, anything else exhausted the retry budget.
                    warn!(headline = %alert.headline, error = %e, "Publish failed");
                }
            }
        }

        results.push(SubmissionResult {
            headline: alert.headline,
            status: class.to_string(),
            published,
        });
    }

    Ok(results)
}
