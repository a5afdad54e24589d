//! End-to-end submission tests: store classification driving the publish
//! gate. Requires a Postgres instance; set DATABASE_TEST_URL or these tests
//! are skipped. Publishes are captured by a recording stand-in.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use alerthub_broker::{AlertPublisher, PublishError};
use alerthub_common::NormalizedAlert;
use alerthub_ingest::ingest::process_submission;
use alerthub_store::{migrate, AlertStore};

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl AlertPublisher for RecordingPublisher {
    async fn publish(
        &self,
        alert: &NormalizedAlert,
        routing_key: &str,
    ) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap()
            .push((alert.headline.clone(), routing_key.to_string()));
        Ok(())
    }
}

impl RecordingPublisher {
    fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

async fn test_store() -> Option<AlertStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    migrate(&pool).await.ok()?;
    Some(AlertStore::new(pool))
}

fn flood_alert() -> NormalizedAlert {
    NormalizedAlert {
        identifier: None,
        organization_name: None,
        language: None,
        category: "flood".into(),
        area: Some("north".into()),
        headline: "Flood warning".into(),
        description: Some("River levels rising".into()),
        instruction: None,
        effective_from: Some(Utc::now()),
        effective_until: Some(Utc::now() + Duration::hours(6)),
        severity: Some("high".into()),
        urgency: Some("immediate".into()),
        certainty: None,
    }
}

#[tokio::test]
async fn resubmission_publishes_exactly_once() {
    let Some(store) = test_store().await else {
        return;
    };
    let publisher = RecordingPublisher::default();
    let org = format!("ACME-{}", Uuid::new_v4());

    // First submission: inserted, published.
    let results = process_submission(&store, &publisher, "org", &org, vec![flood_alert()])
        .await
        .unwrap();
    assert_eq!(results[0].status, "inserted");
    assert!(results[0].published);
    assert_eq!(publisher.count(), 1);

    // Identical resubmission: no change, no publish.
    let results = process_submission(&store, &publisher, "org", &org, vec![flood_alert()])
        .await
        .unwrap();
    assert_eq!(results[0].status, "duplicate_no_change");
    assert!(!results[0].published);
    assert_eq!(publisher.count(), 1);

    // Escalated severity: updated, published again.
    let escalated = NormalizedAlert {
        severity: Some("extreme".into()),
        ..flood_alert()
    };
    let results = process_submission(&store, &publisher, "org", &org, vec![escalated])
        .await
        .unwrap();
    assert_eq!(results[0].status, "updated");
    assert!(results[0].published);
    assert_eq!(publisher.count(), 2);
}

#[tokio::test]
async fn stale_alert_is_persisted_but_never_published() {
    let Some(store) = test_store().await else {
        return;
    };
    let publisher = RecordingPublisher::default();
    let org = format!("ACME-{}", Uuid::new_v4());

    let stale = NormalizedAlert {
        effective_from: Some(Utc::now() - Duration::hours(6)),
        effective_until: Some(Utc::now() - Duration::hours(1)),
        ..flood_alert()
    };
    let results = process_submission(&store, &publisher, "org", &org, vec![stale])
        .await
        .unwrap();

    assert_eq!(results[0].status, "inserted");
    assert!(!results[0].published);
    assert_eq!(publisher.count(), 0);
}

#[tokio::test]
async fn invalid_alert_gets_error_outcome_without_aborting_batch() {
    let Some(store) = test_store().await else {
        return;
    };
    let publisher = RecordingPublisher::default();
    let org = format!("ACME-{}", Uuid::new_v4());

    let no_area = NormalizedAlert {
        area: None,
        headline: "No area".into(),
        ..flood_alert()
    };
    let inverted = NormalizedAlert {
        headline: "Backwards window".into(),
        effective_from: Some(Utc::now()),
        effective_until: Some(Utc::now() - Duration::hours(1)),
        ..flood_alert()
    };

    let results = process_submission(
        &store,
        &publisher,
        "org",
        &org,
        vec![no_area, inverted, flood_alert()],
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, "error");
    assert_eq!(results[1].status, "error");
    assert_eq!(results[2].status, "inserted");
    assert_eq!(publisher.count(), 1);
}

#[tokio::test]
async fn publisher_routing_key_is_the_configured_one() {
    let Some(store) = test_store().await else {
        return;
    };
    let publisher = RecordingPublisher::default();
    let org = format!("ACME-{}", Uuid::new_v4());

    process_submission(&store, &publisher, "org", &org, vec![flood_alert()])
        .await
        .unwrap();

    let published = publisher.published.lock().unwrap();
    assert_eq!(published[0].1, "org");
}
