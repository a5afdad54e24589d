//! The consumer's per-message handler: resolve, dispatch, acknowledge.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use alerthub_broker::AlertHandler;
use alerthub_common::NormalizedAlert;

use crate::dispatch::Dispatcher;
use crate::resolver::Resolver;

pub struct FanoutHandler {
    resolver: Resolver,
    dispatcher: Dispatcher,
}

impl FanoutHandler {
    pub fn new(resolver: Resolver, dispatcher: Dispatcher) -> Self {
        Self {
            resolver,
            dispatcher,
        }
    }
}

#[async_trait]
impl AlertHandler for FanoutHandler {
    async fn handle(&self, alert: NormalizedAlert, routing_key: &str) -> Result<()> {
        let recipients = self.resolver.resolve(&alert, routing_key).await;
        if recipients.is_empty() {
            return Ok(());
        }

        info!(
            headline = %alert.headline,
            recipients = recipients.len(),
            "Dispatching notification"
        );
        // Notification delivery is best-effort: a provider outage is logged
        // and the message is still acknowledged, so a broken provider cannot
        // pile the queue up into an alert storm.
        if let Err(e) = self.dispatcher.dispatch(&alert, &recipients).await {
            error!(headline = %alert.headline, error = %e, "Dispatch failed, acknowledging anyway");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use alerthub_common::OnCallEntry;
    use notify_client::Notification;

    use crate::dispatch::Notifier;
    use crate::resolver::{DirectoryApi, OnCallApi};

    struct StaticDirectory;

    #[async_trait]
    impl DirectoryApi for StaticDirectory {
        async fn contact_by_email(&self, _email: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn subscriber_emails(
            &self,
            _organization: &str,
            _region: &str,
            _level: &str,
        ) -> Result<Vec<String>> {
            Ok(vec!["sub@x.com".to_string()])
        }
    }

    struct NoOnCall;

    #[async_trait]
    impl OnCallApi for NoOnCall {
        async fn active_entries(
            &self,
            _organization: &str,
            _area: &str,
            _now: DateTime<Utc>,
        ) -> Result<Vec<OnCallEntry>> {
            Ok(Vec::new())
        }
    }

    struct FailingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _notification: &Notification) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("provider outage")
        }
    }

    fn alert() -> NormalizedAlert {
        NormalizedAlert {
            identifier: None,
            organization_name: Some("ACME".into()),
            language: None,
            category: "flood".into(),
            area: Some("north".into()),
            headline: "Flood warning".into(),
            description: None,
            instruction: None,
            effective_from: None,
            effective_until: Some(Utc::now() + Duration::hours(1)),
            severity: Some("high".into()),
            urgency: None,
            certainty: None,
        }
    }

    #[tokio::test]
    async fn provider_failure_still_acknowledges() {
        let notifier = Arc::new(FailingNotifier {
            calls: AtomicUsize::new(0),
        });
        let handler = FanoutHandler::new(
            Resolver::new(Arc::new(StaticDirectory), Arc::new(NoOnCall), "feed"),
            Dispatcher::new(notifier.clone()),
        );

        // Ok despite the provider outage: ack-regardless policy.
        handler.handle(alert(), "org").await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_resolution_skips_the_provider() {
        let notifier = Arc::new(FailingNotifier {
            calls: AtomicUsize::new(0),
        });
        let handler = FanoutHandler::new(
            Resolver::new(Arc::new(StaticDirectory), Arc::new(NoOnCall), "feed"),
            Dispatcher::new(notifier.clone()),
        );

        let unroutable = NormalizedAlert {
            area: None,
            ..alert()
        };
        handler.handle(unroutable, "org").await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }
}
