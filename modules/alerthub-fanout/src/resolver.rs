//! Recipient resolution: who hears about an alert, and as what.
//!
//! On-call responders are resolved before regular subscribers; the first
//! path to claim an email fixes its group. Remote sub-queries degrade to
//! empty rather than failing the alert; a directory outage suppresses
//! notifications, it never crashes the pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use alerthub_common::{NormalizedAlert, OnCallEntry, Recipient, RecipientGroup, PUBLIC_SCOPE};

/// The slice of the user directory the resolver needs.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Resolve a responder's contact email, `None` when the directory has no
    /// record for it.
    async fn contact_by_email(&self, email: &str) -> Result<Option<String>>;

    /// Emails of regular subscribers matching organization, region and
    /// severity level.
    async fn subscriber_emails(
        &self,
        organization: &str,
        region: &str,
        level: &str,
    ) -> Result<Vec<String>>;
}

/// The on-call schedule query the resolver needs.
#[async_trait]
pub trait OnCallApi: Send + Sync {
    /// Entries active at `now` for this organization whose areas cover
    /// `area`.
    async fn active_entries(
        &self,
        organization: &str,
        area: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OnCallEntry>>;
}

pub struct Resolver {
    directory: Arc<dyn DirectoryApi>,
    oncall: Arc<dyn OnCallApi>,
    feed_routing_key: String,
}

impl Resolver {
    pub fn new(
        directory: Arc<dyn DirectoryApi>,
        oncall: Arc<dyn OnCallApi>,
        feed_routing_key: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            oncall,
            feed_routing_key: feed_routing_key.into(),
        }
    }

    /// Compute the deduplicated recipient set for one alert. An empty result
    /// is an expected outcome, not a failure.
    pub async fn resolve(&self, alert: &NormalizedAlert, routing_key: &str) -> Vec<Recipient> {
        // Public-feed alerts have no on-call concept, whatever organization
        // data the message happens to carry.
        let skip_oncall = routing_key == self.feed_routing_key;

        let organization = if skip_oncall {
            PUBLIC_SCOPE.to_string()
        } else {
            match alert.organization_name.as_deref() {
                Some(org) if !org.is_empty() => org.to_string(),
                _ => {
                    warn!(headline = %alert.headline, "Alert without organization cannot be routed, dropping");
                    return Vec::new();
                }
            }
        };
        let Some(area) = alert.area.as_deref() else {
            warn!(headline = %alert.headline, "Alert without area cannot be routed, dropping");
            return Vec::new();
        };
        let severity = alert.severity.as_deref().unwrap_or_default();
        if severity.is_empty() {
            info!(headline = %alert.headline, "Alert without severity matches no recipients");
            return Vec::new();
        }

        let now = Utc::now();
        let mut recipients: Vec<Recipient> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        if !skip_oncall {
            for entry in self.matched_oncall(&organization, area, severity, now).await {
                match self.directory.contact_by_email(&entry.responder_email).await {
                    Ok(Some(email)) => {
                        if seen.insert(email.clone()) {
                            recipients.push(Recipient {
                                email,
                                group: RecipientGroup::Oncall,
                            });
                        }
                    }
                    Ok(None) => {
                        warn!(
                            responder = %entry.responder_email,
                            "On-call responder has no directory record, skipping"
                        );
                    }
                    Err(e) => {
                        warn!(
                            responder = %entry.responder_email,
                            error = %e,
                            "On-call responder lookup failed, skipping"
                        );
                    }
                }
            }
        }

        match self
            .directory
            .subscriber_emails(&organization, area, severity)
            .await
        {
            Ok(emails) => {
                for email in emails {
                    if seen.insert(email.clone()) {
                        recipients.push(Recipient {
                            email,
                            group: RecipientGroup::Regular,
                        });
                    }
                }
            }
            Err(e) => {
                warn!(
                    organization = %organization,
                    area,
                    error = %e,
                    "Subscriber query degraded to empty"
                );
            }
        }

        if recipients.is_empty() {
            info!(headline = %alert.headline, organization = %organization, area, "No recipients for alert");
        }
        recipients
    }

    /// Active on-call entries whose levels cover the alert's severity. A
    /// failing on-call query degrades to no entries.
    async fn matched_oncall(
        &self,
        organization: &str,
        area: &str,
        severity: &str,
        now: DateTime<Utc>,
    ) -> Vec<OnCallEntry> {
        let entries = match self.oncall.active_entries(organization, area, now).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(organization, area, error = %e, "On-call query degraded to empty");
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .filter(|entry| entry.levels.iter().any(|l| l == severity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockDirectory {
        /// responder email -> directory contact email
        contacts: HashMap<String, String>,
        subscribers: Vec<String>,
        fail_subscribers: bool,
        last_subscriber_query: std::sync::Mutex<Option<(String, String, String)>>,
    }

    impl MockDirectory {
        fn new(contacts: &[(&str, &str)], subscribers: &[&str]) -> Self {
            Self {
                contacts: contacts
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                subscribers: subscribers.iter().map(|s| s.to_string()).collect(),
                fail_subscribers: false,
                last_subscriber_query: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl DirectoryApi for MockDirectory {
        async fn contact_by_email(&self, email: &str) -> Result<Option<String>> {
            Ok(self.contacts.get(email).cloned())
        }

        async fn subscriber_emails(
            &self,
            organization: &str,
            region: &str,
            level: &str,
        ) -> Result<Vec<String>> {
            *self.last_subscriber_query.lock().unwrap() = Some((
                organization.to_string(),
                region.to_string(),
                level.to_string(),
            ));
            if self.fail_subscribers {
                anyhow::bail!("directory down");
            }
            Ok(self.subscribers.clone())
        }
    }

    struct MockOnCall {
        entries: Vec<OnCallEntry>,
        queried: AtomicBool,
        fail: bool,
    }

    impl MockOnCall {
        fn new(entries: Vec<OnCallEntry>) -> Self {
            Self {
                entries,
                queried: AtomicBool::new(false),
                fail: false,
            }
        }

        fn none() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl OnCallApi for MockOnCall {
        async fn active_entries(
            &self,
            _organization: &str,
            _area: &str,
            _now: DateTime<Utc>,
        ) -> Result<Vec<OnCallEntry>> {
            self.queried.store(true, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("on-call service down");
            }
            Ok(self.entries.clone())
        }
    }

    fn entry(email: &str, levels: &[&str], areas: &[&str]) -> OnCallEntry {
        let now = Utc::now();
        OnCallEntry {
            responder_email: email.to_string(),
            active_from: now - Duration::hours(1),
            active_until: now + Duration::hours(1),
            levels: levels.iter().map(|l| l.to_string()).collect(),
            areas: areas.iter().map(|a| a.to_string()).collect(),
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

    fn resolver(directory: MockDirectory, oncall: MockOnCall) -> (Resolver, Arc<MockOnCall>) {
        let oncall = Arc::new(oncall);
        (
            Resolver::new(Arc::new(directory), oncall.clone(), "feed"),
            oncall,
        )
    }

    #[tokio::test]
    async fn matched_oncall_responder_is_included_as_oncall() {
        let directory = MockDirectory::new(&[("r@x.com", "r@x.com")], &[]);
        let oncall = MockOnCall::new(vec![entry("r@x.com", &["high"], &["north"])]);
        let (resolver, _) = resolver(directory, oncall);

        let recipients = resolver.resolve(&alert(), "org").await;
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].email, "r@x.com");
        assert_eq!(recipients[0].group, RecipientGroup::Oncall);
    }

    #[tokio::test]
    async fn identity_on_both_paths_appears_once_as_oncall() {
        let directory =
            MockDirectory::new(&[("r@x.com", "r@x.com")], &["r@x.com", "other@x.com"]);
        let oncall = MockOnCall::new(vec![entry("r@x.com", &["high"], &["north"])]);
        let (resolver, _) = resolver(directory, oncall);

        let recipients = resolver.resolve(&alert(), "org").await;
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].email, "r@x.com");
        assert_eq!(recipients[0].group, RecipientGroup::Oncall);
        assert_eq!(recipients[1].email, "other@x.com");
        assert_eq!(recipients[1].group, RecipientGroup::Regular);
    }

    #[tokio::test]
    async fn public_routing_key_never_queries_oncall() {
        let directory = MockDirectory::new(&[], &["sub@x.com"]);
        let oncall = MockOnCall::new(vec![entry("r@x.com", &["high"], &["north"])]);
        let (resolver, oncall) = resolver(directory, oncall);

        // Organization data present on the message must not matter.
        let recipients = resolver.resolve(&alert(), "feed").await;
        assert!(!oncall.queried.load(Ordering::SeqCst));
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].group, RecipientGroup::Regular);
    }

    #[tokio::test]
    async fn public_alert_queries_subscribers_under_public_scope() {
        let directory = MockDirectory::new(&[], &["sub@x.com"]);
        let directory_ref = Arc::new(directory);
        let resolver = Resolver::new(directory_ref.clone(), Arc::new(MockOnCall::none()), "feed");

        resolver.resolve(&alert(), "feed").await;
        let query = directory_ref.last_subscriber_query.lock().unwrap().clone();
        assert_eq!(
            query,
            Some(("public".to_string(), "north".to_string(), "high".to_string()))
        );
    }

    #[tokio::test]
    async fn missing_area_or_organization_resolves_empty() {
        let directory = MockDirectory::new(&[], &["sub@x.com"]);
        let (resolver, oncall) = resolver(directory, MockOnCall::none());

        let no_area = NormalizedAlert {
            area: None,
            ..alert()
        };
        assert!(resolver.resolve(&no_area, "org").await.is_empty());

        let no_org = NormalizedAlert {
            organization_name: None,
            ..alert()
        };
        assert!(resolver.resolve(&no_org, "org").await.is_empty());
        assert!(!oncall.queried.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn severity_outside_entry_levels_is_filtered() {
        let directory = MockDirectory::new(&[("r@x.com", "r@x.com")], &[]);
        let oncall = MockOnCall::new(vec![entry("r@x.com", &["extreme"], &["north"])]);
        let (resolver, _) = resolver(directory, oncall);

        let recipients = resolver.resolve(&alert(), "org").await;
        assert!(recipients.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_responder_is_skipped_not_fatal() {
        let directory = MockDirectory::new(&[("known@x.com", "known@x.com")], &[]);
        let oncall = MockOnCall::new(vec![
            entry("ghost@x.com", &["high"], &["north"]),
            entry("known@x.com", &["high"], &["north"]),
        ]);
        let (resolver, _) = resolver(directory, oncall);

        let recipients = resolver.resolve(&alert(), "org").await;
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].email, "known@x.com");
    }

    #[tokio::test]
    async fn subscriber_outage_degrades_to_oncall_only() {
        let mut directory = MockDirectory::new(&[("r@x.com", "r@x.com")], &["sub@x.com"]);
        directory.fail_subscribers = true;
        let oncall = MockOnCall::new(vec![entry("r@x.com", &["high"], &["north"])]);
        let (resolver, _) = resolver(directory, oncall);

        let recipients = resolver.resolve(&alert(), "org").await;
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].group, RecipientGroup::Oncall);
    }

    #[tokio::test]
    async fn oncall_outage_degrades_to_subscribers_only() {
        let directory = MockDirectory::new(&[], &["sub@x.com"]);
        let mut oncall = MockOnCall::new(vec![entry("r@x.com", &["high"], &["north"])]);
        oncall.fail = true;
        let (resolver, _) = resolver(directory, oncall);

        let recipients = resolver.resolve(&alert(), "org").await;
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].email, "sub@x.com");
        assert_eq!(recipients[0].group, RecipientGroup::Regular);
    }
}
