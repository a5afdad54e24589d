//! Notification dispatch: render a human-readable body and hand it to the
//! provider in one call covering all recipients.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use alerthub_common::{NormalizedAlert, Recipient};
use notify_client::{Notification, NotifyClient};

/// Provider seam, mirrored by a recording stand-in in tests.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

#[async_trait]
impl Notifier for NotifyClient {
    async fn send(&self, notification: &Notification) -> Result<()> {
        NotifyClient::send(self, notification).await
    }
}

pub struct Dispatcher {
    notify: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notify: Arc<dyn Notifier>) -> Self {
        Self { notify }
    }

    /// Submit one notification covering all recipients. Best-effort and
    /// non-transactional: the caller decides what a failure means.
    pub async fn dispatch(&self, alert: &NormalizedAlert, recipients: &[Recipient]) -> Result<()> {
        let notification = Notification {
            subject: subject(alert),
            body: body(alert),
            recipients: recipients.iter().map(|r| r.email.clone()).collect(),
        };
        self.notify.send(&notification).await
    }
}

pub fn subject(alert: &NormalizedAlert) -> String {
    format!("Alert: {}", alert.headline)
}

/// Labeled lines for the fields that are present; absent or blank fields are
/// omitted entirely rather than rendered as empty lines.
pub fn body(alert: &NormalizedAlert) -> String {
    let mut lines = vec!["You have received a new alert.".to_string(), String::new()];

    let mut add = |label: &str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            lines.push(format!("{label}: {value}"));
        }
    };

    add("Event", Some(alert.headline.clone()));
    add("Category", Some(alert.category.clone()));
    add("Area", alert.area.clone());
    add("Description", alert.description.clone());
    add("Instructions", alert.instruction.clone());
    add("Valid from", alert.effective_from.map(format_ts));
    add("Valid until", alert.effective_until.map(format_ts));
    add("Severity", alert.severity.clone());
    add("Urgency", alert.urgency.clone());

    lines.push(String::new());
    lines.push("— AlertHub".to_string());
    lines.join("\n")
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}
