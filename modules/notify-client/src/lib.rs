//! Client for the external notification provider.
//!
//! One call covers all recipients of an alert. The provider offers no retry
//! contract; a non-2xx status or transport fault is surfaced as an error and
//! the caller chooses what to do with it.

use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

pub struct NotifyClient {
    url: Option<String>,
    token: Option<String>,
    http: reqwest::Client,
}

impl NotifyClient {
    /// `url = None` disables dispatch entirely (logged no-op), which is how
    /// local environments run without a provider account.
    pub fn new(url: Option<String>, token: Option<String>) -> Self {
        Self {
            url,
            token,
            http: reqwest::Client::new(),
        }
    }

    pub async fn send(&self, notification: &Notification) -> Result<()> {
        let Some(url) = &self.url else {
            warn!("Notification provider disabled (no URL configured), dropping notification");
            return Ok(());
        };

        let mut request = self
            .http
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(notification);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Notification provider returned non-success");
            bail!("notification provider returned {status}");
        }

        info!(
            recipients = notification.recipients.len(),
            subject = %notification.subject,
            "Notification dispatched"
        );
        Ok(())
    }
}
