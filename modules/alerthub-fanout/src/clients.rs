//! HTTP collaborators: the ingest service (on-call schedule, active events)
//! and the user directory.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use alerthub_common::OnCallEntry;
use directory_client::DirectoryClient;

use crate::resolver::{DirectoryApi, OnCallApi};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client for the ingest service's query surface.
pub struct IngestClient {
    base_url: String,
    http: reqwest::Client,
}

impl IngestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Active on-call entries for an organization and area. An unknown
    /// organization means no entries, not an error.
    pub async fn active_oncall(
        &self,
        organization: &str,
        area: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OnCallEntry>> {
        let url = format!("{}/oncall/active", self.base_url);
        let now_param = now.to_rfc3339();
        let query = [
            ("organization_name", organization),
            ("area", area),
            ("now", now_param.as_str()),
        ];

        let mut last_err = None;
        for attempt in 1..=ATTEMPTS {
            match self.get(&url, &query).await {
                Ok(None) => return Ok(Vec::new()),
                Ok(Some(body)) => return Ok(serde_json::from_value(body)?),
                Err(e) => {
                    warn!(attempt, error = %e, "On-call query failed");
                    last_err = Some(e);
                }
            }
            if attempt < ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        Err(last_err.expect("at least one attempt"))
    }

    /// Active events for an organization (or the public feed) across areas.
    /// Passed through verbatim to the caller.
    pub async fn active_events(
        &self,
        organization: &str,
        areas: &[String],
        now: DateTime<Utc>,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/events/active", self.base_url);
        let areas_param = areas.join(",");
        let now_param = now.to_rfc3339();
        let query = [
            ("organization_name", organization),
            ("areas", areas_param.as_str()),
            ("now", now_param.as_str()),
        ];

        match self.get(&url, &query).await? {
            Some(body) => Ok(body),
            None => Ok(serde_json::json!([])),
        }
    }

    /// GET returning the JSON body, `None` on 404.
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<serde_json::Value>> {
        let response = self
            .http
            .get(url)
            .timeout(QUERY_TIMEOUT)
            .query(query)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("ingest service returned {status}"));
        }
        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl OnCallApi for IngestClient {
    async fn active_entries(
        &self,
        organization: &str,
        area: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OnCallEntry>> {
        self.active_oncall(organization, area, now).await
    }
}

#[async_trait]
impl DirectoryApi for DirectoryClient {
    async fn contact_by_email(&self, email: &str) -> Result<Option<String>> {
        Ok(self.user_by_email(email).await?.map(|user| user.email))
    }

    async fn subscriber_emails(
        &self,
        organization: &str,
        region: &str,
        level: &str,
    ) -> Result<Vec<String>> {
        let users = self.subscribers(organization, region, level).await?;
        Ok(users.into_iter().map(|user| user.email).collect())
    }
}
