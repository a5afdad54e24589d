//! Client for the user-directory service (GraphQL over HTTP).
//!
//! The directory owns identity, roles and region/alert subscriptions. Every
//! query is retried a bounded number of times; callers decide whether an
//! exhausted retry budget is fatal (for the fan-out path it never is).

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub region: Vec<String>,
    #[serde(default)]
    pub alerts: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
}

pub struct DirectoryClient {
    endpoint: String,
    http: reqwest::Client,
}

impl DirectoryClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Resolve a user by directory id.
    pub async fn user(&self, id: &str) -> Result<Option<DirectoryUser>> {
        let query = r#"
            query($id: String!) {
              user(id: $id) {
                id
                email
                phoneNumber
                region
                alerts
                role
              }
            }
        "#;
        let data = self.graphql(query, json!({ "id": id })).await?;
        Ok(decode_field(&data, "user")?)
    }

    /// Resolve a user by contact email.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<DirectoryUser>> {
        let query = r#"
            query($email: String!) {
              userByEmail(email: $email) {
                id
                email
                phoneNumber
                region
                alerts
                role
              }
            }
        "#;
        let data = self.graphql(query, json!({ "email": email })).await?;
        Ok(decode_field(&data, "userByEmail")?)
    }

    /// Regular subscribers matching an organization, region and severity
    /// level.
    pub async fn subscribers(
        &self,
        company: &str,
        region: &str,
        level: &str,
    ) -> Result<Vec<DirectoryUser>> {
        let query = r#"
            query($company: String!, $region: String!, $level: String!) {
              usersByCompanyAlert(company: $company, region: $region, level: $level) {
                id
                email
                phoneNumber
              }
            }
        "#;
        let data = self
            .graphql(
                query,
                json!({ "company": company, "region": region, "level": level }),
            )
            .await?;
        let users: Option<Vec<DirectoryUser>> = decode_field(&data, "usersByCompanyAlert")?;
        Ok(users.unwrap_or_default())
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let mut last_err = None;
        for attempt in 1..=ATTEMPTS {
            match self.post(query, &variables).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!(attempt, error = %e, "User directory query failed");
                    last_err = Some(e);
                }
            }
            if attempt < ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        Err(last_err.expect("at least one attempt"))
    }

    async fn post(&self, query: &str, variables: &Value) -> Result<Value> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("user directory returned {status}"));
        }

        let body: Value = response.json().await?;
        body.get("data")
            .cloned()
            .ok_or_else(|| anyhow!("user directory response has no data"))
    }
}

fn decode_field<T: serde::de::DeserializeOwned>(data: &Value, field: &str) -> Result<Option<T>> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_field_handles_null_and_missing() {
        let data = json!({ "user": null });
        let user: Option<DirectoryUser> = decode_field(&data, "user").unwrap();
        assert!(user.is_none());

        let user: Option<DirectoryUser> = decode_field(&data, "userByEmail").unwrap();
        assert!(user.is_none());
    }

    #[test]
    fn decode_field_parses_partial_user() {
        // subscribers query selects only a subset of fields
        let data = json!({
            "usersByCompanyAlert": [
                { "email": "a@x.com", "phoneNumber": "+386000" },
                { "email": "b@x.com" }
            ]
        });
        let users: Option<Vec<DirectoryUser>> =
            decode_field(&data, "usersByCompanyAlert").unwrap();
        let users = users.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email, "a@x.com");
        assert!(users[1].phone_number.is_none());
    }
}
