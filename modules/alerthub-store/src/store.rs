use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use alerthub_common::{ChangeClass, NormalizedAlert, OnCallEntry};

// ---------------------------------------------------------------------------
// AlertStore
// ---------------------------------------------------------------------------

/// Dedup store over the multi-tenant schema. Cheap to clone; shares the pool.
#[derive(Clone)]
pub struct AlertStore {
    pool: PgPool,
}

/// Collapse interior whitespace runs so lookups don't fork on formatting.
pub fn clean_org_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl AlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // --- Organizations ---

    /// Idempotent organization provisioning. Returns the id and whether the
    /// organization already existed.
    pub async fn ensure_organization(&self, name: &str) -> Result<(Uuid, bool)> {
        let clean = clean_org_name(name);
        let inserted = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO organizations (organization_id, organization_name)
            VALUES ($1, $2)
            ON CONFLICT (organization_name) DO NOTHING
            RETURNING organization_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&clean)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            return Ok((id, false));
        }

        let (id,) = sqlx::query_as::<_, (Uuid,)>(
            "SELECT organization_id FROM organizations WHERE organization_name = $1",
        )
        .bind(&clean)
        .fetch_one(&self.pool)
        .await?;
        Ok((id, true))
    }

    pub async fn organization_id(&self, name: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            "SELECT organization_id FROM organizations WHERE organization_name = $1",
        )
        .bind(clean_org_name(name))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn list_organizations(&self) -> Result<Vec<(Uuid, String)>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT organization_id, organization_name FROM organizations ORDER BY organization_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // --- Upserts ---

    /// Upsert an organization-scoped alert, keyed by
    /// `(organization_id, category, area, headline)`.
    ///
    /// One statement: the conflict target serializes racing writers, the
    /// DO UPDATE WHERE clause compares the mutable fields, and `xmax = 0`
    /// distinguishes a fresh insert from an update of an existing row.
    pub async fn upsert_org_alert(
        &self,
        organization_id: Uuid,
        alert: &NormalizedAlert,
    ) -> Result<ChangeClass> {
        let alert = alert.clone().normalized();
        let area = alert
            .area
            .as_deref()
            .ok_or_else(|| anyhow!("organization alert is missing an area"))?;

        let row = sqlx::query_as::<_, (bool,)>(
            r#"
            INSERT INTO org_alerts (organization_id, category, area, headline, description,
                                    instruction, effective_from, effective_until,
                                    severity, urgency, certainty)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (organization_id, category, area, headline) DO UPDATE SET
                description = EXCLUDED.description,
                instruction = EXCLUDED.instruction,
                effective_from = EXCLUDED.effective_from,
                effective_until = EXCLUDED.effective_until,
                severity = EXCLUDED.severity,
                urgency = EXCLUDED.urgency,
                certainty = EXCLUDED.certainty,
                updated_at = now()
            WHERE (org_alerts.description, org_alerts.instruction, org_alerts.effective_from,
                   org_alerts.effective_until, org_alerts.severity, org_alerts.urgency)
                  IS DISTINCT FROM
                  (EXCLUDED.description, EXCLUDED.instruction, EXCLUDED.effective_from,
                   EXCLUDED.effective_until, EXCLUDED.severity, EXCLUDED.urgency)
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(organization_id)
        .bind(&alert.category)
        .bind(area)
        .bind(&alert.headline)
        .bind(&alert.description)
        .bind(&alert.instruction)
        .bind(alert.effective_from)
        .bind(alert.effective_until)
        .bind(&alert.severity)
        .bind(&alert.urgency)
        .bind(&alert.certainty)
        .fetch_optional(&self.pool)
        .await?;

        Ok(classify(row))
    }

    /// Upsert a public-feed alert, keyed by
    /// `(identifier, language, category, effective_from)`.
    pub async fn upsert_feed_alert(&self, alert: &NormalizedAlert) -> Result<ChangeClass> {
        let alert = alert.clone().normalized();
        let identifier = alert
            .identifier
            .as_deref()
            .ok_or_else(|| anyhow!("feed alert is missing an identifier"))?;
        let language = alert
            .language
            .as_deref()
            .ok_or_else(|| anyhow!("feed alert is missing a language"))?;
        let effective_from = alert
            .effective_from
            .ok_or_else(|| anyhow!("feed alert is missing effective_from"))?;

        let row = sqlx::query_as::<_, (bool,)>(
            r#"
            INSERT INTO feed_alerts (identifier, language, category, effective_from, area,
                                     headline, description, instruction, effective_until,
                                     severity, urgency, certainty)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (identifier, language, category, effective_from) DO UPDATE SET
                area = EXCLUDED.area,
                headline = EXCLUDED.headline,
                description = EXCLUDED.description,
                instruction = EXCLUDED.instruction,
                effective_until = EXCLUDED.effective_until,
                severity = EXCLUDED.severity,
                urgency = EXCLUDED.urgency,
                certainty = EXCLUDED.certainty,
                updated_at = now()
            WHERE (feed_alerts.description, feed_alerts.instruction, feed_alerts.effective_until,
                   feed_alerts.severity, feed_alerts.urgency)
                  IS DISTINCT FROM
                  (EXCLUDED.description, EXCLUDED.instruction, EXCLUDED.effective_until,
                   EXCLUDED.severity, EXCLUDED.urgency)
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(identifier)
        .bind(language)
        .bind(&alert.category)
        .bind(effective_from)
        .bind(&alert.area)
        .bind(&alert.headline)
        .bind(&alert.description)
        .bind(&alert.instruction)
        .bind(alert.effective_until)
        .bind(&alert.severity)
        .bind(&alert.urgency)
        .bind(&alert.certainty)
        .fetch_optional(&self.pool)
        .await?;

        Ok(classify(row))
    }

    // --- On-call schedule ---

    /// Insert on-call entries, skipping exact duplicates. Returns one
    /// outcome per entry in input order.
    pub async fn insert_oncall_schedule(
        &self,
        organization_id: Uuid,
        entries: &[OnCallEntry],
    ) -> Result<Vec<ScheduleOutcome>> {
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            let levels = serde_json::to_value(&entry.levels)?;
            let areas = serde_json::to_value(&entry.areas)?;

            let existing = sqlx::query_as::<_, (i64,)>(
                r#"
                SELECT id FROM oncall_entries
                WHERE organization_id = $1
                  AND responder_email = $2
                  AND active_from = $3
                  AND active_until = $4
                  AND levels = $5
                  AND areas = $6
                "#,
            )
            .bind(organization_id)
            .bind(&entry.responder_email)
            .bind(entry.active_from)
            .bind(entry.active_until)
            .bind(&levels)
            .bind(&areas)
            .fetch_optional(&self.pool)
            .await?;

            if existing.is_some() {
                results.push(ScheduleOutcome {
                    responder_email: entry.responder_email.clone(),
                    status: ScheduleStatus::Exists,
                });
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO oncall_entries (organization_id, responder_email, active_from,
                                            active_until, levels, areas)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(organization_id)
            .bind(&entry.responder_email)
            .bind(entry.active_from)
            .bind(entry.active_until)
            .bind(&levels)
            .bind(&areas)
            .execute(&self.pool)
            .await?;

            results.push(ScheduleOutcome {
                responder_email: entry.responder_email.clone(),
                status: ScheduleStatus::Inserted,
            });
        }

        Ok(results)
    }

    /// On-call entries active at `now` for this organization whose `areas`
    /// cover the given area.
    pub async fn active_oncall(
        &self,
        organization_id: Uuid,
        area: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OnCallEntry>> {
        let rows = sqlx::query_as::<
            _,
            (
                String,
                DateTime<Utc>,
                DateTime<Utc>,
                serde_json::Value,
                serde_json::Value,
            ),
        >(
            r#"
            SELECT responder_email, active_from, active_until, levels, areas
            FROM oncall_entries
            WHERE organization_id = $1
              AND $2 BETWEEN active_from AND active_until
            "#,
        )
        .bind(organization_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::new();
        for (responder_email, active_from, active_until, levels, areas) in rows {
            let entry = OnCallEntry {
                responder_email,
                active_from,
                active_until,
                levels: serde_json::from_value(levels)?,
                areas: serde_json::from_value(areas)?,
            };
            if entry.areas.iter().any(|a| a == area) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    // --- Queries ---

    /// Historical organization alerts with optional filters.
    pub async fn org_alert_history(
        &self,
        organization_id: Uuid,
        filter: &HistoryFilter,
    ) -> Result<Vec<OrgAlertRow>> {
        let rows = sqlx::query_as::<_, OrgAlertRow>(
            r#"
            SELECT id, organization_id, category, area, headline, description, instruction,
                   effective_from, effective_until, severity, urgency, certainty,
                   created_at, updated_at
            FROM org_alerts
            WHERE organization_id = $1
              AND ($2::text IS NULL OR area = $2)
              AND ($3::timestamptz IS NULL OR effective_from >= $3)
              AND ($4::timestamptz IS NULL OR effective_until <= $4)
              AND ($5::text IS NULL OR urgency = $5)
            ORDER BY created_at DESC
            "#,
        )
        .bind(organization_id)
        .bind(&filter.area)
        .bind(filter.effective_from)
        .bind(filter.effective_until)
        .bind(&filter.urgency)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Organization alerts still in their validity window for any of the
    /// given areas.
    pub async fn active_org_alerts(
        &self,
        organization_id: Uuid,
        areas: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<OrgAlertRow>> {
        let rows = sqlx::query_as::<_, OrgAlertRow>(
            r#"
            SELECT id, organization_id, category, area, headline, description, instruction,
                   effective_from, effective_until, severity, urgency, certainty,
                   created_at, updated_at
            FROM org_alerts
            WHERE organization_id = $1
              AND area = ANY($2)
              AND effective_until >= $3
            ORDER BY effective_until ASC
            "#,
        )
        .bind(organization_id)
        .bind(areas)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Public-feed alerts still in their validity window for any of the
    /// given areas.
    pub async fn active_feed_alerts(
        &self,
        areas: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<FeedAlertRow>> {
        let rows = sqlx::query_as::<_, FeedAlertRow>(
            r#"
            SELECT id, identifier, language, category, effective_from, area, headline,
                   description, instruction, effective_until, severity, urgency, certainty,
                   created_at, updated_at
            FROM feed_alerts
            WHERE area = ANY($1)
              AND effective_until >= $2
            ORDER BY effective_until ASC
            "#,
        )
        .bind(areas)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Map the upsert's RETURNING row to a change classification: no row means
/// the DO UPDATE WHERE clause found nothing different.
fn classify(row: Option<(bool,)>) -> ChangeClass {
    match row {
        Some((true,)) => ChangeClass::Inserted,
        Some((false,)) => ChangeClass::Updated,
        None => ChangeClass::DuplicateNoChange,
    }
}

// ---------------------------------------------------------------------------
// Rows & filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub area: Option<String>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
    pub urgency: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrgAlertRow {
    pub id: i64,
    pub organization_id: Uuid,
    pub category: String,
    pub area: String,
    pub headline: String,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FeedAlertRow {
    pub id: i64,
    pub identifier: String,
    pub language: String,
    pub category: String,
    pub effective_from: DateTime<Utc>,
    pub area: Option<String>,
    pub headline: String,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub effective_until: Option<DateTime<Utc>>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Inserted,
    Exists,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutcome {
    pub responder_email: String,
    pub status: ScheduleStatus,
}
