//! Idempotent schema setup, run by each service at startup.

use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tracing::{info, warn};

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        organization_id   UUID         PRIMARY KEY,
        organization_name TEXT         UNIQUE NOT NULL,
        created_at        TIMESTAMPTZ  NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS org_alerts (
        id               BIGSERIAL    PRIMARY KEY,
        organization_id  UUID         NOT NULL REFERENCES organizations(organization_id),
        category         TEXT         NOT NULL,
        area             TEXT         NOT NULL,
        headline         TEXT         NOT NULL,
        description      TEXT,
        instruction      TEXT,
        effective_from   TIMESTAMPTZ,
        effective_until  TIMESTAMPTZ,
        severity         TEXT,
        urgency          TEXT,
        certainty        TEXT,
        created_at       TIMESTAMPTZ  NOT NULL DEFAULT now(),
        updated_at       TIMESTAMPTZ  NOT NULL DEFAULT now(),
        UNIQUE (organization_id, category, area, headline)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feed_alerts (
        id              BIGSERIAL    PRIMARY KEY,
        identifier      TEXT         NOT NULL,
        language        TEXT         NOT NULL,
        category        TEXT         NOT NULL,
        effective_from  TIMESTAMPTZ  NOT NULL,
        area            TEXT,
        headline        TEXT         NOT NULL,
        description     TEXT,
        instruction     TEXT,
        effective_until TIMESTAMPTZ,
        severity        TEXT,
        urgency         TEXT,
        certainty       TEXT,
        created_at      TIMESTAMPTZ  NOT NULL DEFAULT now(),
        updated_at      TIMESTAMPTZ  NOT NULL DEFAULT now(),
        UNIQUE (identifier, language, category, effective_from)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oncall_entries (
        id              BIGSERIAL    PRIMARY KEY,
        organization_id UUID         NOT NULL REFERENCES organizations(organization_id),
        responder_email TEXT         NOT NULL,
        active_from     TIMESTAMPTZ  NOT NULL,
        active_until    TIMESTAMPTZ  NOT NULL,
        levels          JSONB        NOT NULL,
        areas           JSONB        NOT NULL,
        created_at      TIMESTAMPTZ  NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_org_alerts_org_area ON org_alerts(organization_id, area)",
    "CREATE INDEX IF NOT EXISTS idx_org_alerts_effective_until ON org_alerts(effective_until)",
    "CREATE INDEX IF NOT EXISTS idx_feed_alerts_identifier ON feed_alerts(identifier)",
    "CREATE INDEX IF NOT EXISTS idx_feed_alerts_effective_until ON feed_alerts(effective_until)",
    "CREATE INDEX IF NOT EXISTS idx_feed_alerts_area ON feed_alerts(area)",
    "CREATE INDEX IF NOT EXISTS idx_oncall_entries_org ON oncall_entries(organization_id)",
];

/// Create tables and indexes if they don't exist.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database schema ensured");
    Ok(())
}

/// Connect to Postgres and run migrations, waiting for the database to come
/// up. Gives up after ten attempts.
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool> {
    let mut last_err = None;
    for attempt in 1..=10u32 {
        match PgPool::connect(database_url).await {
            Ok(pool) => match migrate(&pool).await {
                Ok(()) => return Ok(pool),
                Err(e) => {
                    warn!(attempt, error = %e, "Migration failed, retrying");
                    last_err = Some(e);
                }
            },
            Err(e) => {
                warn!(attempt, error = %e, "Database not ready, retrying");
                last_err = Some(e.into());
            }
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("database never became ready")))
}
