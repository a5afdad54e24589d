//! Postgres-backed alert store.
//!
//! Single multi-tenant schema: one `org_alerts` table for every organization
//! and one `feed_alerts` table for the public feed, each carrying its
//! identity key as a UNIQUE constraint. Upserts classify what happened
//! (`inserted` / `updated` / `duplicate_no_change`) in one atomic statement,
//! which is what makes broker redelivery and racing ingesters safe.

pub mod migrate;
pub mod store;

pub use migrate::{connect_and_migrate, migrate};
pub use store::{
    AlertStore, FeedAlertRow, HistoryFilter, OrgAlertRow, ScheduleOutcome, ScheduleStatus,
};
