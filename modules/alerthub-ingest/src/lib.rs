//! Organization ingestion service: HTTP submissions in, deduplicated
//! publishes out.

use std::sync::Arc;

use alerthub_broker::AlertPublisher;
use alerthub_store::AlertStore;

pub mod ingest;
pub mod rest;

pub struct AppState {
    pub store: AlertStore,
    pub publisher: Arc<dyn AlertPublisher>,
    pub org_routing_key: String,
}
