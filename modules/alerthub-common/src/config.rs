use std::env;

/// Application configuration loaded from environment variables.
/// Each service constructor reads only what that service needs.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Broker
    pub amqp_url: String,
    pub alerts_exchange: String,
    pub feed_routing_key: String,
    pub org_routing_key: String,
    pub alerts_queue: String,

    // Web server
    pub http_host: String,
    pub http_port: u16,

    // Collaborators
    pub users_service_url: String,
    pub ingest_base_url: String,
    pub notify_url: Option<String>,
    pub notify_token: Option<String>,

    // Upstream feed
    pub feed_base_url: String,
    pub feed_regions: Vec<String>,
    /// Only variants in this language are published for fan-out; the other
    /// language variants of the same alert are persisted but stay local.
    pub feed_publish_language: String,
}

impl Config {
    /// Config for the public-feed sync service.
    pub fn feed_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            amqp_url: required_env("AMQP_URL"),
            feed_base_url: required_env("FEED_BASE_URL"),
            feed_regions: env::var("FEED_REGIONS")
                .unwrap_or_else(|_| {
                    "SOUTH-WEST,SOUTH-EAST,MIDDLE,NORTH-EAST,NORTH-WEST".to_string()
                })
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            ..Self::broker_defaults()
        }
    }

    /// Config for the organization ingestion service.
    pub fn ingest_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            amqp_url: required_env("AMQP_URL"),
            ..Self::broker_defaults()
        }
    }

    /// Config for the fan-out service.
    pub fn fanout_from_env() -> Self {
        Self {
            amqp_url: required_env("AMQP_URL"),
            users_service_url: required_env("USERS_SERVICE_URL"),
            ingest_base_url: required_env("INGEST_BASE_URL"),
            notify_url: env::var("NOTIFY_URL").ok().filter(|u| !u.is_empty()),
            notify_token: env::var("NOTIFY_TOKEN").ok().filter(|t| !t.is_empty()),
            ..Self::broker_defaults()
        }
    }

    fn broker_defaults() -> Self {
        Self {
            database_url: String::new(),
            amqp_url: String::new(),
            alerts_exchange: env::var("ALERTS_EXCHANGE").unwrap_or_else(|_| "alerts".to_string()),
            feed_routing_key: env::var("FEED_ROUTING_KEY").unwrap_or_else(|_| "feed".to_string()),
            org_routing_key: env::var("ORG_ROUTING_KEY").unwrap_or_else(|_| "org".to_string()),
            alerts_queue: env::var("ALERTS_QUEUE").unwrap_or_else(|_| "alerts_queue".to_string()),
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("HTTP_PORT must be a number"),
            users_service_url: String::new(),
            ingest_base_url: String::new(),
            notify_url: None,
            notify_token: None,
            feed_base_url: String::new(),
            feed_regions: Vec::new(),
            feed_publish_language: env::var("FEED_PUBLISH_LANGUAGE")
                .unwrap_or_else(|_| "sl".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
