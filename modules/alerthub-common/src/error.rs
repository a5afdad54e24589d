use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertHubError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Poison message: {0}")]
    PoisonMessage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
