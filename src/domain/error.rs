use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("payload has no data object")]
    MissingData,

    #[error("payload data has no payment id")]
    MissingPaymentId,

    #[error("could not acquire lock {key} within timeout")]
    LockTimeout { key: String },

    /// Upstream API failure. The message is the provider's own, untranslated.
    #[error("{0}")]
    Provider(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Lock contention is an expected outcome, callers retry or skip.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
