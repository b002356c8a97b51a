//! Errors produced while consuming and mapping bus records.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("parsing event body failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("ContentURI does not contain a UUID")]
    MissingUuid,

    #[error("payload missing")]
    MissingPayload,

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("consumer lagging behind by {lag} messages (tolerance {tolerance})")]
    Lagging { lag: i64, tolerance: i64 },
}
