use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdcError>;

#[derive(Debug, Error)]
pub enum CdcError {
    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl From<sqlx::Error> for CdcError {
    fn from(err: sqlx::Error) -> Self {
        CdcError::Database(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for CdcError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        CdcError::Kafka(err.to_string())
    }
}
