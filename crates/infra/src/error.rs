use thiserror::Error;

use hotelpos_observability::ParseLogFormatError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    LogFormat(#[from] ParseLogFormatError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
}
