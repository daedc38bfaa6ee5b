//! Error types.

use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Datastore errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Datastore unavailable: {0}")]
    Unavailable(String),
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(err.to_string())
    }
}

/// Chat-session transport and notification errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Send failed on {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("No chat session attached to ticket {ticket_id}")]
    NoSession { ticket_id: i64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure while replaying a single ticket.
///
/// Always isolated to the ticket it happened on.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Replay timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure that aborts a whole scan pass.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to fetch candidate tickets: {0}")]
    CandidateFetch(#[source] DatabaseError),
}
