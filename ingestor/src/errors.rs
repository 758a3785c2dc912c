use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("{source}")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Body was not a JSON document. The parser detail is kept for logs only.
    #[error("Invalid JSON data")]
    InvalidPayload(String),

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("No fields given for table {0}")]
    EmptyFields(String),

    #[error("Transaction error: {0}")]
    Transaction(&'static str),

    #[error("Unsupported database backend: {0}")]
    UnsupportedBackend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
