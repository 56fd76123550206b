//! Error types for the quarry-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Specification errors raised while preparing a query pass through
//! unchanged as [`StoreError::Specification`].

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The specification itself was rejected.
    #[error(transparent)]
    Specification(#[from] quarry_spec::SpecError),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    // -- Translation --------------------------------------------------------
    /// A native closure term reached the SQL translator.
    #[error("{term} on `{entity}` is a native closure and cannot be translated to SQL")]
    Untranslatable {
        entity: &'static str,
        term: &'static str,
    },

    /// A term referenced a column the entity does not declare.
    #[error("unknown column `{column}` on `{entity}`")]
    UnknownColumn { entity: &'static str, column: String },

    /// An include path the entity cannot load.
    #[error("unknown navigation `{path}` on `{entity}`")]
    UnknownNavigation { entity: &'static str, path: String },

    // -- Configuration ------------------------------------------------------
    /// The configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Reading a file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
