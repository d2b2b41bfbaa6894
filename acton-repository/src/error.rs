//! Error types

use thiserror::Error;

use crate::repository::RepositoryError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for repositories, stores and caches
#[derive(Debug, Error)]
pub enum Error {
    /// The container produced something that is not a query handle for the
    /// repository's model
    #[error("Given binding ({0}) must resolve to a query handle for its model")]
    EntityType(String),

    /// The container could not build a binding
    #[error("Unable to resolve binding: {0}")]
    BindingResolution(String),

    /// A query referenced a relation the model does not declare
    #[error("Call to undefined relationship [{relation}] on table [{table}]")]
    RelationNotFound {
        /// Table the relation was looked up on
        table: String,
        /// Relation name
        relation: String,
    },

    /// Structured repository error with operation context
    #[error("{0}")]
    Repository(RepositoryError),

    /// The query could not be executed as written
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Transaction begin/commit/rollback misuse
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Database error
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(Box<sqlx::Error>),

    /// Redis error
    #[cfg(feature = "cache")]
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// Cache backend error that carries no richer type
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error reports a missing row
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_not_found())
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        Error::Repository(err)
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(Box::new(err))
    }
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Redis(Box::new(err))
    }
}
