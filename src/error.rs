//! Error types for the knowledge graph engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Graph query error: {0}")]
    QueryError(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors the pipeline may skip over for a single relationship write.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NodeNotFound(_) | Error::Timeout(_) | Error::QueryError(_)
        )
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::QueryError(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for Error {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Error::EmbeddingError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
