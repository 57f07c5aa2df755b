//! Mapper error model.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Result type used across the mapping layer.
pub type MapperResult<T> = Result<T, MapperError>;

/// Failure reported by the store client or its transport.
///
/// These are never caught or retried by the mapper; they reach the caller as
/// [`MapperError::Store`] unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store transport failed: {0}")]
    Transport(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("store update failed: {0}")]
    Update(String),

    /// Writing to a batch sink failed.
    #[error("batch sink I/O failed: {0}")]
    Io(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        StoreError::Io(value.to_string())
    }
}

/// Mapper-level error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapperError {
    /// Save attempted on an invalid resource. Carries the full error map.
    #[error("object is not valid: {0}")]
    Validation(ValidationErrors),

    /// The identity strategy is misconfigured or failed.
    #[error("id generation failed: {0}")]
    IdGeneration(String),

    /// A state transition that the lifecycle forbids.
    #[error("illegal mutation: {0}")]
    IllegalMutation(String),

    /// Schema or collection misconfiguration.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MapperError {
    pub fn id_generation(msg: impl Into<String>) -> Self {
        Self::IdGeneration(msg.into())
    }

    pub fn illegal_mutation(msg: impl Into<String>) -> Self {
        Self::IllegalMutation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
