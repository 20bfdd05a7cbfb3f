//! Error types for the model layer.

use remdoc_client::ClientError;
use remdoc_protocol::Key;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised synchronously by models, entities and the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// No model is registered for the kind.
    #[error("unknown model kind: {0}")]
    UnknownKind(String),

    /// The entity was deleted and can no longer be read or updated.
    #[error("entity {0} was deleted")]
    Deleted(Key),

    /// Session or validation failure.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<remdoc_protocol::ValidationError> for ModelError {
    fn from(error: remdoc_protocol::ValidationError) -> Self {
        ModelError::Client(error.into())
    }
}
