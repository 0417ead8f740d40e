//! Error types for the mapping layer
//!
//! Every fallible operation in the crate returns [`ModelResult`]. Hook
//! failures keep their original [`HookError`] value so callers can match on
//! exactly what the hook returned.

use crate::hooks::HookError;

/// Result type alias for mapper operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Error types for mapper operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The query executor reported a failure
    #[error("Database error: {0}")]
    Database(String),

    /// A single-record fetch found zero rows, or a write affected none
    #[error("Record not found in '{0}'")]
    NotFound(String),

    /// An attribute value was rejected by the schema rules
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Primary key is missing or invalid
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    /// A relation name does not resolve to a relation
    #[error("Relation configuration error: {0}")]
    RelationConfiguration(String),

    /// A relation was used outside of its contract
    #[error("Relationship error: {0}")]
    Relationship(String),

    /// A pre or post hook failed
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Query description error
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Returns the hook error when this error came out of the hook pipeline
    pub fn as_hook_error(&self) -> Option<&HookError> {
        match self {
            ModelError::Hook(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_))
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ModelError {
    fn from(err: serde_yaml::Error) -> Self {
        ModelError::Configuration(err.to_string())
    }
}
