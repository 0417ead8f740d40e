use std::fmt;

/// Error returned by a lifecycle hook
#[derive(Debug, Clone, PartialEq)]
pub enum HookError {
    Validation {
        message: String,
        hint: Option<String>,
    },
    Rejected {
        message: String,
    },
    PropagationStopped {
        reason: String,
    },
    Failed {
        message: String,
    },
    /// A continuation hook dropped its continuation without completing
    Abandoned {
        operation: String,
    },
    /// A spawned hook task panicked
    Panicked {
        operation: String,
    },
}

impl HookError {
    pub fn validation(message: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn validation_with_hint(message: &str, hint: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    pub fn rejected(message: &str) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    pub fn propagation_stopped(reason: &str) -> Self {
        Self::PropagationStopped {
            reason: reason.to_string(),
        }
    }

    pub fn failed(message: &str) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }

    pub fn abandoned(operation: &str) -> Self {
        Self::Abandoned {
            operation: operation.to_string(),
        }
    }

    pub fn panicked(operation: &str) -> Self {
        Self::Panicked {
            operation: operation.to_string(),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Validation { message, hint } => {
                write!(f, "Validation error: {}", message)?;
                if let Some(hint) = hint {
                    write!(f, " (hint: {})", hint)?;
                }
                Ok(())
            }
            HookError::Rejected { message } => write!(f, "Hook rejected operation: {}", message),
            HookError::PropagationStopped { reason } => {
                write!(f, "Hook propagation stopped: {}", reason)
            }
            HookError::Failed { message } => write!(f, "Hook failed: {}", message),
            HookError::Abandoned { operation } => write!(
                f,
                "Hook for '{}' dropped its continuation without completing",
                operation
            ),
            HookError::Panicked { operation } => {
                write!(f, "Hook task for '{}' panicked", operation)
            }
        }
    }
}

impl std::error::Error for HookError {}

impl From<crate::error::ModelError> for HookError {
    fn from(err: crate::error::ModelError) -> Self {
        match err {
            crate::error::ModelError::Hook(inner) => inner,
            crate::error::ModelError::Validation { field, message } => Self::Validation {
                message: format!("{}: {}", field, message),
                hint: None,
            },
            other => Self::failed(&other.to_string()),
        }
    }
}
