//! Executor error types

use crate::bridge::BridgeError;
use crate::engine::validator::ValidationError;
use crate::workflow::action::ActionError;
use crate::workflow::expressions::ExpressionError;

/// Errors that can occur during workflow execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Expression error: {0}")]
    ExpressionError(#[from] ExpressionError),

    #[error("Bridge error: {0}")]
    BridgeError(#[from] BridgeError),

    #[error("{0}")]
    UnknownAction(#[from] ActionError),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Expected status {expected}, but got {actual} from {endpoint}: {body}")]
    StatusMismatch {
        expected: u16,
        actual: u16,
        endpoint: String,
        body: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<ExecutorError>,
    },
}

impl ExecutorError {
    /// Whether another attempt of the same step could succeed. Configuration
    /// problems fail the step at once.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutorError::UnknownAction(_)
            | ExecutorError::MissingParameter(_)
            | ExecutorError::InvalidParameter(_)
            | ExecutorError::ConfigError(_)
            | ExecutorError::ExpressionError(_)
            | ExecutorError::ParseError(_)
            | ExecutorError::JsonError(_) => false,
            ExecutorError::BridgeError(e) => e.is_retryable(),
            ExecutorError::Step { source, .. } => source.is_retryable(),
            _ => true,
        }
    }

    /// Label this error with the step it came from
    pub fn in_step(self, step: impl Into<String>) -> Self {
        ExecutorError::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, past any step label
    pub fn root(&self) -> &ExecutorError {
        match self {
            ExecutorError::Step { source, .. } => source.root(),
            other => other,
        }
    }
}
