//! Error types for taskloop.

use std::path::PathBuf;

use thiserror::Error;

use crate::sandbox::limits::LimitType;

/// Broad error category used to route failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Budget,
    Sandbox,
    ToolExecution,
    Provider,
    Timeout,
    State,
    Storage,
    Configuration,
    Serialization,
    Unknown,
}

/// Primary error type for all orchestrator operations.
#[derive(Error, Debug)]
pub enum TaskloopError {
    #[error("Sandbox limit exceeded: {limit_type} (limit {limit_value}, current {current_value})")]
    LimitExceeded {
        limit_type: LimitType,
        limit_value: u64,
        current_value: u64,
    },

    #[error("Path '{requested}' escapes working directory {}", root.display())]
    PathTraversal { requested: String, root: PathBuf },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl TaskloopError {
    /// Shorthand for a tool failure.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a provider failure.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::LimitExceeded { .. } => ErrorCategory::Budget,
            Self::PathTraversal { .. } => ErrorCategory::Sandbox,
            Self::ToolExecution { .. } | Self::InvalidArgument(_) | Self::Io(_) => {
                ErrorCategory::ToolExecution
            }
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::InvalidState(_) | Self::NotFound(_) => ErrorCategory::State,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Configuration(_) | Self::TomlParse(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether this error ends the current activation.
    ///
    /// Tool-level failures (bad arguments, escaped paths, executor errors) are
    /// reported back to the model instead.
    pub fn is_fatal_to_activation(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::ToolExecution | ErrorCategory::Sandbox
        )
    }

    /// The exceeded budget, if this is a limit failure.
    pub fn limit_exceeded(&self) -> Option<(LimitType, u64, u64)> {
        match self {
            Self::LimitExceeded {
                limit_type,
                limit_value,
                current_value,
            } => Some((*limit_type, *limit_value, *current_value)),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TaskloopError>;
