//! Task and project records owned by the surrounding application.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    PendingValidation,
    Done,
}

/// The unit of work an execution runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Project settings as persisted. Settings columns hold raw JSON text and are
/// parsed into typed values with fallback-to-default at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub working_directory: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_settings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_limits: Option<String>,
}

impl Project {
    pub fn new(id: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            working_directory: working_directory.into(),
            approval_settings: None,
            sandbox_limits: None,
        }
    }

    pub fn with_approval_settings(mut self, raw: impl Into<String>) -> Self {
        self.approval_settings = Some(raw.into());
        self
    }

    pub fn with_sandbox_limits(mut self, raw: impl Into<String>) -> Self {
        self.sandbox_limits = Some(raw.into());
        self
    }
}
