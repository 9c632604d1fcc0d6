//! Action log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::execution::ExecutionId;
use crate::error::{Result, TaskloopError};

/// Unique action identifier.
pub type ActionId = Uuid;

/// Kind of tool invocation an action records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ActionType {
    Read,
    List,
    Write,
    Edit,
    Delete,
    Command,
    CompleteTask,
    AskQuestion,
}

/// Action lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionStatus {
    Proposed,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
}

impl ActionStatus {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        use ActionStatus::{Approved, Completed, Executing, Failed, Proposed, Rejected};
        self == next
            || matches!(
                (self, next),
                (Proposed, Approved)
                    | (Proposed, Rejected)
                    | (Approved, Rejected)
                    | (Rejected, Approved)
                    | (Approved, Executing)
                    | (Approved, Failed)
                    | (Executing, Completed)
                    | (Executing, Failed)
            )
    }
}

/// Outcome of running an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// The text handed back to the model for this result.
    pub fn model_text(&self) -> String {
        match (&self.output, &self.error) {
            (_, Some(error)) if !self.success => format!("Error: {error}"),
            (Some(output), _) => output.clone(),
            _ => String::new(),
        }
    }
}

/// A proposed or executed tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: ActionId,
    pub execution_id: ExecutionId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub params: serde_json::Value,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl Action {
    pub fn set_status(&mut self, next: ActionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskloopError::InvalidState(format!(
                "action {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next == ActionStatus::Executing {
            self.executed_at = Some(now);
        }
        Ok(())
    }

    /// Record a final result and the matching status.
    pub fn finish(&mut self, result: ActionResult) -> Result<()> {
        let status = if result.success {
            ActionStatus::Completed
        } else {
            ActionStatus::Failed
        };
        self.set_status(status)?;
        self.result = Some(result);
        Ok(())
    }
}

/// Fields supplied when appending an action; the store assigns id, sequence
/// and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub execution_id: ExecutionId,
    pub action_type: ActionType,
    pub params: serde_json::Value,
    pub status: ActionStatus,
    pub result: Option<ActionResult>,
}

impl NewAction {
    pub fn proposed(
        execution_id: ExecutionId,
        action_type: ActionType,
        params: serde_json::Value,
    ) -> Self {
        Self {
            execution_id,
            action_type,
            params,
            status: ActionStatus::Proposed,
            result: None,
        }
    }

    pub fn finished(
        execution_id: ExecutionId,
        action_type: ActionType,
        params: serde_json::Value,
        result: ActionResult,
    ) -> Self {
        let status = if result.success {
            ActionStatus::Completed
        } else {
            ActionStatus::Failed
        };
        Self {
            execution_id,
            action_type,
            params,
            status,
            result: Some(result),
        }
    }

    pub fn into_action(self, sequence: u64) -> Action {
        let now = Utc::now();
        let executed_at = self.status.is_final().then_some(now);
        Action {
            id: Uuid::new_v4(),
            execution_id: self.execution_id,
            action_type: self.action_type,
            params: self.params,
            status: self.status,
            result: self.result,
            sequence,
            created_at: now,
            updated_at: now,
            executed_at,
        }
    }
}
