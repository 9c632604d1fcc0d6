//! Execution record and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{Result, TaskloopError};

/// Unique execution identifier.
pub type ExecutionId = Uuid;

/// Execution lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Analyzing,
    AwaitingApproval,
    AwaitingQuestion,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::{
            Analyzing, AwaitingApproval, AwaitingQuestion, Cancelled, Completed, Executing, Failed,
            Pending,
        };
        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Analyzing)
                | (Pending, Failed)
                | (Analyzing, AwaitingQuestion)
                | (Analyzing, AwaitingApproval)
                | (Analyzing, Failed)
                | (Analyzing, Completed)
                | (AwaitingQuestion, Analyzing)
                | (AwaitingApproval, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }
}

/// One end-to-end run of the agent against a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    pub task_id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            status: ExecutionStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(TaskloopError::InvalidState(format!(
                "execution {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Move to `failed` and record the reason.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(ExecutionStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
