//! Clarifying questions asked by the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::execution::ExecutionId;

/// Unique question identifier.
pub type QuestionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
}

/// A question the agent asked while analyzing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub execution_id: ExecutionId,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
}

impl Question {
    pub fn new(
        execution_id: ExecutionId,
        question: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            question: question.into(),
            context,
            response: None,
            status: QuestionStatus::Pending,
            created_at: Utc::now(),
            answered_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QuestionStatus::Pending
    }

    pub fn answer(&mut self, response: impl Into<String>) {
        self.response = Some(response.into());
        self.status = QuestionStatus::Answered;
        self.answered_at = Some(Utc::now());
    }
}
