//! Persistence seams for executions, the action and question logs, and the
//! task/project records the orchestrator reads.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Action, ActionId, ActionStatus, Execution, ExecutionId, ExecutionStatus, NewAction, Project,
    Question, QuestionId, QuestionStatus, Task, TaskStatus,
};

pub use memory::MemoryStore;

/// Storage for executions and their action and question logs.
///
/// Implementations must make `append_action` and `transition_execution`
/// atomic per execution.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: Execution) -> Result<()>;

    async fn get_execution(&self, id: ExecutionId) -> Result<Execution>;

    /// Move an execution to `next`, validating against the current stored
    /// status. `error_message` is recorded when moving to `failed`.
    async fn transition_execution(
        &self,
        id: ExecutionId,
        next: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<Execution>;

    /// Append an action, assigning the next sequence number for its
    /// execution. Rejected once the execution is terminal.
    async fn append_action(&self, action: NewAction) -> Result<Action>;

    async fn get_action(&self, id: ActionId) -> Result<Action>;

    async fn update_action(&self, action: &Action) -> Result<()>;

    /// Actions of an execution ordered by sequence.
    async fn list_actions(
        &self,
        execution_id: ExecutionId,
        status: Option<ActionStatus>,
    ) -> Result<Vec<Action>>;

    /// Rejected once the execution is terminal.
    async fn insert_question(&self, question: Question) -> Result<()>;

    async fn get_question(&self, id: QuestionId) -> Result<Question>;

    async fn update_question(&self, question: &Question) -> Result<()>;

    /// Questions of an execution ordered by creation time.
    async fn list_questions(
        &self,
        execution_id: ExecutionId,
        status: Option<QuestionStatus>,
    ) -> Result<Vec<Question>>;
}

/// Read access to tasks and projects plus the one write the orchestrator
/// makes to them.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, task_id: &str) -> Result<Task>;

    async fn get_project(&self, project_id: &str) -> Result<Project>;

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<()>;
}
