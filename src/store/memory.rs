//! In-memory store used by tests and embedders without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ExecutionStore, TaskStore};
use crate::error::{Result, TaskloopError};
use crate::types::{
    Action, ActionId, ActionStatus, Execution, ExecutionId, ExecutionStatus, NewAction, Project,
    Question, QuestionId, QuestionStatus, Task, TaskStatus,
};

#[derive(Default)]
struct Tables {
    executions: HashMap<ExecutionId, Execution>,
    actions: HashMap<ActionId, Action>,
    last_sequence: HashMap<ExecutionId, u64>,
    questions: HashMap<QuestionId, Question>,
    tasks: HashMap<String, Task>,
    projects: HashMap<String, Project>,
}

impl Tables {
    fn ensure_open(&self, execution_id: ExecutionId) -> Result<()> {
        let execution = self
            .executions
            .get(&execution_id)
            .ok_or_else(|| TaskloopError::NotFound(format!("execution {execution_id}")))?;
        if execution.is_terminal() {
            return Err(TaskloopError::InvalidState(format!(
                "execution {execution_id} is {} and accepts no new records",
                execution.status
            )));
        }
        Ok(())
    }
}

/// A [`ExecutionStore`] and [`TaskStore`] held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_task(&self, task: Task) {
        self.tables.write().await.tasks.insert(task.id.clone(), task);
    }

    /// Insert or replace a project; later dispatches see the new settings.
    pub async fn upsert_project(&self, project: Project) {
        self.tables
            .write()
            .await
            .projects
            .insert(project.id.clone(), project);
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_execution(&self, execution: Execution) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.executions.contains_key(&execution.id) {
            return Err(TaskloopError::Storage(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        tables.executions.insert(execution.id, execution);
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Execution> {
        self.tables
            .read()
            .await
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskloopError::NotFound(format!("execution {id}")))
    }

    async fn transition_execution(
        &self,
        id: ExecutionId,
        next: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<Execution> {
        let mut tables = self.tables.write().await;
        let execution = tables
            .executions
            .get_mut(&id)
            .ok_or_else(|| TaskloopError::NotFound(format!("execution {id}")))?;
        match (next, error_message) {
            (ExecutionStatus::Failed, Some(message)) => execution.fail(message)?,
            _ => execution.transition(next)?,
        }
        Ok(execution.clone())
    }

    async fn append_action(&self, action: NewAction) -> Result<Action> {
        let mut tables = self.tables.write().await;
        tables.ensure_open(action.execution_id)?;
        let sequence = {
            let last = tables.last_sequence.entry(action.execution_id).or_insert(0);
            *last += 1;
            *last
        };
        let action = action.into_action(sequence);
        tables.actions.insert(action.id, action.clone());
        Ok(action)
    }

    async fn get_action(&self, id: ActionId) -> Result<Action> {
        self.tables
            .read()
            .await
            .actions
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskloopError::NotFound(format!("action {id}")))
    }

    async fn update_action(&self, action: &Action) -> Result<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .actions
            .get_mut(&action.id)
            .ok_or_else(|| TaskloopError::NotFound(format!("action {}", action.id)))?;
        *slot = action.clone();
        Ok(())
    }

    async fn list_actions(
        &self,
        execution_id: ExecutionId,
        status: Option<ActionStatus>,
    ) -> Result<Vec<Action>> {
        let tables = self.tables.read().await;
        let mut actions: Vec<Action> = tables
            .actions
            .values()
            .filter(|a| a.execution_id == execution_id)
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.sequence);
        Ok(actions)
    }

    async fn insert_question(&self, question: Question) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_open(question.execution_id)?;
        tables.questions.insert(question.id, question);
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question> {
        self.tables
            .read()
            .await
            .questions
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskloopError::NotFound(format!("question {id}")))
    }

    async fn update_question(&self, question: &Question) -> Result<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .questions
            .get_mut(&question.id)
            .ok_or_else(|| TaskloopError::NotFound(format!("question {}", question.id)))?;
        *slot = question.clone();
        Ok(())
    }

    async fn list_questions(
        &self,
        execution_id: ExecutionId,
        status: Option<QuestionStatus>,
    ) -> Result<Vec<Question>> {
        let tables = self.tables.read().await;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.execution_id == execution_id)
            .filter(|q| status.map_or(true, |s| q.status == s))
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.created_at);
        Ok(questions)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.tables
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskloopError::NotFound(format!("task {task_id}")))
    }

    async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.tables
            .read()
            .await
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| TaskloopError::NotFound(format!("project {project_id}")))
    }

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskloopError::NotFound(format!("task {task_id}")))?;
        task.status = status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionType;

    async fn open_execution(store: &MemoryStore) -> ExecutionId {
        let execution = Execution::new("task-1");
        let id = execution.id;
        store.insert_execution(execution).await.unwrap();
        id
    }

    #[tokio::test]
    async fn sequences_are_per_execution_and_monotonic() {
        let store = MemoryStore::new();
        let first = open_execution(&store).await;
        let second = open_execution(&store).await;

        for expected in 1..=3 {
            let action = store
                .append_action(NewAction::proposed(first, ActionType::Write, serde_json::json!({})))
                .await
                .unwrap();
            assert_eq!(action.sequence, expected);
        }
        let other = store
            .append_action(NewAction::proposed(second, ActionType::Read, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(other.sequence, 1);

        let listed = store.list_actions(first, None).await.unwrap();
        let sequences: Vec<u64> = listed.iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn terminal_execution_rejects_new_actions() {
        let store = MemoryStore::new();
        let id = open_execution(&store).await;
        store
            .transition_execution(id, ExecutionStatus::Cancelled, None)
            .await
            .unwrap();

        let err = store
            .append_action(NewAction::proposed(id, ActionType::Write, serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskloopError::InvalidState(_)));
    }

    #[tokio::test]
    async fn transition_records_failure_message() {
        let store = MemoryStore::new();
        let id = open_execution(&store).await;
        store
            .transition_execution(id, ExecutionStatus::Analyzing, None)
            .await
            .unwrap();
        let failed = store
            .transition_execution(id, ExecutionStatus::Failed, Some("boom".into()))
            .await
            .unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(store
            .transition_execution(id, ExecutionStatus::Analyzing, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = MemoryStore::new();
        let id = open_execution(&store).await;
        let mut action = store
            .append_action(NewAction::proposed(id, ActionType::Delete, serde_json::json!({})))
            .await
            .unwrap();
        store
            .append_action(NewAction::proposed(id, ActionType::Write, serde_json::json!({})))
            .await
            .unwrap();
        action.set_status(ActionStatus::Approved).unwrap();
        store.update_action(&action).await.unwrap();

        let approved = store
            .list_actions(id, Some(ActionStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, action.id);
    }
}
