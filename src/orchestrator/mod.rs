//! The orchestrator service: the operations callers use to start, inspect,
//! approve, execute, cancel, question and resume executions.

pub mod registry;

use std::collections::HashSet;
use std::sync::Arc;

use bon::bon;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::agent_loop::batch::Batch;
use crate::agent_loop::prompt::{answers_prompt, task_prompt};
use crate::agent_loop::runner::Activation;
use crate::agent_loop::{ApprovalDecision, EventEmitter, EventStream, ExecutionEvent, Services};
use crate::config::OrchestratorConfig;
use crate::error::{Result, TaskloopError};
use crate::provider::ModelProvider;
use crate::sandbox::SandboxLimits;
use crate::store::{ExecutionStore, TaskStore};
use crate::tools::{LocalExecutor, ToolExecutor};
use crate::types::{
    Action, ActionId, Execution, ExecutionId, ExecutionStatus, ModelMessage, Question,
    QuestionId, QuestionStatus, Task, TaskStatus,
};

pub use registry::{ActiveRuns, RunGuard};

/// An execution with its full action and question logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetail {
    pub execution: Execution,
    /// Ordered by sequence.
    pub actions: Vec<Action>,
    pub questions: Vec<Question>,
}

/// Handle to a running activation or batch.
///
/// The registry slot is released before `wait` or `collect` returns, so a
/// follow-up operation on the same execution can be issued right away.
pub struct ExecutionRun {
    execution_id: ExecutionId,
    events: Option<EventStream>,
    result_rx: oneshot::Receiver<ExecutionStatus>,
}

impl std::fmt::Debug for ExecutionRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRun")
            .field("execution_id", &self.execution_id)
            .finish_non_exhaustive()
    }
}

impl ExecutionRun {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Take the event stream. Events are buffered until read.
    pub fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Wait for the run to settle and return the resulting status.
    pub async fn wait(self) -> ExecutionStatus {
        self.result_rx.await.unwrap_or(ExecutionStatus::Failed)
    }

    /// Drain the event stream through `done`, then wait for the run.
    pub async fn collect(mut self) -> (Vec<ExecutionEvent>, ExecutionStatus) {
        let events = match self.events.take() {
            Some(stream) => stream.collect().await,
            None => Vec::new(),
        };
        (events, self.wait().await)
    }
}

/// Explicit owner of every execution it runs.
pub struct Orchestrator {
    services: Services,
    runs: ActiveRuns,
}

#[bon]
impl Orchestrator {
    /// Build an orchestrator. Without an explicit executor, a
    /// [`LocalExecutor`] configured from `config` is used.
    #[builder]
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        tasks: Arc<dyn TaskStore>,
        provider: Arc<dyn ModelProvider>,
        executor: Option<Arc<dyn ToolExecutor>>,
        #[builder(default)] config: OrchestratorConfig,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| {
            Arc::new(LocalExecutor::new(
                config.command_timeout(),
                config.max_output_bytes,
            ))
        });
        Self {
            services: Services {
                executions,
                tasks,
                provider,
                executor,
                config,
            },
            runs: ActiveRuns::new(),
        }
    }
}

impl Orchestrator {
    pub fn config(&self) -> &OrchestratorConfig {
        &self.services.config
    }

    pub fn active_runs(&self) -> &ActiveRuns {
        &self.runs
    }

    /// Create an execution for `task_id` and start analyzing it.
    pub async fn start_execution(&self, task_id: &str) -> Result<ExecutionRun> {
        let task = self.services.tasks.get_task(task_id).await?;
        let project = self.services.project_for(&task).await?;
        let limits = self.services.limits_for(&project);

        let execution = Execution::new(&task.id);
        let execution_id = execution.id;
        let guard = self.runs.register(execution_id)?;
        self.services
            .tasks
            .set_task_status(&task.id, TaskStatus::InProgress)
            .await?;
        self.services.executions.insert_execution(execution).await?;
        tracing::info!(%execution_id, task_id = %task.id, "execution started");

        let messages = vec![ModelMessage::user(task_prompt(&task))];
        Ok(self.spawn_activation(guard, execution_id, task, limits, messages))
    }

    pub async fn get_execution(&self, execution_id: ExecutionId) -> Result<ExecutionDetail> {
        let executions = &self.services.executions;
        Ok(ExecutionDetail {
            execution: executions.get_execution(execution_id).await?,
            actions: executions.list_actions(execution_id, None).await?,
            questions: executions.list_questions(execution_id, None).await?,
        })
    }

    pub async fn approve_actions(
        &self,
        execution_id: ExecutionId,
        action_ids: &[ActionId],
    ) -> Result<Vec<Action>> {
        self.decide_actions(execution_id, action_ids, ApprovalDecision::Approve)
            .await
    }

    pub async fn reject_actions(
        &self,
        execution_id: ExecutionId,
        action_ids: &[ActionId],
    ) -> Result<Vec<Action>> {
        self.decide_actions(execution_id, action_ids, ApprovalDecision::Reject)
            .await
    }

    /// Mark proposed actions approved or rejected. Repeating a decision is a
    /// no-op; nothing is written unless every id is valid.
    pub async fn decide_actions(
        &self,
        execution_id: ExecutionId,
        action_ids: &[ActionId],
        decision: ApprovalDecision,
    ) -> Result<Vec<Action>> {
        let executions = &self.services.executions;
        let execution = executions.get_execution(execution_id).await?;
        if execution.is_terminal() || execution.status == ExecutionStatus::Executing {
            return Err(TaskloopError::InvalidState(format!(
                "execution {execution_id} is {}; actions can no longer be decided",
                execution.status
            )));
        }

        let target = decision.target_status();
        let mut seen = HashSet::new();
        let mut decided = Vec::with_capacity(action_ids.len());
        for id in action_ids.iter().filter(|id| seen.insert(**id)) {
            let mut action = executions.get_action(*id).await?;
            if action.execution_id != execution_id {
                return Err(TaskloopError::NotFound(format!(
                    "action {id} in execution {execution_id}"
                )));
            }
            action.set_status(target)?;
            decided.push(action);
        }

        for action in &decided {
            executions.update_action(action).await?;
        }
        tracing::info!(%execution_id, count = decided.len(), ?decision, "actions decided");
        Ok(decided)
    }

    /// Run every approved action. Rejected without side effects unless the
    /// execution is awaiting approval.
    pub async fn execute_approved_actions(&self, execution_id: ExecutionId) -> Result<ExecutionRun> {
        let execution = self.services.executions.get_execution(execution_id).await?;
        if execution.status != ExecutionStatus::AwaitingApproval {
            return Err(TaskloopError::InvalidState(format!(
                "execution {execution_id} is {}, not awaiting_approval",
                execution.status
            )));
        }
        let task = self.services.tasks.get_task(&execution.task_id).await?;
        let guard = self.runs.register(execution_id)?;
        self.services
            .executions
            .transition_execution(execution_id, ExecutionStatus::Executing, None)
            .await?;

        let (emitter, events) = EventEmitter::channel(execution_id);
        let batch = Batch {
            services: self.services.clone(),
            execution_id,
            task,
            emitter,
            cancel: guard.token(),
        };
        let (result_tx, result_rx) = oneshot::channel();
        tokio::spawn(async move {
            let status = batch.run().await;
            drop(guard);
            let _ = result_tx.send(status);
        });
        Ok(ExecutionRun {
            execution_id,
            events: Some(events),
            result_rx,
        })
    }

    /// Cancel a live execution. Cancelling twice is a no-op; finished
    /// executions cannot be cancelled.
    pub async fn cancel_execution(&self, execution_id: ExecutionId) -> Result<Execution> {
        let execution = self.services.executions.get_execution(execution_id).await?;
        match execution.status {
            ExecutionStatus::Cancelled => return Ok(execution),
            ExecutionStatus::Completed | ExecutionStatus::Failed => {
                return Err(TaskloopError::InvalidState(format!(
                    "execution {execution_id} is already {}",
                    execution.status
                )))
            }
            _ => {}
        }
        let execution = self
            .services
            .executions
            .transition_execution(execution_id, ExecutionStatus::Cancelled, None)
            .await?;
        let was_running = self.runs.cancel(execution_id);
        tracing::info!(%execution_id, was_running, "execution cancelled");
        Ok(execution)
    }

    pub async fn list_pending_questions(&self, execution_id: ExecutionId) -> Result<Vec<Question>> {
        self.services
            .executions
            .list_questions(execution_id, Some(QuestionStatus::Pending))
            .await
    }

    /// Record an answer. Once no questions remain pending the execution goes
    /// back to `analyzing` and can be resumed.
    pub async fn answer_question(
        &self,
        question_id: QuestionId,
        response: impl Into<String>,
    ) -> Result<Question> {
        let executions = &self.services.executions;
        let mut question = executions.get_question(question_id).await?;
        if !question.is_pending() {
            return Err(TaskloopError::InvalidState(format!(
                "question {question_id} is already answered"
            )));
        }
        let execution = executions.get_execution(question.execution_id).await?;
        if execution.status != ExecutionStatus::AwaitingQuestion {
            return Err(TaskloopError::InvalidState(format!(
                "execution {} is {}, not awaiting_question",
                execution.id, execution.status
            )));
        }

        question.answer(response);
        executions.update_question(&question).await?;

        let remaining = self.list_pending_questions(execution.id).await?;
        if remaining.is_empty() {
            executions
                .transition_execution(execution.id, ExecutionStatus::Analyzing, None)
                .await?;
        }
        tracing::info!(
            execution_id = %execution.id,
            %question_id,
            remaining = remaining.len(),
            "question answered"
        );
        Ok(question)
    }

    /// Start a new activation after every question has been answered.
    pub async fn resume_execution(&self, execution_id: ExecutionId) -> Result<ExecutionRun> {
        let execution = self.services.executions.get_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Analyzing {
            return Err(TaskloopError::InvalidState(format!(
                "execution {execution_id} is {}; only analyzing executions can be resumed",
                execution.status
            )));
        }
        if !self.list_pending_questions(execution_id).await?.is_empty() {
            return Err(TaskloopError::InvalidState(format!(
                "execution {execution_id} still has unanswered questions"
            )));
        }
        let guard = self.runs.register(execution_id)?;

        let task = self.services.tasks.get_task(&execution.task_id).await?;
        let project = self.services.project_for(&task).await?;
        let limits = self.services.limits_for(&project);
        let questions = self
            .services
            .executions
            .list_questions(execution_id, Some(QuestionStatus::Answered))
            .await?;

        let mut messages = vec![ModelMessage::user(task_prompt(&task))];
        if let Some(answers) = answers_prompt(&questions) {
            messages.push(ModelMessage::user(answers));
        }
        tracing::info!(%execution_id, answered = questions.len(), "execution resumed");
        Ok(self.spawn_activation(guard, execution_id, task, limits, messages))
    }

    /// Cancel every running activation and batch.
    pub fn shutdown(&self) {
        tracing::info!(active = self.runs.len(), "orchestrator shutting down");
        self.runs.cancel_all();
    }

    fn spawn_activation(
        &self,
        guard: RunGuard,
        execution_id: ExecutionId,
        task: Task,
        limits: SandboxLimits,
        messages: Vec<ModelMessage>,
    ) -> ExecutionRun {
        let (emitter, events) = EventEmitter::channel(execution_id);
        let activation = Activation {
            services: self.services.clone(),
            execution_id,
            task,
            limits,
            messages,
            emitter,
            cancel: guard.token(),
        };
        let (result_tx, result_rx) = oneshot::channel();
        tokio::spawn(async move {
            let status = activation.run().await;
            drop(guard);
            let _ = result_tx.send(status);
        });
        ExecutionRun {
            execution_id,
            events: Some(events),
            result_rx,
        }
    }
}
