//! Execution of an approved batch of actions.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::sandbox::LimitsTracker;
use crate::tools::catalog::CompleteArgs;
use crate::tools::ToolInvocation;
use crate::types::{
    Action, ActionResult, ActionStatus, ActionType, ExecutionId, ExecutionStatus, Task,
    TaskStatus,
};

use super::dispatch;
use super::events::{EventEmitter, ExecutionEventPayload};
use super::runner::is_cancelled;
use super::Services;

/// Runs the approved actions of an execution that is already `executing`.
pub(crate) struct Batch {
    pub services: Services,
    pub execution_id: ExecutionId,
    pub task: Task,
    pub emitter: EventEmitter,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Tally {
    attempted: usize,
    failed: usize,
}

impl Batch {
    pub async fn run(self) -> ExecutionStatus {
        self.emitter.status(ExecutionStatus::Executing);
        let status = match self.execute().await {
            Ok(None) => {
                self.emitter.status(ExecutionStatus::Cancelled);
                ExecutionStatus::Cancelled
            }
            // An empty batch lands here too: nothing approved still closes the execution.
            Ok(Some(tally)) if tally.failed == 0 => {
                if tally.attempted == 0 {
                    tracing::info!(execution_id = %self.execution_id, "no approved actions to run");
                }
                self.transition(ExecutionStatus::Completed, None).await
            }
            Ok(Some(tally)) => {
                let message = format!(
                    "{} of {} approved actions failed",
                    tally.failed, tally.attempted
                );
                self.emitter.error(message.clone());
                self.transition(ExecutionStatus::Failed, Some(message)).await
            }
            Err(err) => {
                tracing::warn!(execution_id = %self.execution_id, error = %err, "batch aborted");
                let message = err.to_string();
                self.emitter.error(message.clone());
                self.transition(ExecutionStatus::Failed, Some(message)).await
            }
        };
        tracing::info!(execution_id = %self.execution_id, %status, "batch finished");
        self.emitter.done(status);
        status
    }

    /// `None` when the batch stopped at a cancellation checkpoint.
    async fn execute(&self) -> Result<Option<Tally>> {
        let approved = self
            .services
            .executions
            .list_actions(self.execution_id, Some(ActionStatus::Approved))
            .await?;
        let (markers, work): (Vec<Action>, Vec<Action>) = approved
            .into_iter()
            .partition(|a| a.action_type == ActionType::CompleteTask);
        tracing::info!(
            execution_id = %self.execution_id,
            actions = work.len(),
            complete_task = !markers.is_empty(),
            "executing approved batch"
        );

        let mut tally = Tally::default();
        for action in work {
            if is_cancelled(&self.services, &self.cancel, self.execution_id).await? {
                return Ok(None);
            }
            tally.attempted += 1;
            if !self.execute_action(action).await? {
                tally.failed += 1;
            }
        }

        for marker in markers {
            if is_cancelled(&self.services, &self.cancel, self.execution_id).await? {
                return Ok(None);
            }
            tally.attempted += 1;
            let succeeded = tally.failed == 0;
            self.finish_marker(marker, succeeded).await?;
            if !succeeded {
                tally.failed += 1;
            }
        }
        Ok(Some(tally))
    }

    /// Returns whether the action succeeded.
    async fn execute_action(&self, mut action: Action) -> Result<bool> {
        action.set_status(ActionStatus::Executing)?;
        self.services.executions.update_action(&action).await?;
        self.emitter.action(&action);

        let result = match self.perform(&action).await {
            Ok(output) => ActionResult::ok(output),
            Err(err) => {
                tracing::warn!(
                    action_id = %action.id,
                    sequence = action.sequence,
                    error = %err,
                    "approved action failed"
                );
                ActionResult::err(err.to_string())
            }
        };
        let success = result.success;
        action.finish(result)?;
        self.services.executions.update_action(&action).await?;
        self.emitter.action(&action);
        Ok(success)
    }

    async fn perform(&self, action: &Action) -> Result<String> {
        let invocation = ToolInvocation::from_action(action)?;
        let project = self.services.project_for(&self.task).await?;
        let tracker = LimitsTracker::new(self.services.limits_for(&project));
        dispatch::run(
            self.services.executor.as_ref(),
            &project.working_directory,
            &invocation,
            &tracker,
        )
        .await
    }

    async fn finish_marker(&self, mut marker: Action, succeeded: bool) -> Result<()> {
        marker.set_status(ActionStatus::Executing)?;
        self.services.executions.update_action(&marker).await?;
        self.emitter.action(&marker);

        let summary = serde_json::from_value::<CompleteArgs>(marker.params.clone())
            .map(|args| args.summary)
            .ok();
        if succeeded {
            self.services
                .tasks
                .set_task_status(&self.task.id, TaskStatus::PendingValidation)
                .await?;
            marker.finish(ActionResult::ok(
                summary.clone().unwrap_or_else(|| "Task completed".to_string()),
            ))?;
        } else {
            marker.finish(ActionResult::err(
                "task not completed because earlier actions in the batch failed",
            ))?;
        }
        self.services.executions.update_action(&marker).await?;
        self.emitter.action(&marker);

        if succeeded {
            self.emitter.emit(ExecutionEventPayload::TaskCompleted {
                task_id: self.task.id.clone(),
                summary,
            });
        }
        Ok(())
    }

    async fn transition(&self, next: ExecutionStatus, message: Option<String>) -> ExecutionStatus {
        match self
            .services
            .executions
            .transition_execution(self.execution_id, next, message)
            .await
        {
            Ok(execution) => {
                self.emitter.status(execution.status);
                execution.status
            }
            Err(err) => {
                tracing::warn!(execution_id = %self.execution_id, %next, error = %err, "status update rejected");
                let status = self
                    .services
                    .executions
                    .get_execution(self.execution_id)
                    .await
                    .map(|e| e.status)
                    .unwrap_or(ExecutionStatus::Failed);
                self.emitter.status(status);
                status
            }
        }
    }
}
