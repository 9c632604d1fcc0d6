//! Tool mediation: every model tool call passes through here.
//!
//! A call is parsed, charged against the activation's budget, confined to the
//! working root, and then either run now, recorded as a proposal, or turned
//! into a pending question. Only fatal errors are returned as `Err`; tool
//! level failures become failed actions and an error string for the model.

use std::path::Path;

use crate::error::{Result, TaskloopError};
use crate::sandbox::path::resolve;
use crate::sandbox::LimitsTracker;
use crate::tools::catalog::{CompleteArgs, QuestionArgs};
use crate::tools::{ToolInvocation, ToolName};
use crate::types::{
    ActionResult, AgentToolCall, AgentToolResult, ExecutionId, ExecutionStatus, NewAction,
    Question, Task, TaskStatus,
};

use super::approvals::{ApprovalPolicy, ApprovalSettings};
use super::dispatch;
use super::events::{EventEmitter, ExecutionEventPayload};
use super::Services;

pub(crate) const QUESTION_SENTINEL: &str = "Question recorded. Execution is paused until the user \
answers it; do not assume an answer and do not call further tools.";

pub(crate) const SKIPPED_AFTER_QUESTION: &str =
    "Not run: execution is paused until the pending question is answered.";

pub(crate) const SKIPPED_AFTER_COMPLETION: &str =
    "Not run: the task was already marked complete in this step.";

/// Result of one dispatch.
#[derive(Debug, Clone)]
pub(crate) struct Dispatch {
    pub result: AgentToolResult,
    pub question_asked: bool,
    pub task_completed: bool,
}

impl Dispatch {
    fn reply(call: &AgentToolCall, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            result: AgentToolResult {
                tool_call_id: call.id.clone(),
                content: content.into(),
                is_error,
            },
            question_asked: false,
            task_completed: false,
        }
    }
}

pub(crate) fn proposal_sentinel(invocation: &ToolInvocation) -> String {
    format!(
        "Proposed: {}. Waiting for user approval.",
        invocation.describe()
    )
}

pub(crate) struct ToolMediator<'a> {
    services: &'a Services,
    emitter: &'a EventEmitter,
    execution_id: ExecutionId,
    task: &'a Task,
}

impl<'a> ToolMediator<'a> {
    pub fn new(
        services: &'a Services,
        emitter: &'a EventEmitter,
        execution_id: ExecutionId,
        task: &'a Task,
    ) -> Self {
        Self {
            services,
            emitter,
            execution_id,
            task,
        }
    }

    pub async fn dispatch(
        &self,
        tracker: &mut LimitsTracker,
        call: &AgentToolCall,
    ) -> Result<Dispatch> {
        let invocation = match ToolInvocation::parse(&call.name, &call.arguments) {
            Ok(invocation) => invocation,
            Err(err) => return self.reject_malformed(call, err).await,
        };
        let tool = invocation.tool_name();
        tracing::debug!(
            execution_id = %self.execution_id,
            tool = %tool,
            call_id = %call.id,
            "dispatching tool call"
        );

        if tool.is_file_operation() {
            tracker.track_file_operation()?;
        } else if tool == ToolName::RunCommand {
            tracker.track_command()?;
        }

        if let ToolInvocation::AskQuestion(args) = &invocation {
            return self.ask(call, &invocation, args).await;
        }

        let project = self.services.project_for(self.task).await?;
        let root = project.working_directory.as_path();
        if let Some(path) = invocation.path() {
            if let Err(err) = resolve(root, path) {
                return self.record_failure(call, &invocation, err).await;
            }
        }

        let approvals = ApprovalSettings::parse_or_default(project.approval_settings.as_deref());
        match approvals.policy_for(tool) {
            ApprovalPolicy::Gated => self.propose(call, tracker, root, &invocation).await,
            ApprovalPolicy::Immediate => match &invocation {
                ToolInvocation::CompleteTask(args) => self.complete(call, &invocation, args).await,
                _ => self.run_now(call, tracker, root, &invocation).await,
            },
        }
    }

    async fn reject_malformed(&self, call: &AgentToolCall, err: TaskloopError) -> Result<Dispatch> {
        tracing::warn!(tool = %call.name, error = %err, "rejected tool call");
        if let Ok(tool) = call.name.parse::<ToolName>() {
            let action = self
                .services
                .executions
                .append_action(NewAction::finished(
                    self.execution_id,
                    tool.action_type(),
                    call.arguments.clone(),
                    ActionResult::err(err.to_string()),
                ))
                .await?;
            self.emitter.action(&action);
        }
        Ok(Dispatch::reply(call, format!("Error: {err}"), true))
    }

    async fn record_failure(
        &self,
        call: &AgentToolCall,
        invocation: &ToolInvocation,
        err: TaskloopError,
    ) -> Result<Dispatch> {
        if err.is_fatal_to_activation() {
            return Err(err);
        }
        tracing::warn!(tool = %invocation.tool_name(), error = %err, "tool call failed");
        let result = ActionResult::err(err.to_string());
        self.record_finished(invocation, result.clone()).await?;
        Ok(Dispatch::reply(call, result.model_text(), true))
    }

    async fn record_finished(&self, invocation: &ToolInvocation, result: ActionResult) -> Result<()> {
        let action = self
            .services
            .executions
            .append_action(NewAction::finished(
                self.execution_id,
                invocation.action_type(),
                invocation.params(),
                result,
            ))
            .await?;
        self.emitter.action(&action);
        Ok(())
    }

    async fn propose(
        &self,
        call: &AgentToolCall,
        tracker: &LimitsTracker,
        root: &Path,
        invocation: &ToolInvocation,
    ) -> Result<Dispatch> {
        match dispatch::projected_size(root, invocation).await {
            Ok(Some(size)) => tracker.validate_file_size(size)?,
            Ok(None) => {}
            Err(err) => return self.record_failure(call, invocation, err).await,
        }

        let action = self
            .services
            .executions
            .append_action(NewAction::proposed(
                self.execution_id,
                invocation.action_type(),
                invocation.params(),
            ))
            .await?;
        tracing::info!(
            execution_id = %self.execution_id,
            sequence = action.sequence,
            action_type = %action.action_type,
            "action proposed"
        );
        self.emitter.action(&action);
        Ok(Dispatch::reply(call, proposal_sentinel(invocation), false))
    }

    async fn run_now(
        &self,
        call: &AgentToolCall,
        tracker: &LimitsTracker,
        root: &Path,
        invocation: &ToolInvocation,
    ) -> Result<Dispatch> {
        let result = match dispatch::run(self.services.executor.as_ref(), root, invocation, tracker)
            .await
        {
            Ok(output) => ActionResult::ok(output),
            Err(err) if err.is_fatal_to_activation() => return Err(err),
            Err(err) => ActionResult::err(err.to_string()),
        };
        let is_error = !result.success;
        let text = result.model_text();
        self.record_finished(invocation, result).await?;
        Ok(Dispatch::reply(call, text, is_error))
    }

    async fn complete(
        &self,
        call: &AgentToolCall,
        invocation: &ToolInvocation,
        args: &CompleteArgs,
    ) -> Result<Dispatch> {
        self.record_finished(invocation, ActionResult::ok(args.summary.clone()))
            .await?;
        self.services
            .tasks
            .set_task_status(&self.task.id, TaskStatus::PendingValidation)
            .await?;
        self.emitter.emit(ExecutionEventPayload::TaskCompleted {
            task_id: self.task.id.clone(),
            summary: Some(args.summary.clone()),
        });
        tracing::info!(execution_id = %self.execution_id, task_id = %self.task.id, "task completed");

        let mut dispatch = Dispatch::reply(call, "Task marked complete.", false);
        dispatch.task_completed = true;
        Ok(dispatch)
    }

    async fn ask(
        &self,
        call: &AgentToolCall,
        invocation: &ToolInvocation,
        args: &QuestionArgs,
    ) -> Result<Dispatch> {
        let question = Question::new(self.execution_id, args.question.clone(), args.context.clone());
        self.services
            .executions
            .insert_question(question.clone())
            .await?;
        self.record_finished(invocation, ActionResult::ok(args.question.clone()))
            .await?;
        self.services
            .executions
            .transition_execution(self.execution_id, ExecutionStatus::AwaitingQuestion, None)
            .await?;
        tracing::info!(execution_id = %self.execution_id, question_id = %question.id, "question asked");

        self.emitter.emit(ExecutionEventPayload::Question { question });
        self.emitter.status(ExecutionStatus::AwaitingQuestion);

        let mut dispatch = Dispatch::reply(call, QUESTION_SENTINEL, false);
        dispatch.question_asked = true;
        Ok(dispatch)
    }
}
