//! One activation of the model loop.

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskloopError};
use crate::provider::StepRequest;
use crate::sandbox::{LimitsTracker, SandboxLimits};
use crate::stop::{default_stop_condition, StepOutcome, StopCondition};
use crate::tools::tool_definitions;
use crate::types::{ExecutionId, ExecutionStatus, ModelMessage, Task};
use crate::util::timeout::with_timeout;

use super::events::{EventEmitter, ExecutionEventPayload};
use super::mediator::{ToolMediator, SKIPPED_AFTER_COMPLETION, SKIPPED_AFTER_QUESTION};
use super::prompt::DEFAULT_SYSTEM_PROMPT;
use super::Services;

/// How the loop ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    Stopped,
    QuestionAsked,
    TaskCompleted,
    Cancelled,
}

/// Everything one activation needs. Consumed by [`Activation::run`].
pub(crate) struct Activation {
    pub services: Services,
    pub execution_id: ExecutionId,
    pub task: Task,
    pub limits: SandboxLimits,
    pub messages: Vec<ModelMessage>,
    pub emitter: EventEmitter,
    pub cancel: CancellationToken,
}

impl Activation {
    /// Drive the loop to a resting state and emit `done`.
    pub async fn run(mut self) -> ExecutionStatus {
        let outcome = self.drive().await;
        let status = self.settle(outcome).await;
        tracing::info!(execution_id = %self.execution_id, %status, "activation finished");
        self.emitter.done(status);
        status
    }

    async fn drive(&mut self) -> Result<LoopEnd> {
        let services = &self.services;
        services
            .executions
            .transition_execution(self.execution_id, ExecutionStatus::Analyzing, None)
            .await?;
        self.emitter.status(ExecutionStatus::Analyzing);
        self.emitter.emit(ExecutionEventPayload::SandboxLimits {
            limits: self.limits,
        });

        let mut tracker = LimitsTracker::new(self.limits);
        let stop = default_stop_condition();
        let tools = tool_definitions();
        let system_prompt = services
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let mediator = ToolMediator::new(services, &self.emitter, self.execution_id, &self.task);

        loop {
            if is_cancelled(services, &self.cancel, self.execution_id).await? {
                return Ok(LoopEnd::Cancelled);
            }
            tracker.track_step()?;
            let step = tracker.usage().steps_count;

            let request = StepRequest {
                execution_id: self.execution_id,
                step,
                max_steps: self.limits.max_steps,
                system_prompt: system_prompt.clone(),
                messages: self.messages.clone(),
                tools: tools.clone(),
            };
            tracing::debug!(execution_id = %self.execution_id, step, "model step");
            let response = with_timeout(
                services.config.provider_timeout(),
                services.provider.step(&request),
            )
            .await?;
            tracker.track_tokens(response.usage.input_tokens, response.usage.output_tokens)?;

            if let Some(reasoning) = response.reasoning.as_deref().filter(|r| !r.is_empty()) {
                self.emitter.emit(ExecutionEventPayload::Reasoning {
                    text: reasoning.to_string(),
                });
            }
            if !response.text.trim().is_empty() {
                self.emitter.emit(ExecutionEventPayload::Text {
                    text: response.text.clone(),
                });
            }
            self.messages.push(ModelMessage::assistant_turn(
                &response.text,
                &response.tool_calls,
            ));

            let mut outcome = StepOutcome {
                step,
                tool_calls: response.tool_calls.len(),
                ..StepOutcome::default()
            };
            for call in &response.tool_calls {
                let skipped = if outcome.question_asked {
                    Some(SKIPPED_AFTER_QUESTION)
                } else if outcome.task_completed {
                    Some(SKIPPED_AFTER_COMPLETION)
                } else {
                    None
                };
                if let Some(reason) = skipped {
                    tracing::debug!(tool = %call.name, reason, "tool call not run");
                    self.messages
                        .push(ModelMessage::tool_result(&call.id, reason, true));
                    continue;
                }
                if is_cancelled(services, &self.cancel, self.execution_id).await? {
                    return Ok(LoopEnd::Cancelled);
                }
                tracker.check_time_limit()?;

                let dispatch = mediator.dispatch(&mut tracker, call).await?;
                outcome.question_asked |= dispatch.question_asked;
                outcome.task_completed |= dispatch.task_completed;
                self.messages.push(ModelMessage::tool_result(
                    dispatch.result.tool_call_id,
                    dispatch.result.content,
                    dispatch.result.is_error,
                ));
            }

            if !outcome.question_asked {
                tracker.check_time_limit()?;
            }
            self.emitter.emit(ExecutionEventPayload::SandboxUsage {
                summary: tracker.usage_summary(),
            });

            if stop.should_stop(&outcome) {
                return Ok(if outcome.question_asked {
                    LoopEnd::QuestionAsked
                } else if outcome.task_completed {
                    LoopEnd::TaskCompleted
                } else {
                    LoopEnd::Stopped
                });
            }
        }
    }

    async fn settle(&self, outcome: Result<LoopEnd>) -> ExecutionStatus {
        match outcome {
            Ok(LoopEnd::Stopped) => self.transition(ExecutionStatus::AwaitingApproval, None).await,
            Ok(LoopEnd::TaskCompleted) => self.transition(ExecutionStatus::Completed, None).await,
            Ok(LoopEnd::QuestionAsked) => self.current_status().await,
            Ok(LoopEnd::Cancelled) => {
                self.emitter.status(ExecutionStatus::Cancelled);
                ExecutionStatus::Cancelled
            }
            Err(err) => self.fail(err).await,
        }
    }

    async fn fail(&self, err: TaskloopError) -> ExecutionStatus {
        if self.current_status().await == ExecutionStatus::Cancelled {
            tracing::debug!(error = %err, "error after cancellation ignored");
            self.emitter.status(ExecutionStatus::Cancelled);
            return ExecutionStatus::Cancelled;
        }

        tracing::warn!(execution_id = %self.execution_id, error = %err, "activation failed");
        if let Some((limit_type, limit_value, current_value)) = err.limit_exceeded() {
            self.emitter.emit(ExecutionEventPayload::LimitExceeded {
                limit_type,
                limit_value,
                current_value,
            });
        }
        let message = err.to_string();
        self.emitter.error(message.clone());
        self.transition(ExecutionStatus::Failed, Some(message)).await
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
                let status = self.current_status().await;
                self.emitter.status(status);
                status
            }
        }
    }

    async fn current_status(&self) -> ExecutionStatus {
        match self.services.executions.get_execution(self.execution_id).await {
            Ok(execution) => execution.status,
            Err(err) => {
                tracing::error!(execution_id = %self.execution_id, error = %err, "execution unreadable");
                ExecutionStatus::Failed
            }
        }
    }
}

/// Cancellation checkpoint: the local token or a cancelled status in the store.
pub(crate) async fn is_cancelled(
    services: &Services,
    cancel: &CancellationToken,
    execution_id: ExecutionId,
) -> Result<bool> {
    if cancel.is_cancelled() {
        return Ok(true);
    }
    let execution = services.executions.get_execution(execution_id).await?;
    Ok(execution.status == ExecutionStatus::Cancelled)
}
