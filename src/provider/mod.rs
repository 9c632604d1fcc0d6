//! Model provider seam.
//!
//! The orchestrator drives the model one step at a time: it sends the system
//! prompt, the conversation so far and the tool catalog, and gets back text,
//! optional reasoning, tool calls and token usage.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::tools::ToolDefinition;
use crate::types::{AgentToolCall, ModelMessage, Usage};

/// Input for a single model step.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub execution_id: Uuid,
    /// 1-based index of this step within the activation.
    pub step: u64,
    /// Step budget for the activation; 0 means unlimited.
    pub max_steps: u64,
    pub system_prompt: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Output of a single model step.
#[derive(Debug, Clone, Default)]
pub struct StepResponse {
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<AgentToolCall>,
    pub usage: Usage,
}

impl StepResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_call(mut self, call: AgentToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// A language model that can take one agent step.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name used in errors and logs.
    fn provider_name(&self) -> &str;

    async fn step(&self, request: &StepRequest) -> Result<StepResponse>;
}
