//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    ApprovalSettings, EventStream, ExecutionEvent, ExecutionEventPayload,
};
pub use crate::config::OrchestratorConfig;
pub use crate::error::{Result, TaskloopError};
pub use crate::orchestrator::{ExecutionDetail, ExecutionRun, Orchestrator};
pub use crate::provider::{ModelProvider, StepRequest, StepResponse};
pub use crate::sandbox::{LimitType, LimitsTracker, SandboxLimits};
pub use crate::store::{ExecutionStore, MemoryStore, TaskStore};
pub use crate::tools::{LocalExecutor, ToolExecutor, ToolName};
pub use crate::types::{
    Action, ActionStatus, ActionType, AgentToolCall, Execution, ExecutionStatus, ModelMessage,
    Project, Question, QuestionStatus, Task, TaskStatus, Usage,
};
