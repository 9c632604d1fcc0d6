//! The execution machinery: model loop, tool mediation, approvals and batch
//! execution, and the event stream they report through.

pub mod approvals;
pub(crate) mod batch;
pub(crate) mod dispatch;
pub mod events;
pub(crate) mod mediator;
pub mod prompt;
pub(crate) mod runner;

use std::sync::Arc;

pub use approvals::{ApprovalDecision, ApprovalPolicy, ApprovalSettings};
pub use events::{EventEmitter, EventStream, ExecutionEvent, ExecutionEventPayload};

use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::provider::ModelProvider;
use crate::sandbox::SandboxLimits;
use crate::store::{ExecutionStore, TaskStore};
use crate::tools::ToolExecutor;
use crate::types::{Project, Task};

/// Collaborators shared by every activation and batch.
#[derive(Clone)]
pub(crate) struct Services {
    pub executions: Arc<dyn ExecutionStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub provider: Arc<dyn ModelProvider>,
    pub executor: Arc<dyn ToolExecutor>,
    pub config: OrchestratorConfig,
}

impl Services {
    /// Re-read on every use so setting changes apply to the next dispatch.
    pub async fn project_for(&self, task: &Task) -> Result<Project> {
        self.tasks.get_project(&task.project_id).await
    }

    pub fn limits_for(&self, project: &Project) -> SandboxLimits {
        SandboxLimits::parse_or(project.sandbox_limits.as_deref(), self.config.default_limits)
    }
}
