//! Shared test helpers: a scripted model provider and an orchestrator
//! fixture backed by a temporary working directory.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use taskloop::config::OrchestratorConfig;
use taskloop::error::{Result, TaskloopError};
use taskloop::orchestrator::Orchestrator;
use taskloop::provider::{ModelProvider, StepRequest, StepResponse};
use taskloop::sandbox::SandboxLimits;
use taskloop::store::MemoryStore;
use taskloop::types::*;
use taskloop::agent_loop::ExecutionEvent;

pub const TASK_ID: &str = "task-1";
pub const PROJECT_ID: &str = "project-1";

/// A provider that replays queued step responses, then answers with plain
/// text (ending the loop).
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Result<StepResponse>>>,
    requests: Mutex<Vec<StepRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, step: StepResponse) {
        self.steps.lock().unwrap().push_back(Ok(step));
    }

    /// Queue a step with a single tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.queue(
            StepResponse::text("")
                .with_tool_call(AgentToolCall::new(id, name, args))
                .with_usage(Usage::new(10, 5)),
        );
    }

    pub fn queue_error(&self, message: &str) {
        self.steps
            .lock()
            .unwrap()
            .push_back(Err(TaskloopError::provider("scripted", message)));
    }

    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn step(&self, request: &StepRequest) -> Result<StepResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.steps.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(StepResponse::text("Done.").with_usage(Usage::new(10, 20))))
    }
}

/// An orchestrator wired to a memory store, a scripted provider and a
/// temporary project directory.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub orchestrator: Orchestrator,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_project(|project| project).await
    }

    pub async fn with_limits(limits: SandboxLimits) -> Self {
        let raw = serde_json::to_string(&limits).unwrap();
        Self::with_project(move |project| project.with_sandbox_limits(raw)).await
    }

    pub async fn with_project(configure: impl FnOnce(Project) -> Project) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_project(configure(Project::new(PROJECT_ID, dir.path())))
            .await;
        store
            .insert_task(Task::new(TASK_ID, PROJECT_ID, "Tidy the project").with_description("Make it nice."))
            .await;

        let provider = Arc::new(ScriptedProvider::new());
        let orchestrator = Orchestrator::builder()
            .executions(store.clone())
            .tasks(store.clone())
            .provider(provider.clone())
            .config(OrchestratorConfig::default())
            .build();

        Self {
            dir,
            store,
            provider,
            orchestrator,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Run a fresh execution to its resting state.
    pub async fn run_to_rest(&self) -> (ExecutionId, Vec<ExecutionEvent>, ExecutionStatus) {
        let run = self.orchestrator.start_execution(TASK_ID).await.expect("start");
        let id = run.execution_id();
        let (events, status) = run.collect().await;
        (id, events, status)
    }
}

pub fn kinds(events: &[ExecutionEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.payload.kind()).collect()
}

pub fn assert_done_last(events: &[ExecutionEvent]) {
    assert_eq!(events.last().map(|e| e.payload.kind()), Some("done"));
    let dones = events.iter().filter(|e| e.payload.kind() == "done").count();
    assert_eq!(dones, 1, "exactly one done event");
}
