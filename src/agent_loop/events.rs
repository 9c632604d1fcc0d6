//! Execution event stream.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::sandbox::{LimitType, SandboxLimits, UsageSummary};
use crate::types::{Action, ExecutionId, ExecutionStatus, Question};

/// Concrete event payloads emitted while an execution runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExecutionEventPayload {
    Status {
        status: ExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    SandboxLimits {
        limits: SandboxLimits,
    },
    Action {
        action: Action,
    },
    SandboxUsage {
        summary: UsageSummary,
    },
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    Question {
        question: Question,
    },
    TaskCompleted {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    LimitExceeded {
        limit_type: LimitType,
        limit_value: u64,
        current_value: u64,
    },
    Error {
        message: String,
    },
    /// Always the last event of a stream.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ExecutionStatus>,
    },
}

impl ExecutionEventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::SandboxLimits { .. } => "sandboxLimits",
            Self::Action { .. } => "action",
            Self::SandboxUsage { .. } => "sandboxUsage",
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::Question { .. } => "question",
            Self::TaskCompleted { .. } => "taskCompleted",
            Self::LimitExceeded { .. } => "limitExceeded",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }
}

/// Envelope for execution events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    /// Starts at 1 for each stream.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: ExecutionEventPayload,
}

/// Producer half of an execution's event stream.
///
/// Nothing is sent after `done`. Dropping an emitter that never sent `done`
/// sends it with the last status it saw, so every stream terminates.
pub struct EventEmitter {
    execution_id: ExecutionId,
    seq: AtomicU64,
    done: AtomicBool,
    last_status: Mutex<Option<ExecutionStatus>>,
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn channel(execution_id: ExecutionId) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Self {
            execution_id,
            seq: AtomicU64::new(1),
            done: AtomicBool::new(false),
            last_status: Mutex::new(None),
            tx,
        };
        let stream = EventStream {
            inner: UnboundedReceiverStream::new(rx),
        };
        (emitter, stream)
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn emit(&self, payload: ExecutionEventPayload) {
        if self.done.load(Ordering::SeqCst) {
            tracing::debug!(kind = payload.kind(), "event after done dropped");
            return;
        }
        if let ExecutionEventPayload::Status { status, .. } = &payload {
            *self.last_status.lock().unwrap_or_else(|p| p.into_inner()) = Some(*status);
        }
        if matches!(payload, ExecutionEventPayload::Done { .. }) {
            self.done.store(true, Ordering::SeqCst);
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        // A dropped subscriber does not stop the execution.
        let _ = self.tx.send(ExecutionEvent {
            execution_id: self.execution_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }

    pub fn status(&self, status: ExecutionStatus) {
        self.emit(ExecutionEventPayload::Status {
            status,
            message: None,
        });
    }

    pub fn action(&self, action: &Action) {
        self.emit(ExecutionEventPayload::Action {
            action: action.clone(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(ExecutionEventPayload::Error {
            message: message.into(),
        });
    }

    pub fn done(&self, status: ExecutionStatus) {
        self.emit(ExecutionEventPayload::Done {
            status: Some(status),
        });
    }
}

impl Drop for EventEmitter {
    fn drop(&mut self) {
        if !self.done.load(Ordering::SeqCst) {
            let status = *self.last_status.lock().unwrap_or_else(|p| p.into_inner());
            self.emit(ExecutionEventPayload::Done { status });
        }
    }
}

/// Consumer half of an execution's event stream. Ends after `done`.
pub struct EventStream {
    inner: UnboundedReceiverStream<ExecutionEvent>,
}

impl Stream for EventStream {
    type Item = ExecutionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
