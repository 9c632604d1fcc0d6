//! Taskloop: approval-gated agent execution orchestrator.
//!
//! Drives a tool-calling model against a task inside a project's working
//! directory. Reads run immediately; writes, edits, deletes, commands and
//! task completion are recorded as proposals and run later as an approved
//! batch. The agent can pause to ask the user a question and is resumed once
//! it is answered. Every activation is bounded by six sandbox budgets.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use taskloop::prelude::*;
//!
//! # async fn example(provider: Arc<dyn ModelProvider>) -> taskloop::error::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.upsert_project(Project::new("proj", "/srv/checkout")).await;
//! store.insert_task(Task::new("task-1", "proj", "Add a README")).await;
//!
//! let orchestrator = Orchestrator::builder()
//!     .executions(store.clone())
//!     .tasks(store.clone())
//!     .provider(provider)
//!     .build();
//!
//! let mut run = orchestrator.start_execution("task-1").await?;
//! if let Some(mut events) = run.take_events() {
//!     while let Some(event) = events.next().await {
//!         println!("{}", event.payload.kind());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod provider;
pub mod sandbox;
pub mod stop;
pub mod store;
pub mod tools;
pub mod types;
pub mod util;
