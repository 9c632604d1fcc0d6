//! Agent tools: the catalog the model sees and the executor that runs them.

pub mod catalog;
pub mod executor;
pub mod schema;

pub use catalog::{tool_definitions, ToolInvocation, ToolName};
pub use executor::{apply_edit, render_listing, CommandOutput, DirEntry, EntryKind, LocalExecutor, ToolExecutor};
pub use schema::{ObjectSchema, ToolDefinition};
