//! The fixed tool catalog and typed parsing of model tool calls.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use super::schema::{ObjectSchema, ToolDefinition};
use crate::error::{Result, TaskloopError};
use crate::types::{Action, ActionType};

/// Every tool the agent can call.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ToolName {
    ReadFile,
    ListDirectory,
    WriteFile,
    EditFile,
    DeleteFile,
    RunCommand,
    CompleteTask,
    AskQuestion,
}

impl ToolName {
    pub fn action_type(self) -> ActionType {
        match self {
            Self::ReadFile => ActionType::Read,
            Self::ListDirectory => ActionType::List,
            Self::WriteFile => ActionType::Write,
            Self::EditFile => ActionType::Edit,
            Self::DeleteFile => ActionType::Delete,
            Self::RunCommand => ActionType::Command,
            Self::CompleteTask => ActionType::CompleteTask,
            Self::AskQuestion => ActionType::AskQuestion,
        }
    }

    pub fn from_action_type(action_type: ActionType) -> Self {
        match action_type {
            ActionType::Read => Self::ReadFile,
            ActionType::List => Self::ListDirectory,
            ActionType::Write => Self::WriteFile,
            ActionType::Edit => Self::EditFile,
            ActionType::Delete => Self::DeleteFile,
            ActionType::Command => Self::RunCommand,
            ActionType::CompleteTask => Self::CompleteTask,
            ActionType::AskQuestion => Self::AskQuestion,
        }
    }

    /// Tools that count against the file-operation budget.
    pub fn is_file_operation(self) -> bool {
        matches!(
            self,
            Self::ReadFile | Self::ListDirectory | Self::WriteFile | Self::EditFile | Self::DeleteFile
        )
    }

    /// Approval default when the project does not override it.
    pub fn requires_approval_by_default(self) -> bool {
        !matches!(self, Self::ReadFile | Self::ListDirectory)
    }

    fn description(self) -> &'static str {
        match self {
            Self::ReadFile => "Read a file in the working directory as UTF-8 text",
            Self::ListDirectory => "List the entries of a directory in the working directory",
            Self::WriteFile => "Create or overwrite a file with the given content",
            Self::EditFile => "Replace the first occurrence of `search` in a file with `replace`",
            Self::DeleteFile => "Delete a file",
            Self::RunCommand => "Run a shell command from the working directory",
            Self::CompleteTask => "Declare the task finished and summarize what was done",
            Self::AskQuestion => {
                "Ask the user a clarifying question; analysis pauses until it is answered"
            }
        }
    }

    fn parameters(self) -> serde_json::Value {
        let schema = ObjectSchema::new();
        let schema = match self {
            Self::ReadFile | Self::DeleteFile => {
                schema.required("path", "Path relative to the working directory")
            }
            Self::ListDirectory => schema.optional("path", "Directory to list; defaults to \".\""),
            Self::WriteFile => schema
                .required("path", "Path relative to the working directory")
                .required("content", "Full file content"),
            Self::EditFile => schema
                .required("path", "Path relative to the working directory")
                .required("search", "Exact text to find")
                .required("replace", "Replacement text"),
            Self::RunCommand => schema.required("command", "Shell command line"),
            Self::CompleteTask => schema.required("summary", "What was done"),
            Self::AskQuestion => schema
                .required("question", "The question for the user")
                .optional("context", "Why the answer is needed"),
        };
        schema.build()
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Definitions for the whole catalog, in declaration order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::iter().map(ToolName::definition).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListArgs {
    #[serde(default = "current_dir")]
    pub path: String,
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditArgs {
    pub path: String,
    pub search: String,
    pub replace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgs {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteArgs {
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionArgs {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    ReadFile(PathArgs),
    ListDirectory(ListArgs),
    WriteFile(WriteArgs),
    EditFile(EditArgs),
    DeleteFile(PathArgs),
    RunCommand(CommandArgs),
    CompleteTask(CompleteArgs),
    AskQuestion(QuestionArgs),
}

impl ToolInvocation {
    /// Parse a model tool call. Arguments may arrive as an object or as a
    /// JSON-encoded string.
    pub fn parse(name: &str, arguments: &serde_json::Value) -> Result<Self> {
        let tool: ToolName = name
            .parse()
            .map_err(|_| TaskloopError::InvalidArgument(format!("unknown tool '{name}'")))?;
        Self::from_parts(tool, arguments)
    }

    /// Rebuild the invocation recorded on an action.
    pub fn from_action(action: &Action) -> Result<Self> {
        Self::from_parts(ToolName::from_action_type(action.action_type), &action.params)
    }

    fn from_parts(tool: ToolName, arguments: &serde_json::Value) -> Result<Self> {
        let arguments = normalize_arguments(arguments)?;
        Ok(match tool {
            ToolName::ReadFile => Self::ReadFile(decode(tool, arguments)?),
            ToolName::ListDirectory => Self::ListDirectory(decode(tool, arguments)?),
            ToolName::WriteFile => Self::WriteFile(decode(tool, arguments)?),
            ToolName::EditFile => Self::EditFile(decode(tool, arguments)?),
            ToolName::DeleteFile => Self::DeleteFile(decode(tool, arguments)?),
            ToolName::RunCommand => Self::RunCommand(decode(tool, arguments)?),
            ToolName::CompleteTask => Self::CompleteTask(decode(tool, arguments)?),
            ToolName::AskQuestion => Self::AskQuestion(decode(tool, arguments)?),
        })
    }

    pub fn tool_name(&self) -> ToolName {
        match self {
            Self::ReadFile(_) => ToolName::ReadFile,
            Self::ListDirectory(_) => ToolName::ListDirectory,
            Self::WriteFile(_) => ToolName::WriteFile,
            Self::EditFile(_) => ToolName::EditFile,
            Self::DeleteFile(_) => ToolName::DeleteFile,
            Self::RunCommand(_) => ToolName::RunCommand,
            Self::CompleteTask(_) => ToolName::CompleteTask,
            Self::AskQuestion(_) => ToolName::AskQuestion,
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.tool_name().action_type()
    }

    /// The path argument for filesystem tools.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::ReadFile(args) | Self::DeleteFile(args) => Some(&args.path),
            Self::ListDirectory(args) => Some(&args.path),
            Self::WriteFile(args) => Some(&args.path),
            Self::EditFile(args) => Some(&args.path),
            _ => None,
        }
    }

    /// Arguments as stored on the action record.
    pub fn params(&self) -> serde_json::Value {
        let value = match self {
            Self::ReadFile(args) | Self::DeleteFile(args) => serde_json::to_value(args),
            Self::ListDirectory(args) => serde_json::to_value(args),
            Self::WriteFile(args) => serde_json::to_value(args),
            Self::EditFile(args) => serde_json::to_value(args),
            Self::RunCommand(args) => serde_json::to_value(args),
            Self::CompleteTask(args) => serde_json::to_value(args),
            Self::AskQuestion(args) => serde_json::to_value(args),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Short human-readable description used in proposal messages.
    pub fn describe(&self) -> String {
        match self {
            Self::ReadFile(args) => format!("read {}", args.path),
            Self::ListDirectory(args) => format!("list {}", args.path),
            Self::WriteFile(args) => {
                format!("write {} ({} bytes)", args.path, args.content.len())
            }
            Self::EditFile(args) => format!("edit {}", args.path),
            Self::DeleteFile(args) => format!("delete {}", args.path),
            Self::RunCommand(args) => format!("run `{}`", args.command),
            Self::CompleteTask(_) => "mark the task complete".to_string(),
            Self::AskQuestion(args) => format!("ask \"{}\"", args.question),
        }
    }
}

fn normalize_arguments(arguments: &serde_json::Value) -> Result<serde_json::Value> {
    match arguments {
        serde_json::Value::String(raw) if raw.trim().is_empty() => {
            Ok(serde_json::Value::Object(Default::default()))
        }
        serde_json::Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            TaskloopError::InvalidArgument(format!("arguments are not valid JSON: {e}"))
        }),
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        other => Ok(other.clone()),
    }
}

fn decode<T: DeserializeOwned>(tool: ToolName, arguments: serde_json::Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| TaskloopError::InvalidArgument(format!("{tool}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_names_are_camel_case() {
        let names: Vec<String> = tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "readFile",
                "listDirectory",
                "writeFile",
                "editFile",
                "deleteFile",
                "runCommand",
                "completeTask",
                "askQuestion",
            ]
        );
    }

    #[test]
    fn parses_object_arguments() {
        let call = ToolInvocation::parse(
            "writeFile",
            &json!({ "path": "src/main.rs", "content": "fn main() {}" }),
        )
        .unwrap();
        assert_eq!(call.tool_name(), ToolName::WriteFile);
        assert_eq!(call.path(), Some("src/main.rs"));
        assert_eq!(call.params()["content"], "fn main() {}");
    }

    #[test]
    fn parses_string_encoded_arguments() {
        let call =
            ToolInvocation::parse("runCommand", &json!("{\"command\":\"cargo test\"}")).unwrap();
        assert_eq!(
            call,
            ToolInvocation::RunCommand(CommandArgs {
                command: "cargo test".into()
            })
        );
    }

    #[test]
    fn list_directory_defaults_to_root() {
        let call = ToolInvocation::parse("listDirectory", &json!({})).unwrap();
        assert_eq!(call.path(), Some("."));
    }

    #[test]
    fn missing_argument_is_invalid() {
        let err = ToolInvocation::parse("editFile", &json!({ "path": "a" })).unwrap_err();
        assert!(matches!(err, TaskloopError::InvalidArgument(_)));
        assert!(err.to_string().contains("editFile"));
    }

    #[test]
    fn unknown_tool_is_invalid() {
        let err = ToolInvocation::parse("formatDisk", &json!({})).unwrap_err();
        assert!(err.to_string().contains("formatDisk"));
    }

    #[test]
    fn default_approval_gates_mutations() {
        assert!(!ToolName::ReadFile.requires_approval_by_default());
        assert!(!ToolName::ListDirectory.requires_approval_by_default());
        for tool in [
            ToolName::WriteFile,
            ToolName::EditFile,
            ToolName::DeleteFile,
            ToolName::RunCommand,
            ToolName::CompleteTask,
        ] {
            assert!(tool.requires_approval_by_default(), "{tool}");
        }
    }

    #[test]
    fn action_type_mapping_round_trips() {
        for tool in ToolName::iter() {
            assert_eq!(ToolName::from_action_type(tool.action_type()), tool);
        }
    }
}
