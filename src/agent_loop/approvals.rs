//! Per-tool approval settings and user decisions on proposals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tools::ToolName;
use crate::types::ActionStatus;

/// How a tool call is handled at dispatch time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Run now and record the result.
    Immediate,
    /// Record a proposal and wait for the user.
    Gated,
}

/// A user's decision on proposed actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn target_status(self) -> ActionStatus {
        match self {
            Self::Approve => ActionStatus::Approved,
            Self::Reject => ActionStatus::Rejected,
        }
    }
}

/// Project-level map from tool name to "requires approval".
///
/// Tools absent from the map use their built-in default. `askQuestion` is
/// not configurable; it always pauses for the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSettings {
    overrides: BTreeMap<ToolName, bool>,
}

impl ApprovalSettings {
    /// Parse the stored JSON object. Malformed input yields the defaults;
    /// unknown keys and non-boolean values are skipped.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        let map = match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(error = %err, "invalid stored approval settings, using defaults");
                return Self::default();
            }
        };

        let mut settings = Self::default();
        for (key, value) in map {
            match (key.parse::<ToolName>(), value.as_bool()) {
                (Ok(ToolName::AskQuestion), _) => {}
                (Ok(tool), Some(required)) => {
                    settings.overrides.insert(tool, required);
                }
                _ => tracing::debug!(%key, "skipping approval setting"),
            }
        }
        settings
    }

    pub fn set(mut self, tool: ToolName, requires_approval: bool) -> Self {
        if tool != ToolName::AskQuestion {
            self.overrides.insert(tool, requires_approval);
        }
        self
    }

    pub fn requires_approval(&self, tool: ToolName) -> bool {
        self.overrides
            .get(&tool)
            .copied()
            .unwrap_or_else(|| tool.requires_approval_by_default())
    }

    /// Policy for everything except `askQuestion`, which the mediator
    /// handles separately.
    pub fn policy_for(&self, tool: ToolName) -> ApprovalPolicy {
        if self.requires_approval(tool) {
            ApprovalPolicy::Gated
        } else {
            ApprovalPolicy::Immediate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_gate_mutations_only() {
        let settings = ApprovalSettings::parse_or_default(None);
        assert_eq!(settings.policy_for(ToolName::ReadFile), ApprovalPolicy::Immediate);
        assert_eq!(settings.policy_for(ToolName::WriteFile), ApprovalPolicy::Gated);
        assert_eq!(settings.policy_for(ToolName::CompleteTask), ApprovalPolicy::Gated);
    }

    #[test]
    fn overrides_apply_per_tool() {
        let settings = ApprovalSettings::parse_or_default(Some(
            r#"{"writeFile": false, "readFile": true, "bogusTool": true, "runCommand": "yes"}"#,
        ));
        assert!(!settings.requires_approval(ToolName::WriteFile));
        assert!(settings.requires_approval(ToolName::ReadFile));
        assert!(settings.requires_approval(ToolName::RunCommand));
    }

    #[test]
    fn malformed_json_uses_defaults() {
        let settings = ApprovalSettings::parse_or_default(Some("{not json"));
        assert_eq!(settings, ApprovalSettings::default());
    }

    #[test]
    fn ask_question_cannot_be_configured() {
        let settings = ApprovalSettings::default().set(ToolName::AskQuestion, false);
        assert_eq!(settings, ApprovalSettings::default());
    }
}
