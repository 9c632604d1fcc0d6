//! Orchestrator configuration (layered: code > env > config file).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sandbox::SandboxLimits;

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 32_768;

const ENV_PREFIX: &str = "TASKLOOP_";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Process-wide settings for the orchestrator.
///
/// Project settings win over `default_limits` for each activation; this only
/// supplies the fallback used when a project stores nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct OrchestratorConfig {
    #[builder(default)]
    pub default_limits: SandboxLimits,
    /// Upper bound on a single model step; 0 disables it.
    #[builder(default = DEFAULT_PROVIDER_TIMEOUT_SECS)]
    pub provider_timeout_secs: u64,
    #[builder(default = DEFAULT_COMMAND_TIMEOUT_SECS)]
    pub command_timeout_secs: u64,
    /// Cap on tool output returned to the model; 0 keeps everything.
    #[builder(default = DEFAULT_MAX_OUTPUT_BYTES)]
    pub max_output_bytes: usize,
    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OrchestratorConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Platform config location, e.g. `~/.config/taskloop/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "taskloop", "taskloop")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Defaults overlaid with `TASKLOOP_*` environment variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env_overrides()
    }

    /// Config file (from `TASKLOOP_CONFIG` or the platform path, when present)
    /// overlaid with environment variables.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = std::env::var_os(format!("{ENV_PREFIX}CONFIG"))
            .map(PathBuf::from)
            .or_else(Self::default_config_path);
        let base = match path {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::load_file(&path)?
            }
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Apply `TASKLOOP_*` overrides. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_number("PROVIDER_TIMEOUT_SECS") {
            self.provider_timeout_secs = v;
        }
        if let Some(v) = env_number("COMMAND_TIMEOUT_SECS") {
            self.command_timeout_secs = v;
        }
        if let Some(v) = env_number("MAX_OUTPUT_BYTES") {
            self.max_output_bytes = v as usize;
        }
        if let Ok(prompt) = std::env::var(format!("{ENV_PREFIX}SYSTEM_PROMPT")) {
            if !prompt.trim().is_empty() {
                self.system_prompt = Some(prompt);
            }
        }

        let limits = &mut self.default_limits;
        let limit_mappings: [(&str, &mut u64); 6] = [
            ("MAX_EXECUTION_TIME_SECONDS", &mut limits.max_execution_time_seconds),
            ("MAX_TOKENS", &mut limits.max_tokens),
            ("MAX_FILE_OPERATIONS", &mut limits.max_file_operations),
            ("MAX_COMMANDS", &mut limits.max_commands),
            ("MAX_FILE_SIZE_BYTES", &mut limits.max_file_size_bytes),
            ("MAX_STEPS", &mut limits.max_steps),
        ];
        for (suffix, slot) in limit_mappings {
            if let Some(v) = env_number(suffix) {
                *slot = v;
            }
        }
        self
    }
}

fn env_number(suffix: &str) -> Option<u64> {
    let key = format!("{ENV_PREFIX}{suffix}");
    let raw = std::env::var(&key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(%key, %raw, "ignoring non-numeric environment override");
            None
        }
    }
}
