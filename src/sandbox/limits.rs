//! Sandbox budgets and the per-activation usage tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio::time::Instant;

use crate::error::{Result, TaskloopError};

const DEFAULT_MAX_EXECUTION_TIME_SECONDS: u64 = 600;
const DEFAULT_MAX_TOKENS: u64 = 200_000;
const DEFAULT_MAX_FILE_OPERATIONS: u64 = 100;
const DEFAULT_MAX_COMMANDS: u64 = 25;
const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;
const DEFAULT_MAX_STEPS: u64 = 25;

/// One budget dimension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum LimitType {
    MaxExecutionTimeSeconds,
    MaxTokens,
    MaxFileOperations,
    MaxCommands,
    MaxFileSizeBytes,
    MaxSteps,
}

/// Resource budget for one activation. A value of 0 disables that dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxLimits {
    pub max_execution_time_seconds: u64,
    pub max_tokens: u64,
    pub max_file_operations: u64,
    pub max_commands: u64,
    pub max_file_size_bytes: u64,
    pub max_steps: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_execution_time_seconds: DEFAULT_MAX_EXECUTION_TIME_SECONDS,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_file_operations: DEFAULT_MAX_FILE_OPERATIONS,
            max_commands: DEFAULT_MAX_COMMANDS,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl SandboxLimits {
    /// Every dimension disabled.
    pub fn unlimited() -> Self {
        Self {
            max_execution_time_seconds: 0,
            max_tokens: 0,
            max_file_operations: 0,
            max_commands: 0,
            max_file_size_bytes: 0,
            max_steps: 0,
        }
    }

    /// Parse a stored JSON column, falling back to `fallback` when the value
    /// is missing or malformed. Missing keys take their default.
    pub fn parse_or(raw: Option<&str>, fallback: SandboxLimits) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return fallback;
        };
        match serde_json::from_str::<SandboxLimits>(raw) {
            Ok(limits) => limits,
            Err(err) => {
                tracing::warn!(error = %err, "invalid stored sandbox limits, using defaults");
                fallback
            }
        }
    }

    /// [`SandboxLimits::parse_or`] with the built-in defaults.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        Self::parse_or(raw, Self::default())
    }

    pub fn get(&self, limit_type: LimitType) -> u64 {
        match limit_type {
            LimitType::MaxExecutionTimeSeconds => self.max_execution_time_seconds,
            LimitType::MaxTokens => self.max_tokens,
            LimitType::MaxFileOperations => self.max_file_operations,
            LimitType::MaxCommands => self.max_commands,
            LimitType::MaxFileSizeBytes => self.max_file_size_bytes,
            LimitType::MaxSteps => self.max_steps,
        }
    }
}

/// Counters for one activation. Never decrease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxUsage {
    pub execution_start_time: DateTime<Utc>,
    pub tokens_used: u64,
    pub file_operations_count: u64,
    pub commands_count: u64,
    pub steps_count: u64,
}

impl SandboxUsage {
    fn started_now() -> Self {
        Self {
            execution_start_time: Utc::now(),
            tokens_used: 0,
            file_operations_count: 0,
            commands_count: 0,
            steps_count: 0,
        }
    }
}

/// Percent of each budget consumed. Disabled dimensions report 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePercentages {
    pub execution_time: f64,
    pub tokens: f64,
    pub file_operations: f64,
    pub commands: f64,
    pub steps: f64,
}

/// Snapshot returned by [`LimitsTracker::usage_summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub limits: SandboxLimits,
    pub usage: SandboxUsage,
    pub elapsed_seconds: u64,
    pub percentages: UsagePercentages,
}

/// Counts resource use for one activation and enforces its budget.
///
/// Every `track_*` method increments first and then checks, so the error
/// carries the post-increment value.
#[derive(Debug, Clone)]
pub struct LimitsTracker {
    limits: SandboxLimits,
    usage: SandboxUsage,
    started: Instant,
}

impl LimitsTracker {
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            limits,
            usage: SandboxUsage::started_now(),
            started: Instant::now(),
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn usage(&self) -> &SandboxUsage {
        &self.usage
    }

    pub fn track_tokens(&mut self, input: u64, output: u64) -> Result<()> {
        self.usage.tokens_used = self
            .usage
            .tokens_used
            .saturating_add(input.saturating_add(output));
        check(LimitType::MaxTokens, self.limits.max_tokens, self.usage.tokens_used)
    }

    pub fn track_file_operation(&mut self) -> Result<()> {
        self.usage.file_operations_count += 1;
        check(
            LimitType::MaxFileOperations,
            self.limits.max_file_operations,
            self.usage.file_operations_count,
        )
    }

    pub fn track_command(&mut self) -> Result<()> {
        self.usage.commands_count += 1;
        check(
            LimitType::MaxCommands,
            self.limits.max_commands,
            self.usage.commands_count,
        )
    }

    pub fn track_step(&mut self) -> Result<()> {
        self.usage.steps_count += 1;
        check(LimitType::MaxSteps, self.limits.max_steps, self.usage.steps_count)
    }

    pub fn check_time_limit(&self) -> Result<()> {
        check(
            LimitType::MaxExecutionTimeSeconds,
            self.limits.max_execution_time_seconds,
            self.elapsed_seconds(),
        )
    }

    /// Precondition for a write; does not count as a file operation.
    pub fn validate_file_size(&self, bytes: u64) -> Result<()> {
        check(
            LimitType::MaxFileSizeBytes,
            self.limits.max_file_size_bytes,
            bytes,
        )
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn usage_summary(&self) -> UsageSummary {
        let elapsed_seconds = self.elapsed_seconds();
        UsageSummary {
            limits: self.limits,
            usage: self.usage.clone(),
            elapsed_seconds,
            percentages: UsagePercentages {
                execution_time: percent(elapsed_seconds, self.limits.max_execution_time_seconds),
                tokens: percent(self.usage.tokens_used, self.limits.max_tokens),
                file_operations: percent(
                    self.usage.file_operations_count,
                    self.limits.max_file_operations,
                ),
                commands: percent(self.usage.commands_count, self.limits.max_commands),
                steps: percent(self.usage.steps_count, self.limits.max_steps),
            },
        }
    }
}

fn check(limit_type: LimitType, limit_value: u64, current_value: u64) -> Result<()> {
    if limit_value > 0 && current_value > limit_value {
        return Err(TaskloopError::LimitExceeded {
            limit_type,
            limit_value,
            current_value,
        });
    }
    Ok(())
}

fn percent(current: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (current as f64 / limit as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn only(limit_type: LimitType, value: u64) -> SandboxLimits {
        let mut limits = SandboxLimits::unlimited();
        match limit_type {
            LimitType::MaxExecutionTimeSeconds => limits.max_execution_time_seconds = value,
            LimitType::MaxTokens => limits.max_tokens = value,
            LimitType::MaxFileOperations => limits.max_file_operations = value,
            LimitType::MaxCommands => limits.max_commands = value,
            LimitType::MaxFileSizeBytes => limits.max_file_size_bytes = value,
            LimitType::MaxSteps => limits.max_steps = value,
        }
        limits
    }

    fn expect_exceeded(result: Result<()>) -> (LimitType, u64, u64) {
        match result {
            Err(err) => err.limit_exceeded().expect("limit error"),
            Ok(()) => panic!("expected LimitExceeded"),
        }
    }

    #[test]
    fn steps_throw_once_strictly_over_the_limit() {
        let mut tracker = LimitsTracker::new(only(LimitType::MaxSteps, 2));
        tracker.track_step().expect("step 1");
        tracker.track_step().expect("step 2");
        let exceeded = expect_exceeded(tracker.track_step());
        assert_eq!(exceeded, (LimitType::MaxSteps, 2, 3));
    }

    #[test]
    fn tokens_accumulate_input_and_output() {
        let mut tracker = LimitsTracker::new(only(LimitType::MaxTokens, 100));
        tracker.track_tokens(40, 40).expect("within budget");
        tracker.track_tokens(10, 10).expect("exactly at budget");
        let exceeded = expect_exceeded(tracker.track_tokens(1, 0));
        assert_eq!(exceeded, (LimitType::MaxTokens, 100, 101));
    }

    #[test]
    fn file_operations_and_commands_are_independent() {
        let mut limits = SandboxLimits::unlimited();
        limits.max_file_operations = 1;
        limits.max_commands = 1;
        let mut tracker = LimitsTracker::new(limits);
        tracker.track_file_operation().expect("first file op");
        tracker.track_command().expect("first command");
        assert_eq!(
            expect_exceeded(tracker.track_command()),
            (LimitType::MaxCommands, 1, 2)
        );
        assert_eq!(
            expect_exceeded(tracker.track_file_operation()),
            (LimitType::MaxFileOperations, 1, 2)
        );
    }

    #[test]
    fn zero_limit_never_throws() {
        let mut tracker = LimitsTracker::new(SandboxLimits::unlimited());
        for _ in 0..10_000 {
            tracker.track_step().expect("unbounded steps");
            tracker.track_file_operation().expect("unbounded file ops");
            tracker.track_command().expect("unbounded commands");
        }
        tracker.track_tokens(u64::MAX / 2, u64::MAX / 2).expect("unbounded tokens");
        tracker.validate_file_size(u64::MAX).expect("unbounded file size");
        tracker.check_time_limit().expect("unbounded time");
    }

    #[test]
    fn file_size_check_does_not_count_as_an_operation() {
        let tracker = LimitsTracker::new(only(LimitType::MaxFileSizeBytes, 10));
        tracker.validate_file_size(10).expect("at limit");
        assert_eq!(
            expect_exceeded(tracker.validate_file_size(11)),
            (LimitType::MaxFileSizeBytes, 10, 11)
        );
        assert_eq!(tracker.usage().file_operations_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn time_limit_uses_elapsed_wall_clock() {
        let tracker = LimitsTracker::new(only(LimitType::MaxExecutionTimeSeconds, 5));
        tokio::time::advance(Duration::from_secs(5)).await;
        tracker.check_time_limit().expect("at limit");
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(
            expect_exceeded(tracker.check_time_limit()),
            (LimitType::MaxExecutionTimeSeconds, 5, 7)
        );
    }

    #[test]
    fn summary_reports_zero_percent_for_disabled_limits() {
        let mut limits = SandboxLimits::unlimited();
        limits.max_steps = 4;
        let mut tracker = LimitsTracker::new(limits);
        tracker.track_step().expect("step");
        tracker.track_tokens(500, 500).expect("tokens");

        let summary = tracker.usage_summary();
        assert_eq!(summary.percentages.steps, 25.0);
        assert_eq!(summary.percentages.tokens, 0.0);
        assert_eq!(summary.usage.tokens_used, 1000);
        // Snapshot has no side effects.
        assert_eq!(tracker.usage().steps_count, 1);
    }

    #[test]
    fn stored_limits_fall_back_to_defaults() {
        assert_eq!(SandboxLimits::parse_or_default(None), SandboxLimits::default());
        assert_eq!(
            SandboxLimits::parse_or_default(Some("{not json")),
            SandboxLimits::default()
        );
        let parsed = SandboxLimits::parse_or_default(Some(r#"{"maxSteps": 2, "maxTokens": 0}"#));
        assert_eq!(parsed.max_steps, 2);
        assert_eq!(parsed.max_tokens, 0);
        assert_eq!(parsed.max_commands, SandboxLimits::default().max_commands);
    }

    #[test]
    fn limit_type_renders_camel_case() {
        assert_eq!(LimitType::MaxSteps.to_string(), "maxSteps");
        assert_eq!(
            "maxFileSizeBytes".parse::<LimitType>().ok(),
            Some(LimitType::MaxFileSizeBytes)
        );
    }
}
