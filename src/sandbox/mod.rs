//! Sandbox primitives: resource budgets and working-root confinement.

pub mod limits;
pub mod path;

pub use limits::{LimitType, LimitsTracker, SandboxLimits, SandboxUsage, UsagePercentages, UsageSummary};
