//! Shared primitive types used across the pipeline.

use serde::{Deserialize, Serialize};

/// Identifier of a client-group / profit-center pairing (a CPC).
pub type EntityId = i64;

/// The target year a budget or forecast is generated for.
pub type PlanningPeriod = i32;

pub type CalendarYear = i32;

/// Calendar month, 1 = January .. 12 = December.
pub type CalendarMonth = u32;

/// Forecast snapshot number within one planning period.
pub type ForecastVersion = u32;

/// Correlates log lines and summaries of a single batch run.
pub type RunId = String;

/// Every pipeline operation runs either as a pre-flight check or for real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Validate and count, but leave every table untouched.
    DryRun,
    Commit,
}

impl RunMode {
    pub fn from_dry_run_flag(dry_run: bool) -> Self {
        if dry_run {
            RunMode::DryRun
        } else {
            RunMode::Commit
        }
    }

    pub fn is_dry_run(self) -> bool {
        matches!(self, RunMode::DryRun)
    }
}

pub fn new_run_id(stage: &str) -> RunId {
    format!("{stage}-{}", uuid::Uuid::new_v4())
}
