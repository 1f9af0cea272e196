use bringup_schema::{RunId, RunMode, SnapshotId, TargetId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    /// Every fatal Step passed but at least one non-fatal Step failed.
    PartiallySucceeded,
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Succeeded => write!(f, "succeeded"),
            RunOutcome::PartiallySucceeded => write!(f, "partially succeeded"),
            RunOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub fatal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub already_satisfied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepRecord {
    pub fn pending(name: impl Into<String>, fatal: bool) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            fatal,
            started_at: None,
            duration_ms: 0,
            attempts: 0,
            already_satisfied: false,
            error: None,
            error_kind: None,
            warnings: Vec::new(),
        }
    }
}

/// Everything a finished Run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub target: TargetId,
    pub mode: RunMode,
    pub started_at: String,
    pub finished_at: String,
    pub steps: Vec<StepRecord>,
    pub outcome: RunOutcome,
    #[serde(default)]
    pub cancelled: bool,
    /// Run-level error: connectivity failure or the fatal Step failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Snapshot taken by this Run and still present on the Target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotId>,
}

impl RunResult {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Overall outcome from the Step records.
pub fn summarize(steps: &[StepRecord], aborted: bool) -> RunOutcome {
    if aborted || steps.iter().any(|s| s.fatal && s.status == StepStatus::Failed) {
        RunOutcome::Failed
    } else if steps.iter().any(|s| s.status == StepStatus::Failed) {
        RunOutcome::PartiallySucceeded
    } else {
        RunOutcome::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: StepStatus, fatal: bool) -> StepRecord {
        StepRecord {
            status,
            ..StepRecord::pending(name, fatal)
        }
    }

    #[test]
    fn outcome_distinguishes_partial_success() {
        let ok = [
            record("runtime", StepStatus::Succeeded, true),
            record("service:node-red", StepStatus::Succeeded, false),
        ];
        assert_eq!(summarize(&ok, false), RunOutcome::Succeeded);

        let partial = [
            record("runtime", StepStatus::Succeeded, true),
            record("service:node-red", StepStatus::Failed, false),
        ];
        assert_eq!(summarize(&partial, false), RunOutcome::PartiallySucceeded);

        let failed = [
            record("runtime", StepStatus::Failed, true),
            record("service:node-red", StepStatus::Skipped, false),
        ];
        assert_eq!(summarize(&failed, false), RunOutcome::Failed);
        assert_eq!(summarize(&ok, true), RunOutcome::Failed);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RunOutcome::PartiallySucceeded).unwrap(),
            "\"partially_succeeded\""
        );
        assert_eq!(RunOutcome::PartiallySucceeded.to_string(), "partially succeeded");
    }
}
