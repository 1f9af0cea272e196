use crate::run::{RunOutcome, StepStatus};
use bringup_schema::{RunId, RunMode, TargetId};
use serde::{Deserialize, Serialize};

/// Progress published by a Run, in order, for a CLI or GUI to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: RunId,
        target: TargetId,
        mode: RunMode,
        steps: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    StepStarted { index: usize, name: String },
    #[serde(rename_all = "camelCase")]
    StepSucceeded {
        index: usize,
        name: String,
        duration_ms: u64,
        already_satisfied: bool,
    },
    #[serde(rename_all = "camelCase")]
    StepFailed {
        index: usize,
        name: String,
        duration_ms: u64,
        fatal: bool,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    StepSkipped {
        index: usize,
        name: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        run_id: RunId,
        outcome: RunOutcome,
        cancelled: bool,
    },
}

impl ProgressEvent {
    /// The status a Step event moves its Step into.
    pub fn step_status(&self) -> Option<StepStatus> {
        match self {
            ProgressEvent::StepStarted { .. } => Some(StepStatus::Running),
            ProgressEvent::StepSucceeded { .. } => Some(StepStatus::Succeeded),
            ProgressEvent::StepFailed { .. } => Some(StepStatus::Failed),
            ProgressEvent::StepSkipped { .. } => Some(StepStatus::Skipped),
            ProgressEvent::RunStarted { .. } | ProgressEvent::RunCompleted { .. } => None,
        }
    }
}
