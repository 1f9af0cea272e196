//! Device configuration orchestrator for bringup.
//!
//! This crate ties the config schema, the remote executor and the local state
//! store together into the `Orchestrator`: it plans a Run from an operator's
//! mode and step selection, drives each Step's idempotent `Operation`
//! (precheck, apply, postcheck) through the retry and fallback controllers,
//! applies network mode transitions through the `netmode` state machine, and
//! brackets the whole Run with a configuration backup and restore. Progress is
//! published as `ProgressEvent`s and persisted as a JSON-lines run log.

pub mod backup;
pub mod concurrency;
pub mod context;
pub mod engine;
pub mod events;
pub mod fallback;
pub mod netmode;
pub mod operation;
pub mod ops;
pub mod plan;
pub mod retry;
pub mod routes;
pub mod run;

pub use backup::{snapshot_path, BackupManager, RestoreOutcome};
pub use concurrency::{install_signal_handler, CancelToken, TargetLock};
pub use context::OpContext;
pub use engine::{Orchestrator, VerifyReport};
pub use events::ProgressEvent;
pub use fallback::{try_in_order, Chosen, Method};
pub use netmode::{validate_transition, NetworkMode, NetworkState, TransitionReport};
pub use operation::{execute_operation, Classification, OpOutcome, Operation};
pub use plan::{build_plan, PlannedStep, StepKind};
pub use retry::{poll_until, with_retry, Retried, RetryPolicy};
pub use routes::{parse_routes, Route, WanGateway};
pub use run::{RunOutcome, RunResult, StepRecord, StepStatus};

use bringup_runtime::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Target unreachable or authentication rejected.
    #[error("connectivity error: {0}")]
    Connectivity(ExecError),
    /// The executor could not run a command (timeout, spawn failure).
    #[error("executor error: {0}")]
    Exec(ExecError),
    #[error("command '{command}' failed: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("precheck for {operation} failed: {reason}")]
    Precheck { operation: String, reason: String },
    #[error("{operation} failed: {reason}")]
    Apply { operation: String, reason: String },
    #[error("{operation} did not reach the expected state")]
    PostcheckFailed { operation: String },
    #[error("insufficient disk space on {path}: {available_kb} KiB free, {required_kb} KiB required")]
    ResourceExhausted {
        path: String,
        available_kb: u64,
        required_kb: u64,
    },
    #[error("{operation} failed after {} attempts: {}", .attempts.len(), .attempts.join("; "))]
    RetriesExhausted {
        operation: String,
        attempts: Vec<String>,
    },
    #[error("every method for {operation} failed: {}", .failures.join("; "))]
    AllMethodsFailed {
        operation: String,
        failures: Vec<String>,
    },
    #[error("invalid network mode transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("refusing to commit: LAN address would be removed ({0})")]
    LanAddressLost(String),
    #[error("unexpected output from {command}: {detail}")]
    UnexpectedOutput { command: String, detail: String },
    #[error("target {0} is locked by another run")]
    TargetLocked(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("config error: {0}")]
    Config(#[from] bringup_schema::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] bringup_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ExecError> for CoreError {
    fn from(e: ExecError) -> Self {
        if e.is_connectivity() {
            CoreError::Connectivity(e)
        } else {
            CoreError::Exec(e)
        }
    }
}

impl CoreError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CoreError::Connectivity(_))
    }

    /// Deterministic failures that another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CoreError::Cancelled
                | CoreError::InvalidTransition { .. }
                | CoreError::LanAddressLost(_)
                | CoreError::TargetLocked(_)
                | CoreError::Config(_)
        )
    }

    /// Stable machine-readable name, used in run logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Connectivity(_) => "connectivity",
            CoreError::Exec(_) => "exec",
            CoreError::CommandFailed { .. } | CoreError::Apply { .. } => "apply",
            CoreError::Precheck { .. } => "precheck",
            CoreError::PostcheckFailed { .. } => "postcheck_failed",
            CoreError::ResourceExhausted { .. } => "resource_exhausted",
            CoreError::RetriesExhausted { .. } => "retries_exhausted",
            CoreError::AllMethodsFailed { .. } => "all_methods_failed",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::LanAddressLost(_) => "lan_address_lost",
            CoreError::UnexpectedOutput { .. } => "unexpected_output",
            CoreError::TargetLocked(_) => "target_locked",
            CoreError::Cancelled => "cancelled",
            CoreError::Config(_) => "config",
            CoreError::Store(_) => "store",
            CoreError::Io(_) => "io",
            CoreError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_errors_split_by_connectivity() {
        let e: CoreError = ExecError::Unreachable {
            address: "192.168.8.1".to_owned(),
            reason: "timed out".to_owned(),
        }
        .into();
        assert!(e.is_connectivity());
        assert_eq!(e.kind(), "connectivity");

        let e: CoreError = ExecError::EmptyCommand.into();
        assert!(!e.is_connectivity());
        assert_eq!(e.kind(), "exec");
    }

    #[test]
    fn retries_exhausted_lists_every_attempt() {
        let e = CoreError::RetriesExhausted {
            operation: "pull nodered/node-red:3.1".to_owned(),
            attempts: vec!["EOF".to_owned(), "EOF".to_owned(), "timeout".to_owned()],
        };
        let msg = e.to_string();
        assert!(msg.contains("after 3 attempts"));
        assert!(msg.contains("EOF; EOF; timeout"));
    }

    #[test]
    fn deterministic_errors_are_not_retried() {
        assert!(!CoreError::Cancelled.is_retryable());
        assert!(!CoreError::InvalidTransition {
            from: "unconfigured".to_owned(),
            to: "reverse".to_owned(),
        }
        .is_retryable());
        assert!(CoreError::PostcheckFailed {
            operation: "runtime".to_owned()
        }
        .is_retryable());
    }
}
