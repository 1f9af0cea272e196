//! Remote execution layer for bringup.
//!
//! This crate implements the executor primitive every Operation is built on:
//! structured `RemoteCommand`s with typed arguments, the `Executor` trait with
//! a local-process backend and an ssh/scp backend, a simulated appliance
//! (`MockExecutor`) for tests, and local prerequisite checking.
//!
//! Executors are thin and synchronous. They never retry; connection failures
//! surface as [`ExecError::Unreachable`] / [`ExecError::AuthFailed`] so the
//! caller can tell them apart from a command that ran and failed.

pub mod command;
pub mod device;
pub mod executor;
pub mod local;
pub mod mock;
pub mod prereq;
pub mod process;
pub mod ssh;

pub use command::{shell_quote, ExecOutput, RemoteCommand};
pub use executor::{select_executor, Executor};
pub use local::LocalExecutor;
pub use mock::{FakeDevice, MockExecutor};
pub use prereq::{check_local_prereqs, format_missing, MissingPrereq};
pub use ssh::SshExecutor;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("target {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },
    #[error("authentication failed for {destination}: {reason}")]
    AuthFailed { destination: String, reason: String },
    #[error("command timed out after {}s: {command}", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("executor I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command must not be empty")]
    EmptyCommand,
    #[error("file transfer to {remote} failed: {reason}")]
    Transfer { remote: String, reason: String },
}

impl ExecError {
    /// Network or authentication failure, as opposed to a command failure.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ExecError::Unreachable { .. } | ExecError::AuthFailed { .. }
        )
    }
}
