use crate::context::OpContext;
use crate::retry::{with_retry, RetryPolicy};
use crate::CoreError;
use serde::Serialize;
use tracing::{debug, info};

/// What a failed Operation means for the rest of the Run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Abort the Run; remaining Steps are skipped.
    Fatal,
    /// Record the failure and continue.
    Warn,
}

/// A named, re-runnable unit of device configuration.
///
/// `precheck` answers "is the device already in the desired state?", `apply`
/// moves it there and `postcheck` confirms it. Operations only see the device
/// through the [`OpContext`] they are handed.
pub trait Operation {
    fn name(&self) -> String;

    fn classification(&self) -> Classification;

    /// Whether `apply` may be repeated without duplicating side effects.
    /// Only idempotent Operations are retried.
    fn idempotent(&self) -> bool {
        true
    }

    /// Whether `apply` changes device state. A Run made of read-only
    /// Operations does not take a snapshot.
    fn mutating(&self) -> bool {
        true
    }

    fn precheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError>;

    fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError>;

    fn postcheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError>;

    /// Policy for retrying apply + postcheck as one unit.
    fn retry_policy(&self, _ctx: &OpContext<'_>) -> Option<RetryPolicy> {
        None
    }

    /// Runs between retry attempts.
    fn cleanup(&self, _ctx: &OpContext<'_>) -> Result<(), CoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    AlreadySatisfied,
    Applied { attempts: u32 },
}

impl OpOutcome {
    pub fn attempts(self) -> u32 {
        match self {
            OpOutcome::AlreadySatisfied => 0,
            OpOutcome::Applied { attempts } => attempts,
        }
    }
}

/// Drive one Operation through precheck, apply and postcheck.
///
/// A precheck that cannot determine the current state counts as "not yet
/// satisfied". A postcheck that comes back false is a
/// [`CoreError::PostcheckFailed`], which the Operation's retry policy treats
/// like any other failed attempt.
pub fn execute_operation(op: &dyn Operation, ctx: &OpContext<'_>) -> Result<OpOutcome, CoreError> {
    let name = op.name();

    match op.precheck(ctx) {
        Ok(true) => {
            info!("{name}: already satisfied");
            return Ok(OpOutcome::AlreadySatisfied);
        }
        Ok(false) => debug!("{name}: not satisfied, applying"),
        Err(e) if e.is_connectivity() || !e.is_retryable() => return Err(e),
        Err(e) => ctx.warn(format!("{name}: could not determine current state ({e}), applying")),
    }

    let attempt = |_attempt: u32| -> Result<(), CoreError> {
        op.apply(ctx)?;
        if op.postcheck(ctx)? {
            Ok(())
        } else {
            Err(CoreError::PostcheckFailed {
                operation: name.clone(),
            })
        }
    };

    let policy = op.retry_policy(ctx).filter(|_| op.idempotent());
    let result = match policy {
        Some(policy) => with_retry(&policy, &name, attempt, || op.cleanup(ctx)).map(|r| r.attempts),
        None => attempt(1).map(|()| 1),
    };

    match result {
        Ok(attempts) => Ok(OpOutcome::Applied { attempts }),
        Err(e @ (CoreError::CommandFailed { .. } | CoreError::Exec(_))) => Err(CoreError::Apply {
            operation: name,
            reason: e.to_string(),
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bringup_runtime::{device, MockExecutor};
    use bringup_schema::DeployConfig;
    use std::cell::Cell;

    /// Writes a marker line unless it is already there.
    struct Marker {
        precheck_fails: bool,
        apply_calls: Cell<u32>,
        policy: Option<RetryPolicy>,
        idempotent: bool,
    }

    impl Marker {
        fn new() -> Self {
            Self {
                precheck_fails: false,
                apply_calls: Cell::new(0),
                policy: None,
                idempotent: true,
            }
        }
    }

    impl Operation for Marker {
        fn name(&self) -> String {
            "marker".to_owned()
        }

        fn classification(&self) -> Classification {
            Classification::Warn
        }

        fn idempotent(&self) -> bool {
            self.idempotent
        }

        fn precheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
            if self.precheck_fails {
                return Err(CoreError::UnexpectedOutput {
                    command: "cat".to_owned(),
                    detail: "garbled".to_owned(),
                });
            }
            self.postcheck(ctx)
        }

        fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError> {
            self.apply_calls.set(self.apply_calls.get() + 1);
            ctx.must(
                &device::append_line("/etc/marker", "done"),
                ctx.check_timeout(),
            )?;
            Ok(())
        }

        fn postcheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
            let out = ctx.query(&device::read_file("/etc/marker"))?;
            Ok(out.success() && out.stdout.contains("done"))
        }

        fn retry_policy(&self, _ctx: &OpContext<'_>) -> Option<RetryPolicy> {
            self.policy.clone()
        }
    }

    fn setup() -> (DeployConfig, MockExecutor) {
        (DeployConfig::for_address("192.168.8.1"), MockExecutor::new())
    }

    #[test]
    fn second_run_is_already_satisfied() {
        let (config, exec) = setup();
        let target = config.to_target();
        let ctx = OpContext::new(&target, &exec, &config);
        let op = Marker::new();

        assert_eq!(
            execute_operation(&op, &ctx).unwrap(),
            OpOutcome::Applied { attempts: 1 }
        );
        assert_eq!(execute_operation(&op, &ctx).unwrap(), OpOutcome::AlreadySatisfied);
        assert_eq!(op.apply_calls.get(), 1);
        assert_eq!(exec.device().files["/etc/marker"], "done\n");
    }

    #[test]
    fn unknown_precheck_state_applies_with_warning() {
        let (config, exec) = setup();
        let target = config.to_target();
        let ctx = OpContext::new(&target, &exec, &config);
        let op = Marker {
            precheck_fails: true,
            ..Marker::new()
        };
        execute_operation(&op, &ctx).unwrap();
        assert_eq!(op.apply_calls.get(), 1);
        let warnings = ctx.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("could not determine current state"));
    }

    #[test]
    fn failed_apply_becomes_apply_error() {
        let (config, exec) = setup();
        exec.device().missing_tools.insert("tee".to_owned());
        let target = config.to_target();
        let ctx = OpContext::new(&target, &exec, &config);
        let err = execute_operation(&Marker::new(), &ctx).unwrap_err();
        assert!(matches!(err, CoreError::Apply { ref operation, .. } if operation == "marker"));
    }

    #[test]
    fn retry_policy_is_ignored_for_non_idempotent_operations() {
        let (config, exec) = setup();
        exec.device().missing_tools.insert("tee".to_owned());
        let target = config.to_target();
        let ctx = OpContext::new(&target, &exec, &config);
        let op = Marker {
            policy: Some(RetryPolicy::immediate(3)),
            idempotent: false,
            ..Marker::new()
        };
        assert!(execute_operation(&op, &ctx).is_err());
        assert_eq!(op.apply_calls.get(), 1);
    }

    #[test]
    fn connectivity_loss_in_precheck_propagates() {
        let (config, exec) = setup();
        exec.device().reachable = false;
        let target = config.to_target();
        let ctx = OpContext::new(&target, &exec, &config);
        let op = Marker::new();
        let err = execute_operation(&op, &ctx).unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(op.apply_calls.get(), 0);
    }
}
