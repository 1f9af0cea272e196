use crate::backup::{BackupManager, RestoreOutcome};
use crate::concurrency::{CancelToken, TargetLock};
use crate::context::OpContext;
use crate::events::ProgressEvent;
use crate::netmode::NetworkState;
use crate::operation::{execute_operation, OpOutcome};
use crate::ops::{run_probes, ProbeResult};
use crate::plan::{build_plan, PlannedStep, StepKind};
use crate::run::{summarize, RunResult, StepRecord, StepStatus};
use crate::CoreError;
use bringup_runtime::Executor;
use bringup_schema::{DeployConfig, RunId, RunMode, SnapshotId, StepSelection, Target, TargetId};
use bringup_store::{RunLogStore, RunLogWriter, SnapshotIndex, SnapshotRecord, StateLayout};
use chrono::Utc;
use serde::Serialize;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sequences Runs against a Target and exposes the operator commands that
/// work on snapshots and connectivity outside of a Run.
pub struct Orchestrator {
    config: DeployConfig,
    exec: Arc<dyn Executor>,
    layout: Option<StateLayout>,
    cancel: CancelToken,
}

/// Outcome of the standalone connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub target: TargetId,
    pub reachable: bool,
    pub probes: Vec<ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyReport {
    pub fn ok(&self) -> bool {
        self.reachable && self.probes.iter().any(|p| p.ok)
    }
}

/// One JSON line in a run log.
#[derive(Serialize)]
struct LogRecord<'a, T: Serialize> {
    record: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

/// Mutable state of a Run in progress: Step records plus where progress goes.
struct RunState<'e> {
    steps: Vec<StepRecord>,
    log: Option<RunLogWriter>,
    emit: &'e dyn Fn(ProgressEvent),
}

impl RunState<'_> {
    fn write<T: Serialize>(&mut self, record: &'static str, body: &T) {
        if let Some(log) = &mut self.log {
            if let Err(e) = log.append(&LogRecord { record, body }) {
                warn!("run log write failed: {e}");
            }
        }
    }

    fn publish(&mut self, event: ProgressEvent) {
        self.write("event", &event);
        (self.emit)(event);
    }

    fn start(&mut self, index: usize) -> Instant {
        let step = &mut self.steps[index];
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now().to_rfc3339());
        info!("step {} started", step.name);
        let name = step.name.clone();
        self.publish(ProgressEvent::StepStarted { index, name });
        Instant::now()
    }

    fn succeed(&mut self, index: usize, started: Instant, outcome: OpOutcome, warnings: Vec<String>) {
        let step = &mut self.steps[index];
        step.status = StepStatus::Succeeded;
        step.duration_ms = elapsed_ms(started);
        step.attempts = outcome.attempts();
        step.already_satisfied = outcome == OpOutcome::AlreadySatisfied;
        step.warnings = warnings;
        info!("step {} succeeded", step.name);
        let event = ProgressEvent::StepSucceeded {
            index,
            name: step.name.clone(),
            duration_ms: step.duration_ms,
            already_satisfied: step.already_satisfied,
        };
        self.publish(event);
    }

    fn fail(&mut self, index: usize, started: Instant, error: &CoreError, warnings: Vec<String>) {
        let step = &mut self.steps[index];
        step.status = StepStatus::Failed;
        step.duration_ms = elapsed_ms(started);
        step.error = Some(error.to_string());
        step.error_kind = Some(error.kind().to_owned());
        step.warnings = warnings;
        if step.fatal {
            warn!("step {} failed: {error}", step.name);
        } else {
            warn!("step {} failed, continuing: {error}", step.name);
        }
        let event = ProgressEvent::StepFailed {
            index,
            name: step.name.clone(),
            duration_ms: step.duration_ms,
            fatal: step.fatal,
            error: error.to_string(),
        };
        self.publish(event);
    }

    fn skip(&mut self, index: usize, reason: &str) {
        let step = &mut self.steps[index];
        step.status = StepStatus::Skipped;
        debug!("step {} skipped: {reason}", step.name);
        let event = ProgressEvent::StepSkipped {
            index,
            name: step.name.clone(),
            reason: reason.to_owned(),
        };
        self.publish(event);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl Orchestrator {
    pub fn new(config: DeployConfig, exec: Arc<dyn Executor>) -> Self {
        Self {
            config,
            exec,
            layout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Persist run logs, the snapshot index and Target locks under `layout`.
    #[must_use]
    pub fn with_state_dir(mut self, layout: StateLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn snapshot_index(&self) -> Option<SnapshotIndex> {
        self.layout.clone().map(SnapshotIndex::new)
    }

    /// Take the Target lock when a state directory is configured.
    fn lock(&self, target: &Target) -> Result<Option<TargetLock>, CoreError> {
        let Some(layout) = &self.layout else {
            return Ok(None);
        };
        layout.initialize()?;
        match TargetLock::try_acquire(&layout.lock_file(&target.id()))? {
            Some(lock) => Ok(Some(lock)),
            None => Err(CoreError::TargetLocked(target.address.clone())),
        }
    }

    fn preflight(&self, target: &Target) -> Result<(), CoreError> {
        debug!("probing {} via {}", target.address, self.exec.name());
        self.exec.probe(self.config.check_timeout())?;
        Ok(())
    }

    /// Run a deployment to completion.
    ///
    /// Step failures are reported inside the returned [`RunResult`]; `Err` is
    /// reserved for failures to start the Run at all (Target locked, state
    /// directory unusable).
    pub fn run_deployment(
        &self,
        target: &Target,
        mode: RunMode,
        selection: &StepSelection,
    ) -> Result<RunResult, CoreError> {
        self.run_with_events(target, mode, selection, &|_| {})
    }

    /// Run a deployment on a worker thread. Progress events arrive on the
    /// returned channel, which closes once the Run is over.
    pub fn spawn_deployment(
        self,
        target: Target,
        mode: RunMode,
        selection: StepSelection,
    ) -> (JoinHandle<Result<RunResult, CoreError>>, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let emit = move |event: ProgressEvent| {
                // the consumer may have stopped listening; the Run goes on
                let _ = tx.send(event);
            };
            self.run_with_events(&target, mode, &selection, &emit)
        });
        (handle, rx)
    }

    pub fn run_with_events(
        &self,
        target: &Target,
        mode: RunMode,
        selection: &StepSelection,
        emit: &dyn Fn(ProgressEvent),
    ) -> Result<RunResult, CoreError> {
        let _lock = self.lock(target)?;
        let started_at = Utc::now();
        let index = self.snapshot_index();

        let log = match &self.layout {
            Some(layout) => Some(RunLogStore::new(layout.clone()).create(&target.id(), started_at)?),
            None => None,
        };
        let run_id = log.as_ref().map_or_else(
            || RunId::new(format!("{}-{}", target.id(), started_at.format("%Y%m%dT%H%M%SZ"))),
            |w| w.run_id().clone(),
        );

        let plan = build_plan(&self.config, mode, selection);
        let mut state = RunState {
            steps: plan
                .iter()
                .map(|p| StepRecord::pending(p.name(), p.fatal))
                .collect(),
            log,
            emit,
        };
        info!("run {run_id}: {mode} against {} ({} steps)", target.address, plan.len());
        state.publish(ProgressEvent::RunStarted {
            run_id: run_id.clone(),
            target: target.id(),
            mode,
            steps: plan.iter().map(PlannedStep::name).collect(),
        });

        let ctx = OpContext::new(target, self.exec.as_ref(), &self.config);
        let manager = BackupManager::new(index.as_ref());
        let mut snapshot: Option<SnapshotId> = None;
        let mut abort: Option<CoreError> = None;
        let mut cancelled = false;

        if let Err(e) = self.preflight(target) {
            warn!("target {} not usable: {e}", target.address);
            for i in 0..plan.len() {
                state.skip(i, "target unreachable");
            }
            abort = Some(e);
        } else {
            for (i, planned) in plan.iter().enumerate() {
                if planned.kind == StepKind::Restore {
                    continue;
                }
                if abort.is_some() {
                    state.skip(i, "run aborted by an earlier failure");
                    continue;
                }
                if cancelled || self.cancel.is_cancelled() {
                    cancelled = true;
                    state.skip(i, "run cancelled");
                    continue;
                }

                let started = state.start(i);
                let result = match &planned.kind {
                    StepKind::Backup => manager.backup(&ctx, Some(&run_id)).map(|id| {
                        snapshot = Some(id);
                        OpOutcome::Applied { attempts: 1 }
                    }),
                    _ => match planned.operation(&self.config) {
                        Some(op) => execute_operation(op.as_ref(), &ctx),
                        None => Err(CoreError::Precheck {
                            operation: planned.name(),
                            reason: "no operation for this step".to_owned(),
                        }),
                    },
                };
                let warnings = ctx.take_warnings();
                match result {
                    Ok(outcome) => state.succeed(i, started, outcome, warnings),
                    Err(e) => {
                        state.fail(i, started, &e, warnings);
                        if planned.fatal || e.is_connectivity() || matches!(e, CoreError::Cancelled) {
                            abort = Some(e);
                        }
                    }
                }
            }

            if let Some(i) = plan.iter().position(|p| p.kind == StepKind::Restore) {
                self.final_restore(&mut state, i, &ctx, &manager, snapshot.as_ref(), mode, abort.is_some() || cancelled);
            }
        }

        let finished_at = Utc::now();
        let outcome = summarize(&state.steps, abort.is_some() || cancelled);
        let result = RunResult {
            run_id: run_id.clone(),
            target: target.id(),
            mode,
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            steps: state.steps.clone(),
            outcome,
            cancelled,
            error: abort.as_ref().map(ToString::to_string),
            error_kind: abort.as_ref().map(|e| e.kind().to_owned()),
            snapshot,
        };
        info!("run {run_id} {outcome}");

        state.write("result", &result);
        state.publish(ProgressEvent::RunCompleted {
            run_id,
            outcome,
            cancelled,
        });
        if let Some(log) = state.log.take() {
            if let Err(e) = log.finish() {
                warn!("run log could not be flushed: {e}");
            }
        }
        Ok(result)
    }

    /// Restore the Run's snapshot unless the Run reached its goal and was
    /// asked to stay in the new mode.
    #[allow(clippy::too_many_arguments)]
    fn final_restore(
        &self,
        state: &mut RunState<'_>,
        index: usize,
        ctx: &OpContext<'_>,
        manager: &BackupManager<'_>,
        snapshot: Option<&SnapshotId>,
        mode: RunMode,
        failed: bool,
    ) {
        let Some(id) = snapshot else {
            state.skip(index, "no snapshot was taken");
            return;
        };
        if !failed && self.config.run.keep_new_mode_for(mode) {
            state.skip(index, "keeping the new network mode; snapshot retained");
            return;
        }
        let started = state.start(index);
        match manager.restore(ctx, id) {
            Ok(RestoreOutcome::Restored | RestoreOutcome::Missing) => {
                state.succeed(index, started, OpOutcome::Applied { attempts: 1 }, ctx.take_warnings());
            }
            Err(e) => {
                let warnings = ctx.take_warnings();
                state.fail(index, started, &e, warnings);
            }
        }
    }

    /// Take a snapshot outside of a Run.
    pub fn backup_now(&self, target: &Target) -> Result<SnapshotId, CoreError> {
        let _lock = self.lock(target)?;
        self.preflight(target)?;
        let index = self.snapshot_index();
        let ctx = OpContext::new(target, self.exec.as_ref(), &self.config);
        BackupManager::new(index.as_ref()).backup(&ctx, None)
    }

    pub fn restore_snapshot(
        &self,
        target: &Target,
        id: &SnapshotId,
    ) -> Result<(RestoreOutcome, Vec<String>), CoreError> {
        let _lock = self.lock(target)?;
        self.preflight(target)?;
        let index = self.snapshot_index();
        let ctx = OpContext::new(target, self.exec.as_ref(), &self.config);
        let outcome = BackupManager::new(index.as_ref()).restore(&ctx, id)?;
        Ok((outcome, ctx.take_warnings()))
    }

    pub fn cleanup_snapshot(&self, target: &Target, id: &SnapshotId) -> Result<(), CoreError> {
        let _lock = self.lock(target)?;
        self.preflight(target)?;
        let index = self.snapshot_index();
        let ctx = OpContext::new(target, self.exec.as_ref(), &self.config);
        BackupManager::new(index.as_ref()).cleanup(&ctx, id)
    }

    /// Indexed snapshots, oldest first. Empty without a state directory.
    pub fn snapshots(&self, target: Option<&TargetId>) -> Result<Vec<SnapshotRecord>, CoreError> {
        match self.snapshot_index() {
            Some(index) => Ok(index.list(target)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn latest_snapshot(&self, target: &Target) -> Result<Option<SnapshotRecord>, CoreError> {
        match self.snapshot_index() {
            Some(index) => Ok(index.latest(&target.id())?),
            None => Ok(None),
        }
    }

    /// Reachability plus the connectivity probe set, without changing anything.
    pub fn verify_connectivity(&self, target: &Target) -> VerifyReport {
        let mut report = VerifyReport {
            target: target.id(),
            reachable: false,
            probes: Vec::new(),
            error: None,
        };
        if let Err(e) = self.preflight(target) {
            report.error = Some(e.to_string());
            return report;
        }
        report.reachable = true;
        let ctx = OpContext::new(target, self.exec.as_ref(), &self.config);
        match run_probes(&ctx) {
            Ok(probes) => report.probes = probes,
            Err(e) => report.error = Some(e.to_string()),
        }
        report
    }

    pub fn network_status(&self, target: &Target) -> Result<NetworkState, CoreError> {
        self.preflight(target)?;
        let ctx = OpContext::new(target, self.exec.as_ref(), &self.config);
        NetworkState::read(&ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunOutcome;
    use bringup_runtime::MockExecutor;
    use bringup_schema::StepSelector;

    fn fast_config() -> DeployConfig {
        let mut config = DeployConfig::for_address("192.168.8.1");
        config.runtime.readiness_timeout_secs = 0;
        config.runtime.poll_interval_ms = 1;
        config.retry.image_pull.base_delay_ms = 0;
        config.retry.package_install.base_delay_ms = 0;
        config.retry.config_busy.base_delay_ms = 0;
        config
    }

    #[test]
    fn verify_report_for_unreachable_target() {
        let exec = Arc::new(MockExecutor::new());
        exec.device().reachable = false;
        let config = fast_config();
        let target = config.to_target();
        let report = Orchestrator::new(config, exec).verify_connectivity(&target);
        assert!(!report.reachable);
        assert!(!report.ok());
        assert!(report.error.is_some());
    }

    #[test]
    fn read_only_run_has_no_snapshot() {
        let exec = Arc::new(MockExecutor::new());
        let config = fast_config();
        let target = config.to_target();
        let orch = Orchestrator::new(config, exec.clone());
        let result = orch
            .run_deployment(
                &target,
                RunMode::Forward,
                &StepSelection::only(vec![StepSelector::Verify]),
            )
            .unwrap();
        assert_eq!(result.outcome, RunOutcome::Succeeded);
        assert_eq!(result.steps.len(), 1);
        assert!(result.snapshot.is_none());
        assert_eq!(exec.device().commands_matching("sysupgrade"), 0);
    }

    #[test]
    fn status_reports_current_mode() {
        let exec = Arc::new(MockExecutor::new());
        exec.device().set_uci("network.wan.device", "eth1");
        let config = fast_config();
        let target = config.to_target();
        let state = Orchestrator::new(config, exec).network_status(&target).unwrap();
        assert_eq!(state.mode, crate::netmode::NetworkMode::Forward);
    }
}
