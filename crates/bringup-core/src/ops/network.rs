use crate::context::OpContext;
use crate::netmode::{apply_transition, NetworkMode, NetworkState};
use crate::operation::{Classification, Operation};
use crate::retry::RetryPolicy;
use crate::CoreError;
use tracing::info;

/// Drive the device into a network mode.
pub struct NetworkModeOp {
    pub mode: NetworkMode,
}

impl NetworkModeOp {
    pub fn new(mode: NetworkMode) -> Self {
        Self { mode }
    }
}

impl Operation for NetworkModeOp {
    fn name(&self) -> String {
        format!("network:{}", self.mode)
    }

    fn classification(&self) -> Classification {
        Classification::Fatal
    }

    fn precheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        Ok(NetworkState::read(ctx)?.matches(self.mode, ctx))
    }

    fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let report = apply_transition(ctx, self.mode)?;
        info!(
            "{} -> {} applied via {}, {} stale route(s) removed",
            report.from, report.to, report.reload_method, report.routes_removed
        );
        Ok(())
    }

    fn postcheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        self.precheck(ctx)
    }

    /// The configuration tool is sometimes busy right after boot.
    fn retry_policy(&self, ctx: &OpContext<'_>) -> Option<RetryPolicy> {
        Some(RetryPolicy::from_settings(&ctx.config.retry.config_busy))
    }
}
