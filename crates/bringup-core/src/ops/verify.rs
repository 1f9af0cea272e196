use crate::context::OpContext;
use crate::operation::{Classification, Operation};
use crate::CoreError;
use bringup_runtime::device;
use serde::Serialize;
use tracing::debug;

/// Result of one connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub probe: &'static str,
    pub subject: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Resolve a name, ping an address, fetch a URL. Every probe runs so the
/// operator sees the full picture.
pub fn run_probes(ctx: &OpContext<'_>) -> Result<Vec<ProbeResult>, CoreError> {
    let v = &ctx.config.verify;
    let probes = [
        ("resolve", v.resolve_host.clone(), device::nslookup(&v.resolve_host)),
        ("ping", v.ping_address.clone(), device::ping_once(&v.ping_address)),
        ("http", v.http_url.clone(), device::http_fetch(&v.http_url)),
    ];
    let mut results = Vec::with_capacity(probes.len());
    for (probe, subject, cmd) in probes {
        let out = ctx.query(&cmd)?;
        debug!("verify {probe} {subject}: exit {}", out.exit_code);
        results.push(ProbeResult {
            probe,
            subject,
            ok: out.success(),
            detail: (!out.success()).then(|| out.summary()),
        });
    }
    Ok(results)
}

/// Connectivity check after a transition: any one working probe is enough.
pub struct VerifyOp;

impl Operation for VerifyOp {
    fn name(&self) -> String {
        "verify".to_owned()
    }

    fn classification(&self) -> Classification {
        Classification::Warn
    }

    fn mutating(&self) -> bool {
        false
    }

    fn precheck(&self, _ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        Ok(false)
    }

    /// Connectivity may legitimately be absent (a cellular link awaiting a
    /// SIM), so a run with no working probe succeeds with warnings.
    fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let results = run_probes(ctx)?;
        if results.iter().any(|r| r.ok) {
            return Ok(());
        }
        for r in &results {
            ctx.warn(format!(
                "{} {} failed: {}",
                r.probe,
                r.subject,
                r.detail.as_deref().unwrap_or_default()
            ));
        }
        ctx.warn("no connectivity check succeeded");
        Ok(())
    }

    fn postcheck(&self, _ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::execute_operation;
    use bringup_runtime::MockExecutor;
    use bringup_schema::DeployConfig;

    #[test]
    fn one_working_probe_is_enough() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        let ctx = OpContext::new(&target, &exec, &config);

        // resolver file points at a dead nameserver, but ping and http work
        let results = run_probes(&ctx).unwrap();
        assert!(!results[0].ok);
        assert!(results[1].ok && results[2].ok);
        assert!(execute_operation(&VerifyOp, &ctx).is_ok());
    }

    #[test]
    fn all_probes_failing_only_warns() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        exec.device().wan_online = false;
        let ctx = OpContext::new(&target, &exec, &config);

        assert!(execute_operation(&VerifyOp, &ctx).is_ok());
        let warnings = ctx.take_warnings();
        assert_eq!(warnings.len(), 4);
        assert!(warnings[0].starts_with("resolve downloads.openwrt.org failed"), "{warnings:?}");
        assert_eq!(warnings[3], "no connectivity check succeeded");
    }
}
