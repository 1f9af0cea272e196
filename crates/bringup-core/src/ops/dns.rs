use crate::context::OpContext;
use crate::fallback::{try_in_order, Method};
use crate::operation::{Classification, Operation};
use crate::CoreError;
use bringup_runtime::{device, RemoteCommand};

/// Make name resolution work by adding a known-good resolver.
pub struct DnsFixOp;

fn lookup_ok(ctx: &OpContext<'_>, cmd: &RemoteCommand) -> Result<(), CoreError> {
    ctx.must(cmd, ctx.check_timeout()).map(drop)
}

impl Operation for DnsFixOp {
    fn name(&self) -> String {
        "dns".to_owned()
    }

    fn classification(&self) -> Classification {
        Classification::Warn
    }

    fn precheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        let out = ctx.query(&device::nslookup(&ctx.config.dns.probe_host))?;
        Ok(out.success())
    }

    fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let line = format!("nameserver {}", ctx.config.dns.resolver);
        let current = ctx.query(&device::read_file(device::RESOLV_CONF))?;
        if current.success() && current.stdout.lines().any(|l| l.trim() == line) {
            return Ok(());
        }
        ctx.must(
            &device::append_line(device::RESOLV_CONF, &line),
            ctx.check_timeout(),
        )?;
        Ok(())
    }

    /// Minimal images may lack any one of the lookup tools.
    fn postcheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        let host = &ctx.config.dns.probe_host;
        let result = try_in_order(
            "dns check",
            vec![
                Method::new("nslookup", || lookup_ok(ctx, &device::nslookup(host))),
                Method::new("host", || lookup_ok(ctx, &device::host_lookup(host))),
                Method::new("ping", || lookup_ok(ctx, &device::ping_once(host))),
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(CoreError::AllMethodsFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{execute_operation, OpOutcome};
    use bringup_runtime::MockExecutor;
    use bringup_schema::DeployConfig;

    #[test]
    fn appends_resolver_once() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        let ctx = OpContext::new(&target, &exec, &config);

        let op = DnsFixOp;
        assert_eq!(
            execute_operation(&op, &ctx).unwrap(),
            OpOutcome::Applied { attempts: 1 }
        );
        op.apply(&ctx).unwrap();
        let resolv = exec.device().files[device::RESOLV_CONF].clone();
        assert_eq!(resolv.matches("nameserver 8.8.8.8").count(), 1);
        assert_eq!(execute_operation(&op, &ctx).unwrap(), OpOutcome::AlreadySatisfied);
    }

    #[test]
    fn postcheck_falls_back_to_host_lookup() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        exec.device().missing_tools.insert("nslookup".to_owned());
        let ctx = OpContext::new(&target, &exec, &config);

        DnsFixOp.apply(&ctx).unwrap();
        assert!(DnsFixOp.postcheck(&ctx).unwrap());
        assert_eq!(exec.device().commands_matching("host "), 1);
    }

    #[test]
    fn offline_device_fails_postcheck() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        exec.device().wan_online = false;
        let ctx = OpContext::new(&target, &exec, &config);

        let err = execute_operation(&DnsFixOp, &ctx).unwrap_err();
        assert!(matches!(err, CoreError::PostcheckFailed { .. }));
    }
}
