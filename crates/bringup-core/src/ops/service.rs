use crate::context::OpContext;
use crate::fallback::{try_in_order, Method};
use crate::operation::{Classification, Operation};
use crate::retry::{poll_until, with_retry, RetryPolicy};
use crate::CoreError;
use bringup_runtime::device;
use bringup_schema::ServiceSpec;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// `Available` column of `df -Pk` output, in KiB.
pub(crate) fn parse_available_kb(df_output: &str) -> Option<u64> {
    df_output
        .lines()
        .nth(1)?
        .split_whitespace()
        .nth(3)?
        .parse()
        .ok()
}

/// Install one service from the catalog and start its container.
pub struct ServiceInstallOp {
    pub spec: &'static ServiceSpec,
}

impl ServiceInstallOp {
    pub fn new(spec: &'static ServiceSpec) -> Self {
        Self { spec }
    }

    fn is_running(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        let out = ctx.query(&device::container_running(&self.spec.container_name()))?;
        Ok(out.success() && out.stdout_trimmed() == self.spec.container_name())
    }

    fn push_descriptor(&self, ctx: &OpContext<'_>) -> Result<String, CoreError> {
        let root = &ctx.config.runtime.data_root;
        ctx.must(&device::mkdir_p(&self.spec.data_dir(root)), ctx.check_timeout())?;
        let descriptor = self.spec.render_descriptor(root)?;
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(descriptor.as_bytes())?;
        tmp.flush()?;
        let remote = self.spec.descriptor_path(root);
        // scp runs as the login account; only the move is elevated
        let staging = format!("/tmp/{}.compose.json", self.spec.container_name());
        ctx.copy(tmp.path(), &staging)?;
        ctx.must(&device::move_file(&staging, &remote), ctx.check_timeout())?;
        debug!("descriptor for {} written to {remote}", self.spec.name);
        Ok(remote)
    }

    fn ensure_disk_space(ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let rt = &ctx.config.runtime;
        let out = ctx.query(&device::disk_free(&rt.storage_path))?;
        match parse_available_kb(&out.stdout).filter(|_| out.success()) {
            Some(available_kb) if available_kb < rt.min_free_kb => Err(CoreError::ResourceExhausted {
                path: rt.storage_path.clone(),
                available_kb,
                required_kb: rt.min_free_kb,
            }),
            Some(_) => Ok(()),
            None => {
                debug!("free space on {} unknown, pulling anyway", rt.storage_path);
                Ok(())
            }
        }
    }

    fn pull_image(&self, ctx: &OpContext<'_>) -> Result<u32, CoreError> {
        let policy = RetryPolicy::from_settings(&ctx.config.retry.image_pull);
        let image = self.spec.image;
        let pulled = with_retry(
            &policy,
            &format!("pull {image}"),
            |_| {
                Self::ensure_disk_space(ctx)?;
                ctx.must(&device::image_pull(image), ctx.install_timeout())?;
                Ok(())
            },
            || {
                let out = ctx.must(&device::image_prune(), ctx.install_timeout())?;
                debug!("image prune: {}", out.stdout_trimmed());
                Ok(())
            },
        )?;
        Ok(pulled.attempts)
    }

    fn start(ctx: &OpContext<'_>, descriptor: &str) -> Result<&'static str, CoreError> {
        let t = ctx.install_timeout();
        let chosen = try_in_order(
            "compose up",
            vec![
                Method::new("docker compose", || {
                    ctx.must(&device::compose_up(descriptor), t).map(drop)
                }),
                Method::new("docker-compose", || {
                    ctx.must(&device::compose_up_standalone(descriptor), t).map(drop)
                }),
            ],
        )?;
        Ok(chosen.method)
    }
}

impl Operation for ServiceInstallOp {
    fn name(&self) -> String {
        format!("service:{}", self.spec.name)
    }

    fn classification(&self) -> Classification {
        Classification::Warn
    }

    fn precheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        self.is_running(ctx)
    }

    fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let descriptor = self.push_descriptor(ctx)?;
        let attempts = self.pull_image(ctx)?;
        let method = Self::start(ctx, &descriptor)?;
        info!(
            "{} started via {method} ({attempts} pull attempt(s))",
            self.spec.name
        );
        Ok(())
    }

    fn postcheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        let rt = &ctx.config.runtime;
        poll_until(
            Duration::from_secs(rt.readiness_timeout_secs),
            Duration::from_millis(rt.poll_interval_ms),
            &self.name(),
            || self.is_running(ctx),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{execute_operation, OpOutcome};
    use bringup_runtime::{FakeDevice, MockExecutor};
    use bringup_schema::{get_service, DeployConfig, Elevation};

    fn config() -> DeployConfig {
        let mut config = DeployConfig::for_address("192.168.8.1");
        config.retry.image_pull.base_delay_ms = 0;
        config.runtime.readiness_timeout_secs = 0;
        config.runtime.poll_interval_ms = 1;
        config
    }

    fn running_device() -> MockExecutor {
        MockExecutor::with_device(FakeDevice {
            runtime_installed: true,
            runtime_running: true,
            ..FakeDevice::default()
        })
    }

    fn op(name: &str) -> ServiceInstallOp {
        ServiceInstallOp::new(get_service(name).unwrap())
    }

    #[test]
    fn df_available_column() {
        let out = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                   /dev/root 16000000 120000 524288 5% /\n";
        assert_eq!(parse_available_kb(out), Some(524_288));
        assert_eq!(parse_available_kb("garbage"), None);
    }

    #[test]
    fn installs_and_starts_service() {
        let config = config();
        let target = config.to_target();
        let exec = running_device();
        let ctx = OpContext::new(&target, &exec, &config);

        let outcome = execute_operation(&op("mosquitto"), &ctx).unwrap();
        assert_eq!(outcome, OpOutcome::Applied { attempts: 1 });
        let dev = exec.device();
        assert!(dev.containers.contains("bringup-mosquitto"));
        assert!(dev.dirs.contains("/opt/bringup/mosquitto/data"));
        assert!(dev.files.contains_key("/opt/bringup/mosquitto/compose.json"));
    }

    #[test]
    fn descriptor_reaches_root_owned_data_dir_through_sudo() {
        let mut config = config();
        config.target.elevation = Elevation::Sudo;
        let target = config.to_target();
        let exec = running_device().with_elevation(Elevation::Sudo);
        exec.device().sudo_only = true;
        let ctx = OpContext::new(&target, &exec, &config);

        let outcome = execute_operation(&op("mosquitto"), &ctx).unwrap();
        assert_eq!(outcome, OpOutcome::Applied { attempts: 1 });
        let dev = exec.device();
        assert!(dev.containers.contains("bringup-mosquitto"));
        assert!(dev.files.contains_key("/opt/bringup/mosquitto/compose.json"));
        assert!(!dev.files.contains_key("/tmp/bringup-mosquitto.compose.json"));
    }

    #[test]
    fn running_service_is_skipped() {
        let config = config();
        let target = config.to_target();
        let exec = running_device();
        exec.device().containers.insert("bringup-influxdb".to_owned());
        let ctx = OpContext::new(&target, &exec, &config);

        assert_eq!(
            execute_operation(&op("influxdb"), &ctx).unwrap(),
            OpOutcome::AlreadySatisfied
        );
        assert_eq!(exec.device().commands_matching("docker pull"), 0);
    }

    #[test]
    fn pull_failing_every_attempt_prunes_between_attempts() {
        let config = config();
        let target = config.to_target();
        let exec = running_device();
        exec.device()
            .pull_failures
            .insert("nodered/node-red:3.1".to_owned(), 10);
        let ctx = OpContext::new(&target, &exec, &config);

        let err = execute_operation(&op("node-red"), &ctx).unwrap_err();
        assert!(matches!(err, CoreError::RetriesExhausted { ref attempts, .. } if attempts.len() == 3));
        let dev = exec.device();
        assert_eq!(dev.pull_attempts["nodered/node-red:3.1"], 3);
        assert_eq!(dev.prune_count, 2);
        assert!(dev.containers.is_empty());
    }

    #[test]
    fn low_disk_triggers_prune_and_extra_cycle() {
        let config = config();
        let target = config.to_target();
        let exec = running_device();
        {
            let mut dev = exec.device();
            dev.free_kb = 1024;
            dev.reclaimable_kb = 4 * 1024 * 1024;
        }
        let ctx = OpContext::new(&target, &exec, &config);

        execute_operation(&op("influxdb"), &ctx).unwrap();
        let dev = exec.device();
        assert_eq!(dev.prune_count, 1);
        assert_eq!(dev.pull_attempts["influxdb:2.7"], 1);
        assert!(dev.containers.contains("bringup-influxdb"));
    }

    #[test]
    fn falls_back_to_standalone_compose() {
        let config = config();
        let target = config.to_target();
        let exec = MockExecutor::with_device(FakeDevice {
            runtime_installed: true,
            runtime_running: true,
            compose_v2: false,
            compose_standalone: true,
            ..FakeDevice::default()
        });
        let ctx = OpContext::new(&target, &exec, &config);

        execute_operation(&op("node-red"), &ctx).unwrap();
        assert_eq!(exec.device().commands_matching("docker-compose -f"), 1);
        assert!(exec.device().containers.contains("bringup-node-red"));
    }
}
