use crate::context::OpContext;
use crate::fallback::{try_in_order, Method};
use crate::operation::{Classification, Operation};
use crate::retry::{poll_until, with_retry, RetryPolicy};
use crate::CoreError;
use bringup_runtime::device;
use std::time::Duration;
use tracing::info;

const PACKAGE_MANAGERS: &[&str] = &["opkg", "apt-get"];

fn runtime_packages(manager: &str) -> &'static [&'static str] {
    match manager {
        "apt-get" => &["docker.io"],
        _ => &["dockerd", "docker"],
    }
}

/// Install and start the container runtime.
pub struct RuntimeInstallOp;

impl RuntimeInstallOp {
    fn detect_package_manager(ctx: &OpContext<'_>) -> Result<&'static str, CoreError> {
        for &manager in PACKAGE_MANAGERS {
            if ctx.query(&device::which(manager))?.success() {
                return Ok(manager);
            }
        }
        Err(CoreError::Precheck {
            operation: "runtime".to_owned(),
            reason: format!("none of {} found on target", PACKAGE_MANAGERS.join(", ")),
        })
    }

    fn install_from_default_repo(ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let manager = Self::detect_package_manager(ctx)?;
        let policy = RetryPolicy::from_settings(&ctx.config.retry.package_install);
        let install = ctx.install_timeout();
        with_retry(
            &policy,
            &format!("{manager} install"),
            |_| {
                ctx.must(&device::package_update(manager), install)?;
                ctx.must(
                    &device::package_install(manager, runtime_packages(manager)),
                    install,
                )?;
                Ok(())
            },
            || Ok(()),
        )?;
        Ok(())
    }

    fn install_from_upstream(ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let install = ctx.install_timeout();
        ctx.must(&device::fetch_upstream_installer(), install)?;
        ctx.must(&device::run_upstream_installer(), install)?;
        Ok(())
    }

    fn start(ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let t = ctx.check_timeout();
        let chosen = try_in_order(
            "runtime start",
            vec![
                Method::new("init script", || {
                    ctx.must(&device::init_script("dockerd", "enable"), t)?;
                    ctx.must(&device::init_script("dockerd", "start"), t)?;
                    Ok(())
                }),
                Method::new("systemd", || {
                    ctx.must(&device::systemctl_enable_now("docker"), t).map(drop)
                }),
            ],
        )?;
        info!("container runtime started via {}", chosen.method);
        Ok(())
    }

    fn runtime_version(ctx: &OpContext<'_>) -> Result<Option<String>, CoreError> {
        let out = ctx.query(&device::runtime_info())?;
        Ok((out.success() && !out.stdout_trimmed().is_empty())
            .then(|| out.stdout_trimmed().to_owned()))
    }
}

impl Operation for RuntimeInstallOp {
    fn name(&self) -> String {
        "runtime".to_owned()
    }

    fn classification(&self) -> Classification {
        Classification::Fatal
    }

    fn precheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        Ok(Self::runtime_version(ctx)?.is_some())
    }

    fn apply(&self, ctx: &OpContext<'_>) -> Result<(), CoreError> {
        let installed = ctx.query(&device::which("docker"))?.success();
        if installed {
            info!("container runtime installed but not running");
        } else {
            let chosen = try_in_order(
                "runtime install",
                vec![
                    Method::new("default repository", || Self::install_from_default_repo(ctx)),
                    Method::new("upstream installer", || Self::install_from_upstream(ctx)),
                ],
            )?;
            if !chosen.skipped.is_empty() {
                ctx.warn(format!(
                    "runtime not available from the default repository, installed via {}",
                    chosen.method
                ));
            }
        }
        Self::start(ctx)
    }

    fn postcheck(&self, ctx: &OpContext<'_>) -> Result<bool, CoreError> {
        let rt = &ctx.config.runtime;
        let ready = poll_until(
            Duration::from_secs(rt.readiness_timeout_secs),
            Duration::from_millis(rt.poll_interval_ms),
            "container runtime",
            || Ok(Self::runtime_version(ctx)?.is_some()),
        )?;
        if ready {
            if let Some(version) = Self::runtime_version(ctx)? {
                info!("container runtime {version} ready");
            }
        }
        Ok(ready)
    }
}
