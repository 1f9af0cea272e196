//! Network mode state machine.
//!
//! FORWARD puts the WAN on the wired deployment interface over DHCP; REVERSE
//! puts it on the production (cellular) interface. Every transition stages
//! the LAN settings before the WAN ones, refuses to commit a configuration
//! without a LAN address, and then runs the reload pipeline: commit, route
//! cleanup, reload with fallbacks, default route reinstall, route cleanup.

use crate::context::OpContext;
use crate::fallback::{try_in_order, Method};
use crate::routes::{cleanup_empty_gateway_routes, reinstall_default_route, WanGateway};
use crate::CoreError;
use bringup_runtime::{device, RemoteCommand};
use bringup_schema::{NetworkSection, RunMode};
use serde::Serialize;
use std::fmt;
use tracing::info;

const WAN_INTERFACE: &str = "wan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Unconfigured,
    Forward,
    Reverse,
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::Unconfigured => write!(f, "unconfigured"),
            NetworkMode::Forward => write!(f, "forward"),
            NetworkMode::Reverse => write!(f, "reverse"),
        }
    }
}

impl NetworkMode {
    pub fn from_run_mode(mode: RunMode) -> Option<Self> {
        match mode {
            RunMode::Forward => Some(NetworkMode::Forward),
            RunMode::Reverse => Some(NetworkMode::Reverse),
            RunMode::None => None,
        }
    }
}

pub fn validate_transition(from: NetworkMode, to: NetworkMode) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (_, NetworkMode::Forward) | (NetworkMode::Forward | NetworkMode::Reverse, NetworkMode::Reverse)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Interface settings as the configuration tool reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkState {
    pub mode: NetworkMode,
    pub wan_device: Option<String>,
    pub wan_proto: Option<String>,
    pub lan_proto: Option<String>,
    pub lan_ipaddr: Option<String>,
    pub lan_netmask: Option<String>,
}

fn read_option(ctx: &OpContext<'_>, key: &str) -> Result<Option<String>, CoreError> {
    let out = ctx.query(&device::uci_get(key))?;
    let value = out.stdout_trimmed();
    Ok((out.success() && !value.is_empty()).then(|| value.to_owned()))
}

impl NetworkState {
    pub fn read(ctx: &OpContext<'_>) -> Result<Self, CoreError> {
        let wan_device = read_option(ctx, "network.wan.device")?;
        let wan_proto = read_option(ctx, "network.wan.proto")?;
        let mode = classify(
            &ctx.config.network,
            wan_device.as_deref(),
            wan_proto.as_deref(),
        );
        Ok(Self {
            mode,
            wan_device,
            wan_proto,
            lan_proto: read_option(ctx, "network.lan.proto")?,
            lan_ipaddr: read_option(ctx, "network.lan.ipaddr")?,
            lan_netmask: read_option(ctx, "network.lan.netmask")?,
        })
    }

    /// Whether the device is in `mode` with the LAN settings that mode asks for.
    pub fn matches(&self, mode: NetworkMode, ctx: &OpContext<'_>) -> bool {
        self.mode == mode
            && desired_settings(mode, ctx)
                .iter()
                .filter(|(key, _)| key.starts_with("network.lan."))
                .all(|(key, value)| self.lan_value(key) == Some(value.as_str()))
    }

    fn lan_value(&self, key: &str) -> Option<&str> {
        match key {
            "network.lan.proto" => self.lan_proto.as_deref(),
            "network.lan.ipaddr" => self.lan_ipaddr.as_deref(),
            "network.lan.netmask" => self.lan_netmask.as_deref(),
            _ => None,
        }
    }
}

pub fn classify(
    network: &NetworkSection,
    wan_device: Option<&str>,
    wan_proto: Option<&str>,
) -> NetworkMode {
    match (wan_device, wan_proto) {
        (Some(dev), Some("dhcp")) if dev == network.deploy_interface => NetworkMode::Forward,
        (Some(dev), Some(proto))
            if dev == network.production_interface && proto == network.production_proto =>
        {
            NetworkMode::Reverse
        }
        _ => NetworkMode::Unconfigured,
    }
}

/// Configuration options a mode sets, LAN first so that the replacement LAN
/// address is staged before anything else changes.
pub fn desired_settings(mode: NetworkMode, ctx: &OpContext<'_>) -> Vec<(&'static str, String)> {
    let net = &ctx.config.network;
    let (lan_ipaddr, wan_device, wan_proto) = match mode {
        NetworkMode::Forward => (
            net.lan_ipaddr.as_str(),
            net.deploy_interface.as_str(),
            "dhcp",
        ),
        NetworkMode::Reverse => (
            ctx.config.reverse_lan_ipaddr(),
            net.production_interface.as_str(),
            net.production_proto.as_str(),
        ),
        NetworkMode::Unconfigured => return Vec::new(),
    };
    vec![
        ("network.lan.proto", "static".to_owned()),
        ("network.lan.ipaddr", lan_ipaddr.to_owned()),
        ("network.lan.netmask", net.lan_netmask.clone()),
        ("network.wan.device", wan_device.to_owned()),
        ("network.wan.proto", wan_proto.to_owned()),
    ]
}

/// What a transition did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub from: NetworkMode,
    pub to: NetworkMode,
    pub reload_method: &'static str,
    pub routes_removed: usize,
    pub gateway: Option<WanGateway>,
}

/// Move the device into `to`.
pub fn apply_transition(ctx: &OpContext<'_>, to: NetworkMode) -> Result<TransitionReport, CoreError> {
    let from = NetworkState::read(ctx)?.mode;
    validate_transition(from, to)?;
    info!("network transition {from} -> {to}");

    for (key, value) in desired_settings(to, ctx) {
        ctx.must(&device::uci_set(key, &value), ctx.check_timeout())?;
    }

    let staged_lan = read_option(ctx, "network.lan.ipaddr")?;
    if staged_lan.is_none() {
        return Err(CoreError::LanAddressLost(format!(
            "network.lan.ipaddr is empty before switching to {to}"
        )));
    }

    let (reload_method, routes_removed, gateway) = commit_and_reload(ctx)?;
    Ok(TransitionReport {
        from,
        to,
        reload_method,
        routes_removed,
        gateway,
    })
}

/// Commit staged changes and bring routing in line with them.
fn commit_and_reload(
    ctx: &OpContext<'_>,
) -> Result<(&'static str, usize, Option<WanGateway>), CoreError> {
    ctx.must(&device::uci_commit("network"), ctx.check_timeout())?;

    let mut removed = cleanup_empty_gateway_routes(ctx)?;

    let install = ctx.install_timeout();
    let reload = |cmd: RemoteCommand| move || ctx.must(&cmd, install).map(drop);
    let chosen = try_in_order(
        "network reload",
        vec![
            Method::new("reload_config", reload(device::reload_config())),
            Method::new("ubus network reload", reload(device::ubus_network_reload())),
            Method::new("network restart", reload(device::network_restart())),
        ],
    )?;
    for skipped in &chosen.skipped {
        ctx.warn(format!("network reload fallback: {skipped}"));
    }

    let gateway = reinstall_default_route(ctx, WAN_INTERFACE)?;
    removed += cleanup_empty_gateway_routes(ctx)?;
    Ok((chosen.method, removed, gateway))
}
