//! Routing table reconciliation around network reloads.
//!
//! A reload can leave default routes whose gateway is empty or 0.0.0.0,
//! which black-hole upstream traffic. They are removed before and after the
//! reload, and the default route is re-derived from the WAN interface status.

use crate::context::OpContext;
use crate::CoreError;
use bringup_runtime::device;
use serde::Serialize;
use tracing::{debug, info};

/// One line of `ip route show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub line: String,
    words: Vec<String>,
}

impl Route {
    pub fn parse(line: &str) -> Option<Self> {
        let words: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        if words.is_empty() {
            return None;
        }
        Some(Self {
            line: words.join(" "),
            words,
        })
    }

    pub fn words(&self) -> Vec<&str> {
        self.words.iter().map(String::as_str).collect()
    }

    pub fn is_default(&self) -> bool {
        matches!(self.words[0].as_str(), "default" | "0.0.0.0/0")
    }

    fn value_after(&self, keyword: &str) -> Option<&str> {
        self.words
            .iter()
            .position(|w| w == keyword)
            .and_then(|i| self.words.get(i + 1))
            .map(String::as_str)
    }

    pub fn gateway(&self) -> Option<&str> {
        self.value_after("via")
    }

    pub fn device(&self) -> Option<&str> {
        self.value_after("dev")
    }

    /// A default route that names a gateway but has no usable one.
    /// Point-to-point routes without `via` are left alone.
    pub fn has_empty_gateway(&self) -> bool {
        if !self.is_default() || !self.words.iter().any(|w| w == "via") {
            return false;
        }
        match self.gateway() {
            None => true,
            Some(gw) => gw.is_empty() || gw == "0.0.0.0" || gw == "dev",
        }
    }
}

pub fn parse_routes(output: &str) -> Vec<Route> {
    output.lines().filter_map(Route::parse).collect()
}

/// Upstream gateway of the active WAN interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WanGateway {
    pub gateway: String,
    pub device: String,
}

/// Extract the default-route nexthop from `ubus call network.interface.<x>
/// status` output.
pub fn wan_gateway(status_json: &str) -> Option<WanGateway> {
    let doc: serde_json::Value = serde_json::from_str(status_json).ok()?;
    let device = doc["l3_device"]
        .as_str()
        .or_else(|| doc["device"].as_str())
        .filter(|d| !d.is_empty())?;
    doc["route"].as_array()?.iter().find_map(|route| {
        let is_default =
            route["target"].as_str() == Some("0.0.0.0") && route["mask"].as_u64() == Some(0);
        let nexthop = route["nexthop"].as_str()?;
        (is_default && !nexthop.is_empty() && nexthop != "0.0.0.0").then(|| WanGateway {
            gateway: nexthop.to_owned(),
            device: device.to_owned(),
        })
    })
}

/// Delete every default route with an empty gateway. Returns how many were
/// removed; a route that cannot be deleted is reported as a warning.
pub fn cleanup_empty_gateway_routes(ctx: &OpContext<'_>) -> Result<usize, CoreError> {
    let out = ctx.must(&device::route_show(), ctx.check_timeout())?;
    let mut removed = 0;
    for route in parse_routes(&out.stdout).iter().filter(|r| r.has_empty_gateway()) {
        let del = ctx.run(&device::route_del(&route.words()), ctx.check_timeout())?;
        if del.success() {
            debug!("removed stale route: {}", route.line);
            removed += 1;
        } else {
            ctx.warn(format!(
                "could not remove stale route '{}': {}",
                route.line,
                del.summary()
            ));
        }
    }
    Ok(removed)
}

/// Install the default route through the gateway `interface` currently
/// reports. `None` when the interface has no gateway (yet).
pub fn reinstall_default_route(
    ctx: &OpContext<'_>,
    interface: &str,
) -> Result<Option<WanGateway>, CoreError> {
    let status = ctx.query(&device::wan_status(interface))?;
    if !status.success() {
        ctx.warn(format!(
            "could not read {interface} status: {}",
            status.summary()
        ));
        return Ok(None);
    }
    let Some(gw) = wan_gateway(&status.stdout) else {
        debug!("{interface} has no default gateway, not installing a route");
        return Ok(None);
    };
    ctx.must(
        &device::route_replace_default(&gw.gateway, &gw.device),
        ctx.check_timeout(),
    )?;
    info!("default route via {} dev {}", gw.gateway, gw.device);
    Ok(Some(gw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bringup_runtime::MockExecutor;
    use bringup_schema::DeployConfig;

    #[test]
    fn empty_gateway_patterns() {
        let stale = [
            "default via 0.0.0.0 dev eth1 metric 10",
            "default via dev eth1",
            "0.0.0.0/0 via 0.0.0.0 dev wwan0",
        ];
        for line in stale {
            assert!(Route::parse(line).unwrap().has_empty_gateway(), "{line}");
        }
        let healthy = [
            "default via 192.168.100.1 dev eth1 proto dhcp",
            "default dev wwan0 proto static",
            "192.168.8.0/24 dev br-lan proto kernel scope link src 192.168.8.1",
        ];
        for line in healthy {
            assert!(!Route::parse(line).unwrap().has_empty_gateway(), "{line}");
        }
    }

    #[test]
    fn route_fields() {
        let r = Route::parse("default  via 10.0.0.1 dev eth0 ").unwrap();
        assert!(r.is_default());
        assert_eq!(r.gateway(), Some("10.0.0.1"));
        assert_eq!(r.device(), Some("eth0"));
        assert_eq!(r.line, "default via 10.0.0.1 dev eth0");
        assert!(parse_routes("\n\n").is_empty());
    }

    #[test]
    fn wan_gateway_from_status() {
        let up = r#"{"up":true,"l3_device":"eth1","route":[{"target":"0.0.0.0","mask":0,"nexthop":"192.168.100.1"}]}"#;
        assert_eq!(
            wan_gateway(up),
            Some(WanGateway {
                gateway: "192.168.100.1".to_owned(),
                device: "eth1".to_owned(),
            })
        );
        let down = r#"{"up":false,"l3_device":"wwan0","route":[]}"#;
        assert_eq!(wan_gateway(down), None);
        let empty_hop = r#"{"l3_device":"eth1","route":[{"target":"0.0.0.0","mask":0,"nexthop":"0.0.0.0"}]}"#;
        assert_eq!(wan_gateway(empty_hop), None);
        assert_eq!(wan_gateway("not json"), None);
    }

    #[test]
    fn cleanup_removes_every_stale_route_and_reinstall_adds_one() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        exec.device().routes.extend([
            "default via 0.0.0.0 dev eth0 metric 10".to_owned(),
            "default via 0.0.0.0 dev eth0 metric 20".to_owned(),
        ]);
        let ctx = OpContext::new(&target, &exec, &config);

        assert_eq!(cleanup_empty_gateway_routes(&ctx).unwrap(), 2);
        let gw = reinstall_default_route(&ctx, "wan").unwrap().unwrap();
        assert_eq!(gw.gateway, "10.0.0.1");
        assert_eq!(
            exec.device().default_routes(),
            ["default via 10.0.0.1 dev eth0"]
        );
    }

    #[test]
    fn no_route_is_added_without_a_gateway() {
        let config = DeployConfig::for_address("192.168.8.1");
        let target = config.to_target();
        let exec = MockExecutor::new();
        {
            let mut dev = exec.device();
            dev.set_uci("network.wan.device", "wwan0");
            dev.routes.retain(|r| !r.starts_with("default"));
        }
        let ctx = OpContext::new(&target, &exec, &config);
        assert_eq!(reinstall_default_route(&ctx, "wan").unwrap(), None);
        assert!(exec.device().default_routes().is_empty());
    }
}
