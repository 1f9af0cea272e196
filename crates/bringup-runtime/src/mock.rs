//! A simulated OpenWrt-style appliance behind the `Executor` trait.
//!
//! `MockExecutor` interprets the command vocabulary of [`crate::device`]
//! against an in-memory [`FakeDevice`]. Tests flip the public fields of the
//! device to inject failures (unreachable host, busy configuration tool,
//! failing image pulls, low disk, missing reload methods) and inspect the
//! resulting state afterwards.

use crate::command::{ExecOutput, RemoteCommand};
use crate::executor::Executor;
use crate::ExecError;
use bringup_schema::Elevation;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const RUNTIME_VERSION: &str = "24.0.9";
const NOT_FOUND: i32 = 127;

#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub address: String,
    pub reachable: bool,
    pub auth_ok: bool,
    /// The login account is not root: anything beyond plain reads needs sudo.
    pub sudo_only: bool,
    /// The management session reaches `address` over the LAN bridge, so it
    /// drops once a reload moves the LAN elsewhere.
    pub session_over_lan: bool,
    /// LAN address in effect since the last network reload.
    pub live_lan_ipaddr: String,

    /// Committed configuration, `package.section.option -> value`.
    pub uci: BTreeMap<String, String>,
    /// Staged by `uci set`, applied by `uci commit`.
    pub pending: BTreeMap<String, String>,
    /// Configuration-tool writes fail with "Resource busy" this many times.
    pub uci_busy_failures: u32,
    /// Commits that left the device without a LAN address.
    pub lan_address_gaps: u32,

    pub routes: Vec<String>,
    /// Upstream gateway handed out on each interface; absent = no carrier.
    pub gateways: BTreeMap<String, String>,
    /// Every network reload leaves a default route with a 0.0.0.0 gateway.
    pub stale_routes_on_reload: bool,
    /// Available reload mechanisms: `reload_config`, `ubus`, `restart`.
    pub reload_methods: BTreeSet<String>,
    pub reload_count: u32,

    pub package_manager: Option<String>,
    pub runtime_in_default_repo: bool,
    pub upstream_installer_works: bool,
    pub package_install_failures: u32,
    pub runtime_installed: bool,
    pub runtime_running: bool,

    pub images: BTreeSet<String>,
    /// Remaining failures per image before a pull succeeds.
    pub pull_failures: BTreeMap<String, u32>,
    pub pull_attempts: BTreeMap<String, u32>,
    pub free_kb: u64,
    /// Space an image prune gives back.
    pub reclaimable_kb: u64,
    pub prune_count: u32,
    pub compose_v2: bool,
    pub compose_standalone: bool,
    pub containers: BTreeSet<String>,
    pub dirs: BTreeSet<String>,

    /// Nameservers that actually answer.
    pub working_resolvers: BTreeSet<String>,
    /// Upstream internet is reachable through a usable default route.
    pub wan_online: bool,

    pub files: BTreeMap<String, String>,
    pub passwords: BTreeMap<String, String>,
    /// Programs that exit 127.
    pub missing_tools: BTreeSet<String>,
    /// Every command executed, redacted.
    pub log: Vec<String>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        let uci = [
            ("network.lan.proto", "static"),
            ("network.lan.ipaddr", "192.168.8.1"),
            ("network.lan.netmask", "255.255.255.0"),
            ("network.wan.proto", "dhcp"),
            ("network.wan.device", "eth0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        let gateways = [("eth0", "10.0.0.1"), ("eth1", "192.168.100.1")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let files = [(
            crate::device::RESOLV_CONF.to_owned(),
            "nameserver 127.0.0.1\n".to_owned(),
        )]
        .into_iter()
        .collect();

        Self {
            address: "192.168.8.1".to_owned(),
            reachable: true,
            auth_ok: true,
            sudo_only: false,
            session_over_lan: true,
            live_lan_ipaddr: "192.168.8.1".to_owned(),
            uci,
            pending: BTreeMap::new(),
            uci_busy_failures: 0,
            lan_address_gaps: 0,
            routes: vec![
                "default via 10.0.0.1 dev eth0".to_owned(),
                "192.168.8.0/24 dev br-lan proto kernel scope link src 192.168.8.1".to_owned(),
            ],
            gateways,
            stale_routes_on_reload: false,
            reload_methods: ["reload_config", "ubus", "restart"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            reload_count: 0,
            package_manager: Some("opkg".to_owned()),
            runtime_in_default_repo: true,
            upstream_installer_works: true,
            package_install_failures: 0,
            runtime_installed: false,
            runtime_running: false,
            images: BTreeSet::new(),
            pull_failures: BTreeMap::new(),
            pull_attempts: BTreeMap::new(),
            free_kb: 4 * 1024 * 1024,
            reclaimable_kb: 0,
            prune_count: 0,
            compose_v2: true,
            compose_standalone: false,
            containers: BTreeSet::new(),
            dirs: BTreeSet::new(),
            working_resolvers: ["8.8.8.8", "1.1.1.1"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            wan_online: true,
            files,
            passwords: BTreeMap::new(),
            missing_tools: BTreeSet::new(),
            log: Vec::new(),
        }
    }
}

fn ok() -> ExecOutput {
    ExecOutput::ok("")
}

fn not_found(program: &str) -> ExecOutput {
    ExecOutput::failed(NOT_FOUND, format!("sh: {program}: not found"))
}

fn under_tmp(path: &str) -> bool {
    path.starts_with("/tmp/")
}

/// Commands an unprivileged login cannot run successfully.
fn needs_root(program: &str, args: &[String]) -> bool {
    let words: Vec<&str> = args.iter().map(String::as_str).collect();
    match (program, words.as_slice()) {
        ("echo" | "which" | "df" | "nslookup" | "host" | "ping" | "wget" | "cat", _) => false,
        ("uci", ["-q", "get", ..]) => false,
        ("ip", ["route", "show"]) => false,
        ("test", [_, path]) => !under_tmp(path),
        _ => true,
    }
}

fn permission_denied(program: &str) -> ExecOutput {
    match program {
        "docker" => ExecOutput::failed(
            1,
            "permission denied while trying to connect to the Docker daemon socket at unix:///var/run/docker.sock",
        ),
        // test -f on an unreadable directory is indistinguishable from a missing file
        "test" => ExecOutput::failed(1, ""),
        _ => ExecOutput::failed(1, format!("{program}: Permission denied")),
    }
}

impl FakeDevice {
    pub fn uci_value(&self, key: &str) -> Option<&str> {
        self.uci.get(key).map(String::as_str)
    }

    pub fn set_uci(&mut self, key: &str, value: &str) {
        self.uci.insert(key.to_owned(), value.to_owned());
    }

    /// Commands whose rendered form starts with `prefix`.
    pub fn commands_matching(&self, prefix: &str) -> usize {
        self.log.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn default_routes(&self) -> Vec<&str> {
        self.routes
            .iter()
            .map(String::as_str)
            .filter(|r| r.starts_with("default"))
            .collect()
    }

    fn tool_available(&self, tool: &str) -> bool {
        if self.missing_tools.contains(tool) {
            return false;
        }
        match tool {
            "opkg" | "apt-get" => self.package_manager.as_deref() == Some(tool),
            "docker" => self.runtime_installed,
            "docker-compose" => self.compose_standalone,
            _ => true,
        }
    }

    fn has_usable_default_route(&self) -> bool {
        self.routes.iter().any(|r| {
            let words: Vec<&str> = r.split_whitespace().collect();
            words.first() == Some(&"default")
                && words
                    .windows(2)
                    .any(|w| w[0] == "via" && w[1] != "0.0.0.0")
        })
    }

    fn dns_works(&self) -> bool {
        let resolv = self
            .files
            .get(crate::device::RESOLV_CONF)
            .map_or("", String::as_str);
        self.wan_online
            && resolv.lines().any(|l| {
                l.strip_prefix("nameserver ")
                    .is_some_and(|ns| self.working_resolvers.contains(ns.trim()))
            })
    }

    fn wan_device(&self) -> Option<String> {
        self.uci.get("network.wan.device").cloned()
    }

    fn wan_gateway(&self) -> Option<String> {
        self.wan_device().and_then(|d| self.gateways.get(&d).cloned())
    }

    /// Bring the routing table in line with the committed configuration.
    fn apply_network(&mut self) {
        self.reload_count += 1;
        if let Some(lan) = self.uci.get("network.lan.ipaddr") {
            self.live_lan_ipaddr = lan.clone();
        }
        self.routes.retain(|r| !r.starts_with("default"));
        let Some(dev) = self.wan_device() else {
            return;
        };
        if let Some(gw) = self.gateways.get(&dev) {
            self.routes.push(format!("default via {gw} dev {dev} proto dhcp"));
        }
        if self.stale_routes_on_reload {
            self.routes
                .push(format!("default via 0.0.0.0 dev {dev} metric 10"));
        }
    }

    fn busy(&mut self) -> Option<ExecOutput> {
        if self.uci_busy_failures > 0 {
            self.uci_busy_failures -= 1;
            return Some(ExecOutput::failed(1, "uci: Resource busy"));
        }
        None
    }

    fn uci(&mut self, args: &[String]) -> ExecOutput {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["-q", "get", key] => match self.pending.get(*key).or_else(|| self.uci.get(*key)) {
                Some(v) => ExecOutput::ok(format!("{v}\n")),
                None => ExecOutput::failed(1, ""),
            },
            ["set", assignment] => {
                if let Some(out) = self.busy() {
                    return out;
                }
                match assignment.split_once('=') {
                    Some((k, v)) => {
                        self.pending.insert(k.to_owned(), v.to_owned());
                        ok()
                    }
                    None => ExecOutput::failed(1, "uci: Invalid argument"),
                }
            }
            ["commit", package] => {
                if let Some(out) = self.busy() {
                    return out;
                }
                let prefix = format!("{package}.");
                let staged: Vec<String> = self
                    .pending
                    .keys()
                    .filter(|k| k.starts_with(&prefix))
                    .cloned()
                    .collect();
                for key in staged {
                    if let Some(v) = self.pending.remove(&key) {
                        self.uci.insert(key, v);
                    }
                }
                if !self.uci.contains_key("network.lan.ipaddr") {
                    self.lan_address_gaps += 1;
                }
                ok()
            }
            _ => ExecOutput::failed(1, "uci: Invalid argument"),
        }
    }

    fn reload_via(&mut self, method: &str, program: &str) -> ExecOutput {
        if !self.reload_methods.contains(method) {
            return not_found(program);
        }
        self.apply_network();
        ok()
    }

    fn ubus(&mut self, args: &[String]) -> ExecOutput {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["call", "network", "reload"] => self.reload_via("ubus", "ubus"),
            ["call", object, "status"] if object.starts_with("network.interface.") => {
                let l3_device = self.wan_device().unwrap_or_default();
                let doc = match self.wan_gateway() {
                    Some(gw) => serde_json::json!({
                        "up": true,
                        "l3_device": l3_device,
                        "route": [{"target": "0.0.0.0", "mask": 0, "nexthop": gw}],
                    }),
                    None => serde_json::json!({
                        "up": false,
                        "l3_device": l3_device,
                        "route": [],
                    }),
                };
                ExecOutput::ok(doc.to_string())
            }
            _ => ExecOutput::failed(4, "Command failed: Not found"),
        }
    }

    fn ip(&mut self, args: &[String]) -> ExecOutput {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["route", "show"] => {
                let mut out = self.routes.join("\n");
                out.push('\n');
                ExecOutput::ok(out)
            }
            ["route", "del", route @ ..] => {
                let pos = self.routes.iter().position(|r| {
                    r.split_whitespace().collect::<Vec<_>>().as_slice() == route
                });
                match pos {
                    Some(i) => {
                        self.routes.remove(i);
                        ok()
                    }
                    None => ExecOutput::failed(2, "RTNETLINK answers: No such process"),
                }
            }
            ["route", "replace", "default", "via", gw, "dev", dev] => {
                // same key as any unmetered default route
                self.routes
                    .retain(|r| !(r.starts_with("default") && !r.contains(" metric ")));
                self.routes.push(format!("default via {gw} dev {dev}"));
                ok()
            }
            _ => ExecOutput::failed(1, "Command line is not complete."),
        }
    }

    fn docker(&mut self, args: &[String]) -> ExecOutput {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        if !self.runtime_running && words.first() != Some(&"compose") {
            return ExecOutput::failed(
                1,
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
            );
        }
        match words.as_slice() {
            ["info", ..] => ExecOutput::ok(format!("{RUNTIME_VERSION}\n")),
            ["pull", image] => {
                *self.pull_attempts.entry((*image).to_owned()).or_default() += 1;
                if let Some(remaining) = self.pull_failures.get_mut(*image) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return ExecOutput::failed(
                            1,
                            format!("error pulling image {image}: unexpected EOF"),
                        );
                    }
                }
                self.images.insert((*image).to_owned());
                ExecOutput::ok(format!("Status: Downloaded newer image for {image}\n"))
            }
            ["image", "prune", "-f"] => {
                self.prune_count += 1;
                let reclaimed = std::mem::take(&mut self.reclaimable_kb);
                self.free_kb += reclaimed;
                ExecOutput::ok(format!("Total reclaimed space: {reclaimed}kB\n"))
            }
            ["compose", "-f", descriptor, "up", "-d"] => {
                if !self.compose_v2 {
                    return ExecOutput::failed(1, "docker: 'compose' is not a docker command.");
                }
                self.compose_up(descriptor)
            }
            ["ps", "--filter", filter, "--format", _] => {
                let name = filter
                    .strip_prefix("name=^")
                    .and_then(|n| n.strip_suffix('$'))
                    .unwrap_or_default();
                if self.containers.contains(name) {
                    ExecOutput::ok(format!("{name}\n"))
                } else {
                    ok()
                }
            }
            _ => ExecOutput::failed(1, "docker: unknown command"),
        }
    }

    fn compose_up(&mut self, descriptor: &str) -> ExecOutput {
        if !self.runtime_running {
            return ExecOutput::failed(1, "Cannot connect to the Docker daemon");
        }
        let Some(raw) = self.files.get(descriptor) else {
            return ExecOutput::failed(14, format!("open {descriptor}: no such file or directory"));
        };
        let doc: serde_json::Value = match serde_json::from_str(raw) {
            Ok(doc) => doc,
            Err(e) => return ExecOutput::failed(15, format!("yaml: {e}")),
        };
        let Some(services) = doc["services"].as_object() else {
            return ExecOutput::failed(15, "no services defined");
        };
        let mut started = Vec::new();
        for entry in services.values() {
            let image = entry["image"].as_str().unwrap_or_default();
            if !self.images.contains(image) {
                return ExecOutput::failed(18, format!("pull access denied for {image}"));
            }
            if let Some(name) = entry["container_name"].as_str() {
                started.push(name.to_owned());
            }
        }
        self.containers.extend(started);
        ok()
    }

    /// procd init scripts ship with the opkg package only.
    fn has_init_script(&self) -> bool {
        self.runtime_installed && self.package_manager.as_deref() == Some("opkg")
    }

    fn init_script(&mut self, service: &str, action: &str) -> ExecOutput {
        match (service, action) {
            ("network", "restart") => self.reload_via("restart", "/etc/init.d/network"),
            ("network", "reload") => {
                self.apply_network();
                ok()
            }
            ("dockerd", "start" | "restart") if self.has_init_script() => {
                self.runtime_running = true;
                ok()
            }
            ("dockerd", "enable") if self.has_init_script() => ok(),
            _ => not_found(&format!("/etc/init.d/{service}")),
        }
    }

    fn package(&mut self, manager: &str, args: &[String]) -> ExecOutput {
        match args.first().map(String::as_str) {
            Some("update") => ok(),
            Some("install") => {
                if self.package_install_failures > 0 {
                    self.package_install_failures -= 1;
                    return ExecOutput::failed(255, "wget returned 4: download interrupted");
                }
                if self.runtime_in_default_repo {
                    self.runtime_installed = true;
                    ok()
                } else if manager == "apt-get" {
                    ExecOutput::failed(100, "E: Unable to locate package docker.io")
                } else {
                    ExecOutput::failed(255, "Unknown package 'dockerd'.")
                }
            }
            _ => ExecOutput::failed(1, "usage"),
        }
    }

    fn lookup(&self) -> ExecOutput {
        if self.dns_works() {
            ExecOutput::ok("Name:\tresolved\nAddress: 203.0.113.10\n")
        } else {
            ExecOutput::failed(1, ";; connection timed out; no servers could be reached")
        }
    }

    fn reachable_upstream(&self, what: &str) -> ExecOutput {
        if self.wan_online && self.has_usable_default_route() {
            ok()
        } else {
            ExecOutput::failed(1, format!("{what}: Network unreachable"))
        }
    }

    fn df(&self, path: &str) -> ExecOutput {
        ExecOutput::ok(format!(
            "Filesystem     1024-blocks    Used Available Capacity Mounted on\n\
             /dev/root         16000000  120000 {} 5% {path}\n",
            self.free_kb
        ))
    }

    /// Whether the management session still has a path to the device.
    pub fn session_alive(&self) -> bool {
        !self.session_over_lan || self.live_lan_ipaddr == self.address
    }

    /// Interpret one command as root. Programs outside the vocabulary exit 127.
    pub fn run(&mut self, cmd: &RemoteCommand) -> ExecOutput {
        self.run_as(cmd, true)
    }

    /// Interpret one command, as root only when `as_root` is set.
    pub fn run_as(&mut self, cmd: &RemoteCommand, as_root: bool) -> ExecOutput {
        self.log.push(cmd.to_string());
        let program = cmd.program();
        let args = cmd.arguments();
        if !self.tool_available(program) {
            return not_found(program);
        }
        if self.sudo_only && !as_root && needs_root(program, args) {
            return permission_denied(program);
        }
        let first = args.first().map(String::as_str).unwrap_or_default();

        match program {
            "echo" => ExecOutput::ok(format!("{}\n", args.join(" "))),
            "uci" => self.uci(args),
            "ubus" => self.ubus(args),
            "reload_config" => self.reload_via("reload_config", program),
            "ip" => self.ip(args),
            "docker" => self.docker(args),
            "docker-compose" => match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                ["-f", descriptor, "up", "-d"] => self.compose_up(descriptor),
                _ => ExecOutput::failed(1, "usage"),
            },
            "which" => {
                if self.tool_available(first) {
                    ExecOutput::ok(format!("/usr/bin/{first}\n"))
                } else {
                    ExecOutput::failed(1, "")
                }
            }
            "opkg" | "apt-get" => self.package(program, args),
            "curl" => {
                if self.upstream_installer_works {
                    if let Some(path) = args.iter().skip_while(|a| *a != "-o").nth(1) {
                        self.files.insert(path.clone(), "#!/bin/sh\n".to_owned());
                    }
                    ok()
                } else {
                    ExecOutput::failed(22, "curl: (22) The requested URL returned error: 404")
                }
            }
            "sh" => {
                if self.files.contains_key(first) && self.upstream_installer_works {
                    self.runtime_installed = true;
                    ok()
                } else {
                    ExecOutput::failed(1, format!("sh: can't open '{first}'"))
                }
            }
            "systemctl" => {
                if self.runtime_installed && self.package_manager.as_deref() == Some("apt-get") {
                    self.runtime_running = true;
                    ok()
                } else {
                    not_found(program)
                }
            }
            "df" => self.df(args.last().map_or("/", String::as_str)),
            "mkdir" => {
                if let Some(dir) = args.last() {
                    self.dirs.insert(dir.clone());
                }
                ok()
            }
            "nslookup" | "host" => self.lookup(),
            "ping" | "wget" => self.reachable_upstream(program),
            "cat" => match self.files.get(first) {
                Some(content) => ExecOutput::ok(content.clone()),
                None => ExecOutput::failed(1, format!("cat: can't open '{first}': No such file or directory")),
            },
            "tee" => {
                let path = args.last().cloned().unwrap_or_default();
                let data = cmd.stdin_data().unwrap_or_default().to_owned();
                self.files.entry(path).or_default().push_str(&data);
                ExecOutput::ok(data)
            }
            "passwd" => {
                let pw = cmd
                    .stdin_data()
                    .and_then(|s| s.lines().next())
                    .unwrap_or_default();
                self.passwords.insert(first.to_owned(), pw.to_owned());
                ExecOutput::ok("passwd: password for root changed by root\n")
            }
            "sysupgrade" => {
                let path = args.get(1).cloned().unwrap_or_default();
                match first {
                    "-b" => match serde_json::to_string(&self.uci) {
                        Ok(dump) => {
                            self.files.insert(path, dump);
                            ok()
                        }
                        Err(e) => ExecOutput::failed(1, e.to_string()),
                    },
                    "-r" => {
                        let restored = self
                            .files
                            .get(&path)
                            .and_then(|raw| serde_json::from_str::<BTreeMap<String, String>>(raw).ok());
                        match restored {
                            Some(uci) => {
                                self.uci = uci;
                                self.pending.clear();
                                ok()
                            }
                            None => ExecOutput::failed(1, format!("Cannot open archive {path}")),
                        }
                    }
                    _ => ExecOutput::failed(1, "usage"),
                }
            }
            "test" => {
                let path = args.get(1).map_or("", String::as_str);
                if self.files.contains_key(path) {
                    ok()
                } else {
                    ExecOutput::failed(1, "")
                }
            }
            "rm" => {
                if let Some(path) = args.last() {
                    self.files.remove(path);
                }
                ok()
            }
            "mv" => match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                ["-f", from, to] => match self.files.remove(*from) {
                    Some(content) => {
                        self.files.insert((*to).to_owned(), content);
                        ok()
                    }
                    None => ExecOutput::failed(1, format!("mv: can't rename '{from}': No such file or directory")),
                },
                _ => ExecOutput::failed(1, "usage"),
            },
            p if p.starts_with("/etc/init.d/") => {
                let service = p.trim_start_matches("/etc/init.d/");
                self.init_script(service, first)
            }
            _ => not_found(program),
        }
    }
}

/// Executor over a [`FakeDevice`], for tests that exercise the full
/// orchestration path without a real appliance.
pub struct MockExecutor {
    device: Mutex<FakeDevice>,
    elevation: Elevation,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::with_device(FakeDevice::default())
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(device: FakeDevice) -> Self {
        Self {
            device: Mutex::new(device),
            elevation: Elevation::None,
        }
    }

    /// Elevate privileged commands the way the configured Target would.
    #[must_use]
    pub fn with_elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    /// Inspect or mutate the simulated device.
    pub fn device(&self) -> MutexGuard<'_, FakeDevice> {
        self.device
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn connect(&self) -> Result<MutexGuard<'_, FakeDevice>, ExecError> {
        let device = self.device();
        if !device.reachable || !device.session_alive() {
            return Err(ExecError::Unreachable {
                address: device.address.clone(),
                reason: "connection timed out".to_owned(),
            });
        }
        if !device.auth_ok {
            return Err(ExecError::AuthFailed {
                destination: format!("root@{}", device.address),
                reason: "Permission denied (password)".to_owned(),
            });
        }
        Ok(device)
    }
}

impl Executor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn execute(&self, cmd: &RemoteCommand, _timeout: Duration) -> Result<ExecOutput, ExecError> {
        if cmd.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let mut device = self.connect()?;
        let as_root = !device.sudo_only
            || (cmd.is_privileged() && self.elevation == Elevation::Sudo);
        Ok(device.run_as(cmd, as_root))
    }

    fn copy(&self, local: &Path, remote: &str, _timeout: Duration) -> Result<(), ExecError> {
        let content = std::fs::read_to_string(local)?;
        let mut device = self.connect()?;
        device.log.push(format!("scp {remote}"));
        if device.sudo_only && !under_tmp(remote) {
            return Err(ExecError::Transfer {
                remote: remote.to_owned(),
                reason: format!("scp: {remote}: Permission denied"),
            });
        }
        device.files.insert(remote.to_owned(), content);
        Ok(())
    }
}
