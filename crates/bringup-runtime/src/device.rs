//! Typed constructors for every command issued against the appliance.
//!
//! Operations build commands through these functions instead of formatting
//! shell strings; the simulated device in [`crate::mock`] interprets the same
//! vocabulary.

use crate::command::RemoteCommand;

pub const PROBE_TOKEN: &str = "bringup-probe";
pub const RESOLV_CONF: &str = "/etc/resolv.conf";
pub const UPSTREAM_INSTALLER_URL: &str = "https://get.docker.com";
pub const UPSTREAM_INSTALLER_PATH: &str = "/tmp/get-docker.sh";

pub fn probe() -> RemoteCommand {
    RemoteCommand::new("echo").arg(PROBE_TOKEN)
}

// configuration tool

pub fn uci_get(key: &str) -> RemoteCommand {
    RemoteCommand::new("uci").args(["-q", "get", key])
}

pub fn uci_set(key: &str, value: &str) -> RemoteCommand {
    RemoteCommand::new("uci")
        .arg("set")
        .arg(format!("{key}={value}"))
        .privileged()
}

pub fn uci_commit(package: &str) -> RemoteCommand {
    RemoteCommand::new("uci")
        .args(["commit", package])
        .privileged()
}

// network service stack

/// Native reconfiguration: reloads only services whose config changed.
pub fn reload_config() -> RemoteCommand {
    RemoteCommand::new("reload_config").privileged()
}

/// The reload the web UI triggers after "Save & Apply".
pub fn ubus_network_reload() -> RemoteCommand {
    RemoteCommand::new("ubus")
        .args(["call", "network", "reload"])
        .privileged()
}

pub fn network_restart() -> RemoteCommand {
    RemoteCommand::new("/etc/init.d/network")
        .arg("restart")
        .privileged()
}

/// Lightweight reload used after a restore.
pub fn network_reload() -> RemoteCommand {
    RemoteCommand::new("/etc/init.d/network")
        .arg("reload")
        .privileged()
}

pub fn wan_status(interface: &str) -> RemoteCommand {
    RemoteCommand::new("ubus").args([
        "call".to_owned(),
        format!("network.interface.{interface}"),
        "status".to_owned(),
    ])
    // the ubus ACL hides interface status from non-root sessions
    .privileged()
}

// routing table

pub fn route_show() -> RemoteCommand {
    RemoteCommand::new("ip").args(["route", "show"])
}

/// Delete a route given the words of its `ip route show` line.
pub fn route_del(route_words: &[&str]) -> RemoteCommand {
    RemoteCommand::new("ip")
        .args(["route", "del"])
        .args(route_words.iter().copied())
        .privileged()
}

pub fn route_replace_default(gateway: &str, device: &str) -> RemoteCommand {
    RemoteCommand::new("ip")
        .args(["route", "replace", "default", "via", gateway, "dev", device])
        .privileged()
}

// container runtime

pub fn runtime_info() -> RemoteCommand {
    RemoteCommand::new("docker")
        .args(["info", "--format", "{{.ServerVersion}}"])
        .privileged()
}

pub fn which(tool: &str) -> RemoteCommand {
    RemoteCommand::new("which").arg(tool)
}

pub fn package_update(manager: &str) -> RemoteCommand {
    RemoteCommand::new(manager).arg("update").privileged()
}

pub fn package_install(manager: &str, packages: &[&str]) -> RemoteCommand {
    let cmd = RemoteCommand::new(manager).arg("install");
    let cmd = if manager == "apt-get" {
        cmd.arg("-y")
    } else {
        cmd
    };
    cmd.args(packages.iter().copied()).privileged()
}

pub fn fetch_upstream_installer() -> RemoteCommand {
    RemoteCommand::new("curl")
        .args(["-fsSL", "-o", UPSTREAM_INSTALLER_PATH, UPSTREAM_INSTALLER_URL])
        .privileged()
}

pub fn run_upstream_installer() -> RemoteCommand {
    RemoteCommand::new("sh")
        .arg(UPSTREAM_INSTALLER_PATH)
        .privileged()
}

pub fn init_script(service: &str, action: &str) -> RemoteCommand {
    RemoteCommand::new(format!("/etc/init.d/{service}"))
        .arg(action)
        .privileged()
}

pub fn systemctl_enable_now(unit: &str) -> RemoteCommand {
    RemoteCommand::new("systemctl")
        .args(["enable", "--now", unit])
        .privileged()
}

pub fn disk_free(path: &str) -> RemoteCommand {
    RemoteCommand::new("df").args(["-Pk", path])
}

pub fn mkdir_p(path: &str) -> RemoteCommand {
    RemoteCommand::new("mkdir").args(["-p", path]).privileged()
}

pub fn image_pull(image: &str) -> RemoteCommand {
    RemoteCommand::new("docker").args(["pull", image]).privileged()
}

pub fn image_prune() -> RemoteCommand {
    RemoteCommand::new("docker")
        .args(["image", "prune", "-f"])
        .privileged()
}

pub fn compose_up(descriptor: &str) -> RemoteCommand {
    RemoteCommand::new("docker")
        .args(["compose", "-f", descriptor, "up", "-d"])
        .privileged()
}

pub fn compose_up_standalone(descriptor: &str) -> RemoteCommand {
    RemoteCommand::new("docker-compose")
        .args(["-f", descriptor, "up", "-d"])
        .privileged()
}

pub fn container_running(name: &str) -> RemoteCommand {
    RemoteCommand::new("docker").args([
        "ps".to_owned(),
        "--filter".to_owned(),
        format!("name=^{name}$"),
        "--format".to_owned(),
        "{{.Names}}".to_owned(),
    ])
    .privileged()
}

// name resolution and reachability

pub fn nslookup(host: &str) -> RemoteCommand {
    RemoteCommand::new("nslookup").arg(host)
}

pub fn host_lookup(host: &str) -> RemoteCommand {
    RemoteCommand::new("host").arg(host)
}

pub fn ping_once(host: &str) -> RemoteCommand {
    RemoteCommand::new("ping").args(["-c", "1", "-W", "3", host])
}

pub fn http_fetch(url: &str) -> RemoteCommand {
    RemoteCommand::new("wget").args(["-q", "-O", "/dev/null", url])
}

pub fn read_file(path: &str) -> RemoteCommand {
    RemoteCommand::new("cat").arg(path)
}

pub fn append_line(path: &str, line: &str) -> RemoteCommand {
    RemoteCommand::new("tee")
        .args(["-a", path])
        .stdin(format!("{line}\n"))
        .privileged()
}

// credentials

pub fn set_password(user: &str, password: &str) -> RemoteCommand {
    RemoteCommand::new("passwd")
        .arg(user)
        .secret_stdin(format!("{password}\n{password}\n"))
        .privileged()
}

// snapshots

pub fn config_backup(path: &str) -> RemoteCommand {
    RemoteCommand::new("sysupgrade")
        .args(["-b", path])
        .privileged()
}

pub fn config_restore(path: &str) -> RemoteCommand {
    RemoteCommand::new("sysupgrade")
        .args(["-r", path])
        .privileged()
}

/// Snapshots live in root-owned directories, so the check runs elevated.
pub fn file_exists(path: &str) -> RemoteCommand {
    RemoteCommand::new("test").args(["-f", path]).privileged()
}

pub fn move_file(from: &str, to: &str) -> RemoteCommand {
    RemoteCommand::new("mv").args(["-f", from, to]).privileged()
}

pub fn remove_file(path: &str) -> RemoteCommand {
    RemoteCommand::new("rm").args(["-f", path]).privileged()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bringup_schema::Elevation;

    #[test]
    fn uci_set_joins_key_and_value() {
        let cmd = uci_set("network.wan.proto", "dhcp");
        assert_eq!(cmd.arguments(), ["set", "network.wan.proto=dhcp"]);
        assert!(cmd.is_privileged());
    }

    #[test]
    fn container_filter_is_anchored() {
        let cmd = container_running("bringup-node-red");
        assert!(cmd
            .arguments()
            .contains(&"name=^bringup-node-red$".to_owned()));
    }

    #[test]
    fn apt_install_is_non_interactive() {
        let cmd = package_install("apt-get", &["docker.io"]);
        assert_eq!(
            cmd.render(Elevation::None),
            "apt-get install -y docker.io"
        );
        let cmd = package_install("opkg", &["dockerd"]);
        assert_eq!(cmd.render(Elevation::None), "opkg install dockerd");
    }

    #[test]
    fn read_only_commands_are_not_privileged() {
        for cmd in [probe(), uci_get("network.lan.ipaddr"), route_show()] {
            assert!(!cmd.is_privileged(), "{cmd}");
        }
    }

    #[test]
    fn root_only_reads_are_elevated_under_sudo() {
        for cmd in [
            file_exists("/root/bringup-backup.tar.gz"),
            runtime_info(),
            container_running("bringup-mosquitto"),
            wan_status("wan"),
        ] {
            assert!(cmd.is_privileged(), "{cmd}");
            assert!(cmd.render(Elevation::Sudo).starts_with("sudo -S -p '' "), "{cmd}");
        }
        assert_eq!(
            file_exists("/root/snap.tar.gz").render(Elevation::Sudo),
            "sudo -S -p '' test -f /root/snap.tar.gz"
        );
    }
}
