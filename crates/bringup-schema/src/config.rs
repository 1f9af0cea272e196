use crate::selection::RunMode;
use crate::target::{Credentials, Elevation, ExecMode, Target};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported config_version: {0}, expected {CONFIG_VERSION}")]
    UnsupportedVersion(u32),
    #[error("target.address must not be empty")]
    EmptyAddress,
    #[error("remote target needs exactly one of target.password or target.key_file")]
    CredentialsAmbiguous,
    #[error("invalid IPv4 address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("invalid step selection: {0}")]
    InvalidSelection(String),
    #[error("invalid retry policy for {0}: max_attempts must be at least 1")]
    InvalidRetry(&'static str),
    #[error(
        "target.address {address} is the LAN address a run moves to {next}; \
         the session would drop mid-run, connect over another interface"
    )]
    ManagementLanReaddressed { address: String, next: String },
    #[error(
        "credentials.reset_admin_password would change the password of login account '{0}'; \
         log in with target.key_file or another account"
    )]
    LoginPasswordReset(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    pub config_version: u32,
    pub target: TargetSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub dns: DnsSection,
    #[serde(default)]
    pub verify: VerifySection,
    #[serde(default)]
    pub services: ServicesSection,
    #[serde(default)]
    pub run: RunSection,
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetSection {
    pub address: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub mode: ExecMode,
    #[serde(default)]
    pub elevation: Elevation,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for TargetSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetSection")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_file", &self.key_file)
            .field("mode", &self.mode)
            .field("elevation", &self.elevation)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    /// Wired interface that carries WAN in FORWARD mode.
    pub deploy_interface: String,
    pub lan_ipaddr: String,
    pub lan_netmask: String,
    /// Cellular interface that carries WAN in REVERSE mode.
    pub production_interface: String,
    pub production_proto: String,
    /// LAN address to use in REVERSE mode; falls back to `lan_ipaddr`.
    pub reverse_lan_ipaddr: Option<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            deploy_interface: "eth1".to_owned(),
            lan_ipaddr: "192.168.8.1".to_owned(),
            lan_netmask: "255.255.255.0".to_owned(),
            production_interface: "wwan0".to_owned(),
            production_proto: "qmi".to_owned(),
            reverse_lan_ipaddr: None,
        }
    }
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsSection {
    /// Account whose password the reset applies to.
    pub admin_user: String,
    /// When set, a REVERSE run resets the administrative password to this value.
    pub reset_admin_password: Option<String>,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            admin_user: default_username(),
            reset_admin_password: None,
        }
    }
}

impl std::fmt::Debug for CredentialsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsSection")
            .field("admin_user", &self.admin_user)
            .field(
                "reset_admin_password",
                &self.reset_admin_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutsSection {
    pub check_secs: u64,
    pub install_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            check_secs: 10,
            install_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub image_pull: RetrySettings,
    pub package_install: RetrySettings,
    /// Applied to configuration-tool writes that may find the tool busy.
    pub config_busy: RetrySettings,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            image_pull: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 5_000,
                multiplier: 2.0,
            },
            package_install: RetrySettings {
                max_attempts: 2,
                base_delay_ms: 10_000,
                multiplier: 2.0,
            },
            config_busy: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 1_000,
                multiplier: 1.0,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    /// Upper bound for the runtime/service readiness polls.
    pub readiness_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Free space (KiB) required on the container data root before a pull.
    pub min_free_kb: u64,
    pub data_root: String,
    /// Directory whose free space is checked before pulls.
    pub storage_path: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            readiness_timeout_secs: 60,
            poll_interval_ms: 2_000,
            min_free_kb: 512 * 1024,
            data_root: "/opt/bringup".to_owned(),
            storage_path: "/var/lib/docker".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DnsSection {
    pub resolver: String,
    pub probe_host: String,
}

impl Default for DnsSection {
    fn default() -> Self {
        Self {
            resolver: "8.8.8.8".to_owned(),
            probe_host: "downloads.openwrt.org".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct VerifySection {
    pub resolve_host: String,
    pub ping_address: String,
    pub http_url: String,
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            resolve_host: "downloads.openwrt.org".to_owned(),
            ping_address: "8.8.8.8".to_owned(),
            http_url: "http://connectivitycheck.gstatic.com/generate_204".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesSection {
    pub enabled: Vec<String>,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            enabled: crate::BUILTIN_SERVICES
                .iter()
                .map(|s| s.name.to_owned())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub backup: bool,
    /// Stay in the newly applied mode instead of restoring the snapshot.
    /// Unset means: keep for REVERSE runs, restore otherwise.
    pub keep_new_mode: Option<bool>,
    /// Directory on the Target that receives configuration snapshots.
    pub backup_dir: String,
    /// Local directory for run logs, snapshot index, and locks.
    pub state_dir: Option<PathBuf>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            backup: true,
            keep_new_mode: None,
            backup_dir: "/root".to_owned(),
            state_dir: None,
        }
    }
}

impl RunSection {
    pub fn keep_new_mode_for(&self, mode: RunMode) -> bool {
        self.keep_new_mode.unwrap_or(mode == RunMode::Reverse)
    }
}

fn default_username() -> String {
    "root".to_owned()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_multiplier() -> f64 {
    2.0
}

impl DeployConfig {
    /// A config with defaults everywhere except the Target address.
    pub fn for_address(address: &str) -> Self {
        Self {
            config_version: CONFIG_VERSION,
            target: TargetSection {
                address: address.to_owned(),
                username: default_username(),
                password: None,
                key_file: None,
                mode: ExecMode::Local,
                elevation: Elevation::None,
                connect_timeout_secs: default_connect_timeout(),
            },
            network: NetworkSection::default(),
            credentials: CredentialsSection::default(),
            timeouts: TimeoutsSection::default(),
            retry: RetrySection::default(),
            runtime: RuntimeSection::default(),
            dns: DnsSection::default(),
            verify: VerifySection::default(),
            services: ServicesSection::default(),
            run: RunSection::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.config_version));
        }
        if self.target.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.target.mode == ExecMode::Remote
            && self.target.password.is_some() == self.target.key_file.is_some()
        {
            return Err(ConfigError::CredentialsAmbiguous);
        }
        check_ipv4("network.lan_ipaddr", &self.network.lan_ipaddr)?;
        check_ipv4("network.lan_netmask", &self.network.lan_netmask)?;
        if let Some(addr) = &self.network.reverse_lan_ipaddr {
            check_ipv4("network.reverse_lan_ipaddr", addr)?;
        }
        if self.target.mode == ExecMode::Remote {
            self.check_session_survives()?;
        }
        for name in &self.services.enabled {
            if crate::get_service(name).is_none() {
                return Err(ConfigError::UnknownService(name.clone()));
            }
        }
        for (label, settings) in [
            ("retry.image_pull", &self.retry.image_pull),
            ("retry.package_install", &self.retry.package_install),
            ("retry.config_busy", &self.retry.config_busy),
        ] {
            if settings.max_attempts == 0 {
                return Err(ConfigError::InvalidRetry(label));
            }
        }
        Ok(())
    }

    /// A remote session must outlive the Run: it may not ride a LAN address
    /// the Run changes, nor authenticate with a password the Run resets.
    fn check_session_survives(&self) -> Result<(), ConfigError> {
        let (forward, reverse) = (self.network.lan_ipaddr.as_str(), self.reverse_lan_ipaddr());
        let address = self.target.address.trim();
        if forward != reverse && (address == forward || address == reverse) {
            let next = if address == forward { reverse } else { forward };
            return Err(ConfigError::ManagementLanReaddressed {
                address: address.to_owned(),
                next: next.to_owned(),
            });
        }
        if let (Some(login), Some(reset)) =
            (&self.target.password, &self.credentials.reset_admin_password)
        {
            if self.credentials.admin_user == self.target.username && reset != login {
                return Err(ConfigError::LoginPasswordReset(self.target.username.clone()));
            }
        }
        Ok(())
    }

    pub fn to_target(&self) -> Target {
        let t = &self.target;
        let credentials = match (&t.password, &t.key_file) {
            (Some(p), _) => Credentials::Password(p.clone()),
            (None, Some(k)) => Credentials::KeyFile(k.clone()),
            (None, None) => Credentials::Ambient,
        };
        Target {
            address: t.address.clone(),
            username: t.username.clone(),
            credentials,
            mode: t.mode,
            elevation: t.elevation,
            connect_timeout: Duration::from_secs(t.connect_timeout_secs),
        }
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.check_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.install_secs)
    }

    /// LAN address that a REVERSE transition applies.
    pub fn reverse_lan_ipaddr(&self) -> &str {
        self.network
            .reverse_lan_ipaddr
            .as_deref()
            .unwrap_or(&self.network.lan_ipaddr)
    }
}

fn check_ipv4(field: &'static str, value: &str) -> Result<(), ConfigError> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_owned(),
        })
}

pub fn parse_config_str(input: &str) -> Result<DeployConfig, ConfigError> {
    let config: DeployConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<DeployConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let input = r#"
config_version = 1

[target]
address = "192.168.8.1"
username = "admin"
password = "secret"
elevation = "sudo"
connect_timeout_secs = 3

[network]
deploy_interface = "eth0"
lan_ipaddr = "10.10.0.1"
production_interface = "wwan1"
production_proto = "modemmanager"
reverse_lan_ipaddr = "10.20.0.1"

[credentials]
reset_admin_password = "changeme"

[retry.image_pull]
max_attempts = 4
base_delay_ms = 100

[services]
enabled = ["node-red", "mosquitto"]

[run]
backup = false
keep_new_mode = true
"#;
        let config = parse_config_str(input).expect("should parse");
        assert_eq!(config.target.username, "admin");
        assert_eq!(config.target.elevation, Elevation::Sudo);
        assert_eq!(config.network.deploy_interface, "eth0");
        assert_eq!(config.network.lan_netmask, "255.255.255.0");
        assert_eq!(config.reverse_lan_ipaddr(), "10.20.0.1");
        assert_eq!(config.retry.image_pull.max_attempts, 4);
        assert!((config.retry.image_pull.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.services.enabled.len(), 2);
        assert!(!config.run.backup);
        assert!(config.run.keep_new_mode_for(RunMode::Forward));
    }

    #[test]
    fn parses_minimal_config() {
        let input = r#"
config_version = 1

[target]
address = "192.168.8.1"
key_file = "/home/op/.ssh/id_ed25519"
"#;
        let config = parse_config_str(input).expect("should parse");
        assert_eq!(config.target.username, "root");
        assert_eq!(config.target.mode, ExecMode::Remote);
        assert_eq!(config.services.enabled.len(), 3);
        assert!(config.run.backup);
        assert!(config.run.keep_new_mode_for(RunMode::Reverse));
        assert!(!config.run.keep_new_mode_for(RunMode::Forward));
        assert!(matches!(
            config.to_target().credentials,
            Credentials::KeyFile(_)
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
config_version = 1
[target]
address = "192.168.8.1"
password = "x"
colour = "blue"
"#;
        assert!(parse_config_str(input).is_err());
    }

    #[test]
    fn rejects_ambiguous_credentials() {
        let input = r#"
config_version = 1
[target]
address = "192.168.8.1"
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::CredentialsAmbiguous)
        ));
    }

    #[test]
    fn local_mode_needs_no_credentials() {
        let input = r#"
config_version = 1
[target]
address = "localhost"
mode = "local"
"#;
        let config = parse_config_str(input).unwrap();
        assert_eq!(config.to_target().credentials, Credentials::Ambient);
    }

    #[test]
    fn rejects_bad_lan_address() {
        let mut config = DeployConfig::for_address("10.0.0.1");
        config.network.lan_ipaddr = "10.0.0.300".to_owned();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { field: "network.lan_ipaddr", .. })
        ));
    }

    #[test]
    fn rejects_readdressing_the_management_lan() {
        let input = r#"
config_version = 1
[target]
address = "192.168.8.1"
key_file = "/home/op/.ssh/id_ed25519"
[network]
reverse_lan_ipaddr = "192.168.50.1"
"#;
        match parse_config_str(input) {
            Err(ConfigError::ManagementLanReaddressed { address, next }) => {
                assert_eq!(address, "192.168.8.1");
                assert_eq!(next, "192.168.50.1");
            }
            other => panic!("unexpected {other:?}"),
        }

        // reached over another interface, or run on the device itself
        let mut config = parse_config_str(&input.replace("192.168.8.1", "10.0.0.7")).unwrap();
        config.target.address = "192.168.8.1".to_owned();
        config.target.mode = ExecMode::Local;
        config.target.key_file = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_resetting_the_login_password() {
        let input = r#"
config_version = 1
[target]
address = "192.168.8.1"
password = "current"
[credentials]
reset_admin_password = "factory"
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::LoginPasswordReset(user)) if user == "root"
        ));

        let other_account = input.replace("[credentials]\n", "[credentials]\nadmin_user = \"admin\"\n");
        assert!(parse_config_str(&other_account).is_ok());
        let key_login = input.replace("password = \"current\"", "key_file = \"/home/op/.ssh/id_ed25519\"");
        assert!(parse_config_str(&key_login).is_ok());
    }

    #[test]
    fn rejects_unknown_service_and_zero_attempts() {
        let mut config = DeployConfig::for_address("10.0.0.1");
        config.services.enabled.push("postgres".to_owned());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownService(_))
        ));

        let mut config = DeployConfig::for_address("10.0.0.1");
        config.retry.image_pull.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRetry("retry.image_pull"))
        ));
    }

    #[test]
    fn debug_output_hides_passwords() {
        let mut config = DeployConfig::for_address("10.0.0.1");
        config.target.password = Some("hunter2".to_owned());
        config.credentials.reset_admin_password = Some("factory".to_owned());
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("factory"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut config = DeployConfig::for_address("10.0.0.1");
        config.config_version = 9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn reads_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bringup.toml");
        std::fs::write(
            &path,
            "config_version = 1\n[target]\naddress = \"10.1.1.1\"\nmode = \"local\"\n",
        )
        .unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.target.address, "10.1.1.1");
    }
}
