//! Deployment config, Target definition, and service catalog for bringup.
//!
//! This crate defines the schema layer: TOML config parsing and validation
//! (`DeployConfig`), the immutable `Target` a Run is executed against, the
//! fixed catalog of containerized services (`ServiceSpec`), and the operator's
//! step selection syntax (`StepSelection`).

pub mod config;
pub mod selection;
pub mod services;
pub mod target;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, ConfigError, CredentialsSection, DeployConfig,
    DnsSection, NetworkSection, RetrySection, RetrySettings, RunSection, RuntimeSection,
    ServicesSection, TargetSection, TimeoutsSection, VerifySection, CONFIG_VERSION,
};
pub use selection::{RunMode, StepSelection, StepSelector};
pub use services::{get_service, list_services, ServiceSpec, BUILTIN_SERVICES};
pub use target::{Credentials, Elevation, ExecMode, Target};
pub use types::{RunId, SnapshotId, TargetId};
