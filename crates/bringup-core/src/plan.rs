use crate::netmode::NetworkMode;
use crate::operation::{Classification, Operation};
use crate::ops::{
    CredentialOp, DnsFixOp, NetworkModeOp, RuntimeInstallOp, ServiceInstallOp, VerifyOp,
};
use bringup_schema::{
    get_service, DeployConfig, RunMode, StepSelection, StepSelector, BUILTIN_SERVICES,
};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Backup,
    Network(NetworkMode),
    Verify,
    Dns,
    Runtime,
    Service(String),
    Credential,
    Restore,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Backup => write!(f, "backup"),
            StepKind::Network(mode) => write!(f, "network:{mode}"),
            StepKind::Verify => write!(f, "verify"),
            StepKind::Dns => write!(f, "dns"),
            StepKind::Runtime => write!(f, "runtime"),
            StepKind::Service(name) => write!(f, "service:{name}"),
            StepKind::Credential => write!(f, "credential"),
            StepKind::Restore => write!(f, "restore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    pub fatal: bool,
}

impl PlannedStep {
    pub fn name(&self) -> String {
        self.kind.to_string()
    }

    /// The Operation behind this Step. Backup and Restore are driven by the
    /// `BackupManager` directly and have none.
    pub fn operation(&self, config: &DeployConfig) -> Option<Box<dyn Operation>> {
        match &self.kind {
            StepKind::Network(mode) => Some(Box::new(NetworkModeOp::new(*mode))),
            StepKind::Verify => Some(Box::new(VerifyOp)),
            StepKind::Dns => Some(Box::new(DnsFixOp)),
            StepKind::Runtime => Some(Box::new(RuntimeInstallOp)),
            StepKind::Service(name) => {
                get_service(name).map(|spec| Box::new(ServiceInstallOp::new(spec)) as Box<dyn Operation>)
            }
            StepKind::Credential => config.credentials.reset_admin_password.as_ref().map(|pw| {
                Box::new(CredentialOp::new(&config.credentials.admin_user, pw)) as Box<dyn Operation>
            }),
            StepKind::Backup | StepKind::Restore => None,
        }
    }
}

/// A failed backup is fatal: nothing may change without a way back.
fn step(kind: StepKind, config: &DeployConfig) -> PlannedStep {
    let mut planned = PlannedStep {
        fatal: kind == StepKind::Backup,
        kind,
    };
    planned.fatal |= planned
        .operation(config)
        .is_some_and(|op| op.classification() == Classification::Fatal);
    planned
}

/// Ordered Steps for a Run. When a backup is configured and at least one
/// Step mutates the device, the plan is bracketed by Backup and Restore.
pub fn build_plan(config: &DeployConfig, mode: RunMode, selection: &StepSelection) -> Vec<PlannedStep> {
    let mut steps = Vec::new();

    if let Some(target_mode) = NetworkMode::from_run_mode(mode) {
        if selection.includes(&StepSelector::Network) {
            steps.push(step(StepKind::Network(target_mode), config));
        }
    }
    if selection.includes(&StepSelector::Verify) {
        steps.push(step(StepKind::Verify, config));
    }
    if selection.includes(&StepSelector::Dns) {
        steps.push(step(StepKind::Dns, config));
    }
    if selection.includes(&StepSelector::Runtime) {
        steps.push(step(StepKind::Runtime, config));
    }
    for spec in BUILTIN_SERVICES {
        let enabled = config.services.enabled.iter().any(|s| s == spec.name);
        let explicit = selection.includes(&StepSelector::Service(spec.name.to_owned()));
        let via_group = enabled && selection.includes(&StepSelector::Services);
        if explicit || via_group {
            steps.push(step(StepKind::Service(spec.name.to_owned()), config));
        }
    }
    if mode == RunMode::Reverse
        && config.credentials.reset_admin_password.is_some()
        && selection.includes(&StepSelector::Credential)
    {
        steps.push(step(StepKind::Credential, config));
    }

    let mutates = steps
        .iter()
        .filter_map(|s| s.operation(config))
        .any(|op| op.mutating());
    if config.run.backup && mutates {
        steps.insert(0, step(StepKind::Backup, config));
        steps.push(step(StepKind::Restore, config));
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(steps: &[PlannedStep]) -> Vec<String> {
        steps.iter().map(PlannedStep::name).collect()
    }

    fn config() -> DeployConfig {
        let mut config = DeployConfig::for_address("192.168.8.1");
        config.services.enabled = vec!["influxdb".to_owned(), "node-red".to_owned()];
        config
    }

    #[test]
    fn full_forward_plan_order() {
        let plan = build_plan(&config(), RunMode::Forward, &StepSelection::all());
        assert_eq!(
            names(&plan),
            [
                "backup",
                "network:forward",
                "verify",
                "dns",
                "runtime",
                "service:node-red",
                "service:influxdb",
                "restore",
            ]
        );
        assert!(plan[0].fatal);
        assert!(plan[1].fatal);
        assert!(plan[4].fatal);
        assert!(!plan[7].fatal);
        assert!(!plan[5].fatal);
    }

    #[test]
    fn credential_reset_needs_reverse_and_a_password() {
        let mut config = config();
        let plan = build_plan(&config, RunMode::Reverse, &StepSelection::all());
        assert!(!names(&plan).contains(&"credential".to_owned()));

        config.credentials.reset_admin_password = Some("admin".to_owned());
        let plan = build_plan(&config, RunMode::Reverse, &StepSelection::all());
        assert!(names(&plan).contains(&"credential".to_owned()));
        let plan = build_plan(&config, RunMode::Forward, &StepSelection::all());
        assert!(!names(&plan).contains(&"credential".to_owned()));
    }

    #[test]
    fn explicit_service_selection_ignores_enabled_list() {
        let selection = StepSelection::only(vec![
            StepSelector::Runtime,
            StepSelector::Service("mosquitto".to_owned()),
        ]);
        let plan = build_plan(&config(), RunMode::Forward, &selection);
        assert_eq!(
            names(&plan),
            ["backup", "runtime", "service:mosquitto", "restore"]
        );
    }

    #[test]
    fn read_only_plan_takes_no_snapshot() {
        let selection = StepSelection::only(vec![StepSelector::Verify]);
        let plan = build_plan(&config(), RunMode::Forward, &selection);
        assert_eq!(names(&plan), ["verify"]);
    }

    #[test]
    fn mode_none_skips_network() {
        let plan = build_plan(&config(), RunMode::None, &StepSelection::all());
        assert!(!names(&plan).iter().any(|n| n.starts_with("network")));
    }

    #[test]
    fn backup_can_be_disabled() {
        let mut config = config();
        config.run.backup = false;
        let plan = build_plan(&config, RunMode::Forward, &StepSelection::all());
        assert_ne!(plan[0].kind, StepKind::Backup);
        assert_ne!(plan.last().map(|s| &s.kind), Some(&StepKind::Restore));
    }
}
