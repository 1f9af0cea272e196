use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network mode a Run drives the Target into, if any.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Temporary deployment network (WAN on the wired/DHCP path).
    Forward,
    /// Final production network (WAN on the cellular path).
    Reverse,
    /// Leave the network configuration alone.
    #[default]
    None,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Forward => write!(f, "forward"),
            RunMode::Reverse => write!(f, "reverse"),
            RunMode::None => write!(f, "none"),
        }
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(RunMode::Forward),
            "reverse" => Ok(RunMode::Reverse),
            "none" => Ok(RunMode::None),
            other => Err(ConfigError::InvalidSelection(format!(
                "unknown mode '{other}', expected forward, reverse or none"
            ))),
        }
    }
}

/// One entry of the operator's step selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StepSelector {
    Network,
    Dns,
    Runtime,
    /// Every service enabled in the config.
    Services,
    Service(String),
    Credential,
    Verify,
}

impl fmt::Display for StepSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepSelector::Network => write!(f, "network"),
            StepSelector::Dns => write!(f, "dns"),
            StepSelector::Runtime => write!(f, "runtime"),
            StepSelector::Services => write!(f, "services"),
            StepSelector::Service(name) => write!(f, "service:{name}"),
            StepSelector::Credential => write!(f, "credential"),
            StepSelector::Verify => write!(f, "verify"),
        }
    }
}

impl FromStr for StepSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("service:") {
            if crate::get_service(name).is_none() {
                return Err(ConfigError::UnknownService(name.to_owned()));
            }
            return Ok(StepSelector::Service(name.to_owned()));
        }
        match s {
            "network" => Ok(StepSelector::Network),
            "dns" => Ok(StepSelector::Dns),
            "runtime" => Ok(StepSelector::Runtime),
            "services" => Ok(StepSelector::Services),
            "credential" => Ok(StepSelector::Credential),
            "verify" => Ok(StepSelector::Verify),
            // bare service names are accepted as a shorthand
            other if crate::get_service(other).is_some() => {
                Ok(StepSelector::Service(other.to_owned()))
            }
            other => Err(ConfigError::InvalidSelection(format!(
                "unknown step '{other}'"
            ))),
        }
    }
}

/// Which Steps of a Run the operator asked for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSelection {
    selectors: Vec<StepSelector>,
}

impl Default for StepSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl StepSelection {
    pub fn all() -> Self {
        Self {
            selectors: vec![
                StepSelector::Network,
                StepSelector::Verify,
                StepSelector::Dns,
                StepSelector::Runtime,
                StepSelector::Services,
                StepSelector::Credential,
            ],
        }
    }

    pub fn only(selectors: Vec<StepSelector>) -> Self {
        Self { selectors }
    }

    pub fn selectors(&self) -> &[StepSelector] {
        &self.selectors
    }

    pub fn includes(&self, selector: &StepSelector) -> bool {
        self.selectors.contains(selector)
    }

    /// Whether `name` is selected, either explicitly or via `services`.
    pub fn includes_service(&self, name: &str) -> bool {
        self.selectors.iter().any(|s| match s {
            StepSelector::Services => true,
            StepSelector::Service(n) => n == name,
            _ => false,
        })
    }
}

impl FromStr for StepSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "all" {
            return Ok(Self::all());
        }
        let selectors = s
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(StepSelector::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if selectors.is_empty() {
            return Err(ConfigError::InvalidSelection(
                "step selection must not be empty".to_owned(),
            ));
        }
        Ok(Self { selectors })
    }
}
