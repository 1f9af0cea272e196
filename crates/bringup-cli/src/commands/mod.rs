pub mod backup;
pub mod cleanup;
pub mod completions;
pub mod deploy;
pub mod doctor;
pub mod man_pages;
pub mod restore;
pub mod runs;
pub mod snapshots;
pub mod status;
pub mod verify;

use bringup_core::Orchestrator;
use bringup_runtime::{select_executor, Executor};
use bringup_schema::{parse_config_file, DeployConfig, Target};
use bringup_store::{default_state_dir, StateLayout};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{stderr, stdin, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_PARTIAL: u8 = 4;

/// Everything a command needs: the validated config, the Target it
/// describes, and where local state lives.
pub struct Session {
    pub config: DeployConfig,
    pub target: Target,
    pub state_dir: PathBuf,
}

impl Session {
    pub fn load(
        config_path: &Path,
        target_override: Option<&str>,
        state_dir: Option<&Path>,
    ) -> Result<Self, String> {
        let mut config = parse_config_file(config_path)
            .map_err(|e| format!("config error: {}: {e}", config_path.display()))?;
        if let Some(address) = target_override {
            config.target.address = address.to_owned();
            config.validate().map_err(|e| format!("config error: {e}"))?;
        }
        let state_dir = state_dir
            .map(Path::to_path_buf)
            .or_else(|| config.run.state_dir.clone())
            .unwrap_or_else(default_state_dir);
        let target = config.to_target();
        Ok(Self {
            config,
            target,
            state_dir,
        })
    }

    pub fn layout(&self) -> StateLayout {
        StateLayout::new(&self.state_dir)
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let exec: Arc<dyn Executor> = Arc::from(select_executor(&self.target));
        Orchestrator::new(self.config.clone(), exec).with_state_dir(self.layout())
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn spin_skip(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("- {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "succeeded" => Style::new().green().apply_to(status).to_string(),
        "partially_succeeded" | "partially succeeded" => {
            Style::new().yellow().apply_to(status).to_string()
        }
        "failed" => Style::new().red().bold().apply_to(status).to_string(),
        "skipped" => Style::new().dim().apply_to(status).to_string(),
        "running" => Style::new().cyan().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

/// Ask before a destructive action. Without a terminal only `--yes` proceeds.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, String> {
    if assume_yes {
        return Ok(true);
    }
    if !(stdin().is_terminal() && stderr().is_terminal()) {
        return Err(format!("{prompt}: refusing without a terminal, pass --yes"));
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))
}
