use super::{Session, EXIT_FAILURE, EXIT_SUCCESS};
use bringup_core::TargetLock;
use bringup_runtime::{check_local_prereqs, format_missing};
use bringup_store::RunLogStore;

pub fn run(session: &Session, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    checks.push(Check::pass(
        "config",
        &format!(
            "Config valid (target {}, {:?} execution)",
            session.target.address, session.target.mode
        ),
    ));
    check_prereqs(session, &mut checks, &mut all_pass);
    check_state_dir(session, &mut checks, &mut all_pass);
    check_target(session, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(session: &Session, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = check_local_prereqs(&session.target);
    if missing.is_empty() {
        checks.push(Check::pass("local_prereqs", "Local tools available"));
    } else {
        *all_pass = false;
        checks.push(Check::fail("local_prereqs", &format_missing(&missing)));
    }
}

fn check_state_dir(session: &Session, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = session.layout();
    if let Err(e) = layout.initialize() {
        *all_pass = false;
        checks.push(Check::fail(
            "state_dir",
            &format!("State directory {} unusable: {e}", session.state_dir.display()),
        ));
        return;
    }
    checks.push(Check::pass(
        "state_dir",
        &format!("State directory {}", session.state_dir.display()),
    ));

    match TargetLock::try_acquire(&layout.lock_file(&session.target.id())) {
        Ok(Some(_)) => checks.push(Check::pass("target_lock", "No run in progress for this target")),
        Ok(None) => checks.push(Check::warn(
            "target_lock",
            "Another run holds the lock for this target",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "target_lock",
                &format!("Cannot check target lock: {e}"),
            ));
        }
    }

    match RunLogStore::new(layout).list_for(&session.target.id()) {
        Ok(runs) => {
            let last = runs
                .last()
                .and_then(|r| r.outcome.clone())
                .unwrap_or_else(|| "none".to_owned());
            checks.push(Check::info(
                "runs",
                &format!("{} recorded runs (last outcome: {last})", runs.len()),
            ));
        }
        Err(e) => checks.push(Check::warn("runs", &format!("Cannot list runs: {e}"))),
    }
}

fn check_target(session: &Session, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let report = session.orchestrator().verify_connectivity(&session.target);
    if let Some(error) = &report.error {
        *all_pass = false;
        checks.push(Check::fail("target_reachable", &format!("Target unreachable: {error}")));
        return;
    }
    checks.push(Check::pass(
        "target_reachable",
        &format!("Target {} reachable", session.target.address),
    ));
    if report.ok() {
        checks.push(Check::pass("upstream", "Target has upstream connectivity"));
    } else {
        checks.push(Check::warn(
            "upstream",
            "Target has no upstream connectivity (fine before a forward run)",
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("bringup doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
