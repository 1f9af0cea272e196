use super::{
    colorize_status, json_pretty, spin_fail, spin_ok, spin_skip, spinner, Session, EXIT_FAILURE,
    EXIT_PARTIAL, EXIT_SUCCESS,
};
use bringup_core::{install_signal_handler, ProgressEvent, RunOutcome, RunResult};
use bringup_runtime::{check_local_prereqs, format_missing};
use bringup_schema::{RunMode, StepSelection};
use indicatif::ProgressBar;

pub fn run(session: &Session, mode: RunMode, steps: &str, json: bool) -> Result<u8, String> {
    let selection: StepSelection = steps.parse().map_err(|e| format!("config error: {e}"))?;

    let missing = check_local_prereqs(&session.target);
    if !missing.is_empty() {
        return Err(format_missing(&missing));
    }

    let orchestrator = session.orchestrator();
    install_signal_handler(orchestrator.cancel_token());

    let (handle, events) = orchestrator.spawn_deployment(session.target.clone(), mode, selection);
    let mut current: Option<ProgressBar> = None;
    for event in events {
        if !json {
            show(&event, &mut current);
        }
    }
    let result = handle
        .join()
        .map_err(|_| "deployment worker panicked".to_owned())?
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(exit_code(result.outcome))
}

fn exit_code(outcome: RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Succeeded => EXIT_SUCCESS,
        RunOutcome::PartiallySucceeded => EXIT_PARTIAL,
        RunOutcome::Failed => EXIT_FAILURE,
    }
}

fn show(event: &ProgressEvent, current: &mut Option<ProgressBar>) {
    match event {
        ProgressEvent::RunStarted {
            run_id,
            target,
            mode,
            steps,
        } => {
            println!("run {run_id}: mode {mode} on {target}, {} steps", steps.len());
        }
        ProgressEvent::StepStarted { name, .. } => {
            *current = Some(spinner(&format!("{name}...")));
        }
        ProgressEvent::StepSucceeded {
            name,
            duration_ms,
            already_satisfied,
            ..
        } => {
            let note = if *already_satisfied {
                "already in place".to_owned()
            } else {
                format!("{duration_ms} ms")
            };
            if let Some(pb) = current.take() {
                spin_ok(&pb, &format!("{name} ({note})"));
            }
        }
        ProgressEvent::StepFailed {
            name, error, fatal, ..
        } => {
            let label = if *fatal { "failed" } else { "failed, continuing" };
            if let Some(pb) = current.take() {
                spin_fail(&pb, &format!("{name} {label}: {error}"));
            }
        }
        ProgressEvent::StepSkipped { name, reason, .. } => {
            spin_skip(&ProgressBar::new_spinner(), &format!("{name} skipped: {reason}"));
        }
        ProgressEvent::RunCompleted { .. } => {}
    }
}

fn print_summary(result: &RunResult) {
    println!();
    for step in result.steps.iter().filter(|s| !s.warnings.is_empty()) {
        for warning in &step.warnings {
            println!("warning: {}: {warning}", step.name);
        }
    }
    let outcome = result.outcome.to_string();
    if result.cancelled {
        println!("run {} cancelled: {}", result.run_id, colorize_status(&outcome));
    } else {
        println!("run {} {}", result.run_id, colorize_status(&outcome));
    }
    if let Some(error) = &result.error {
        println!("error: {error}");
    }
    if let Some(snapshot) = &result.snapshot {
        println!("snapshot: {snapshot}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_exit_code() {
        assert_eq!(exit_code(RunOutcome::Succeeded), EXIT_SUCCESS);
        assert_eq!(exit_code(RunOutcome::PartiallySucceeded), EXIT_PARTIAL);
        assert_eq!(exit_code(RunOutcome::Failed), EXIT_FAILURE);
    }
}
