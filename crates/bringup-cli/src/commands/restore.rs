use super::{confirm, json_pretty, spin_fail, spin_ok, spinner, Session, EXIT_FAILURE, EXIT_SUCCESS};
use bringup_core::RestoreOutcome;
use bringup_schema::SnapshotId;

pub fn run(session: &Session, snapshot: Option<&str>, yes: bool, json: bool) -> Result<u8, String> {
    let orchestrator = session.orchestrator();
    let id = match snapshot {
        Some(id) => SnapshotId::new(id),
        None => orchestrator
            .latest_snapshot(&session.target)
            .map_err(|e| e.to_string())?
            .map(|record| record.id)
            .ok_or_else(|| format!("no snapshots recorded for {}", session.target.id()))?,
    };

    if !confirm(&format!("restore {id} on {}?", session.target.address), yes)? {
        println!("aborted");
        return Ok(EXIT_FAILURE);
    }

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("restoring {id}...")))
    };
    let (outcome, warnings) = match orchestrator.restore_snapshot(&session.target, &id) {
        Ok(done) => done,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "restore failed");
            }
            return Err(e.to_string());
        }
    };
    if let Some(ref pb) = pb {
        match outcome {
            RestoreOutcome::Restored => spin_ok(pb, "configuration restored"),
            RestoreOutcome::Missing => spin_fail(pb, "snapshot missing on target, nothing changed"),
        }
    }

    if json {
        let payload = serde_json::json!({
            "snapshot": id,
            "outcome": outcome,
            "warnings": warnings,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for warning in &warnings {
            println!("warning: {warning}");
        }
    }
    Ok(match outcome {
        RestoreOutcome::Restored => EXIT_SUCCESS,
        RestoreOutcome::Missing => EXIT_FAILURE,
    })
}
