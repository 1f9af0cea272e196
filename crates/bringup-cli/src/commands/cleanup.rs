use super::{confirm, json_pretty, Session, EXIT_FAILURE, EXIT_SUCCESS};
use bringup_schema::SnapshotId;

pub fn run(session: &Session, snapshot: &str, yes: bool, json: bool) -> Result<u8, String> {
    let id = SnapshotId::new(snapshot);
    if !confirm(&format!("delete snapshot {id} from {}?", session.target.address), yes)? {
        println!("aborted");
        return Ok(EXIT_FAILURE);
    }

    session
        .orchestrator()
        .cleanup_snapshot(&session.target, &id)
        .map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({ "removed": id });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("removed snapshot {id}");
    }
    Ok(EXIT_SUCCESS)
}
