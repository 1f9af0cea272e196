use super::{colorize_status, json_pretty, Session, EXIT_SUCCESS};
use bringup_store::RunLogStore;

pub fn run(session: &Session, run_id: Option<&str>, json: bool) -> Result<u8, String> {
    let store = RunLogStore::new(session.layout());

    if let Some(id) = run_id {
        let records = store.load(id).map_err(|e| format!("store error: {e}"))?;
        if json {
            println!("{}", json_pretty(&records)?);
        } else {
            for record in &records {
                println!("{record}");
            }
        }
        return Ok(EXIT_SUCCESS);
    }

    let runs = store
        .list_for(&session.target.id())
        .map_err(|e| format!("store error: {e}"))?;
    if json {
        println!("{}", json_pretty(&runs)?);
    } else if runs.is_empty() {
        println!("no runs recorded for {}", session.target.id());
    } else {
        for r in &runs {
            let outcome = r.outcome.as_deref().unwrap_or("incomplete");
            println!("{}  {}  {}", r.run_id, r.started_at, colorize_status(outcome));
        }
    }
    Ok(EXIT_SUCCESS)
}
