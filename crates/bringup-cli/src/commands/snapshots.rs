use super::{json_pretty, Session, EXIT_SUCCESS};

pub fn run(session: &Session, all: bool, json: bool) -> Result<u8, String> {
    let target = session.target.id();
    let filter = (!all).then_some(&target);
    let snapshots = session
        .orchestrator()
        .snapshots(filter)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&snapshots)?);
    } else if snapshots.is_empty() {
        println!("no snapshots recorded");
    } else {
        for s in &snapshots {
            let origin = s
                .run_id
                .as_ref()
                .map_or_else(|| "manual".to_owned(), ToString::to_string);
            println!("{}  {}  {}  ({origin})", s.created_at, s.target, s.id);
        }
    }
    Ok(EXIT_SUCCESS)
}
