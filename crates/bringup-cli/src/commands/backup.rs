use super::{json_pretty, spin_fail, spin_ok, spinner, Session, EXIT_SUCCESS};

pub fn run(session: &Session, json: bool) -> Result<u8, String> {
    let pb = if json {
        None
    } else {
        Some(spinner("taking configuration snapshot..."))
    };

    let id = match session.orchestrator().backup_now(&session.target) {
        Ok(id) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "snapshot taken");
            }
            id
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "snapshot failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        let payload = serde_json::json!({
            "target": session.target.id(),
            "snapshot": id,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("snapshot: {id}");
    }
    Ok(EXIT_SUCCESS)
}
