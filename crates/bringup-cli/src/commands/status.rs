use super::{json_pretty, Session, EXIT_SUCCESS};

pub fn run(session: &Session, json: bool) -> Result<u8, String> {
    let state = session
        .orchestrator()
        .network_status(&session.target)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&state)?);
    } else {
        let unset = "-";
        println!("target:  {}", session.target.address);
        println!("mode:    {}", state.mode);
        println!(
            "wan:     {} ({})",
            state.wan_device.as_deref().unwrap_or(unset),
            state.wan_proto.as_deref().unwrap_or(unset)
        );
        println!(
            "lan:     {}/{} ({})",
            state.lan_ipaddr.as_deref().unwrap_or(unset),
            state.lan_netmask.as_deref().unwrap_or(unset),
            state.lan_proto.as_deref().unwrap_or(unset)
        );
    }
    Ok(EXIT_SUCCESS)
}
