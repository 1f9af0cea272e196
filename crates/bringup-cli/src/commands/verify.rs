use super::{json_pretty, Session, EXIT_FAILURE, EXIT_SUCCESS};

pub fn run(session: &Session, json: bool) -> Result<u8, String> {
    let report = session.orchestrator().verify_connectivity(&session.target);

    if json {
        println!("{}", json_pretty(&report)?);
    } else if let Some(error) = &report.error {
        println!("✗ {} unreachable: {error}", session.target.address);
    } else {
        println!("✓ {} reachable", session.target.address);
        for probe in &report.probes {
            let icon = if probe.ok { "✓" } else { "✗" };
            match &probe.detail {
                Some(detail) if !probe.ok => {
                    println!("  {icon} {} {}: {detail}", probe.probe, probe.subject);
                }
                _ => println!("  {icon} {} {}", probe.probe, probe.subject),
            }
        }
    }
    Ok(if report.ok() { EXIT_SUCCESS } else { EXIT_FAILURE })
}
