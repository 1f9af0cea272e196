//! The Operation catalog.

mod credential;
mod dns;
mod network;
mod runtime;
mod service;
mod verify;

pub use credential::CredentialOp;
pub use dns::DnsFixOp;
pub use network::NetworkModeOp;
pub use runtime::RuntimeInstallOp;
pub use service::ServiceInstallOp;
pub use verify::{run_probes, ProbeResult, VerifyOp};
