pub mod api;
pub mod config;
pub mod logging;
pub mod probe;
pub mod reconcile;
pub mod runner;
pub mod ssh_args;
pub mod store;

use std::path::Path;

pub use config::{TunnelDocument, TunnelSpec};
pub use reconcile::{RunError, RunReport, TunnelOutcome};

/// One reconciliation pass against the real prober and launcher.
pub fn run(document_path: &Path, log: &dyn logging::EventLog) -> Result<RunReport, RunError> {
    reconcile::run(
        document_path,
        &probe::TcpProber::default(),
        &runner::SshLauncher,
        log,
    )
}
