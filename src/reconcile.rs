use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::{self, DocumentError};
use crate::logging::EventLog;
use crate::probe::Prober;
use crate::runner::{LaunchError, Launcher};
use crate::ssh_args::build_invocation;

/// What happened to one enabled tunnel during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOutcome {
    SkippedInvalid,
    AlreadyUp,
    Launched,
    LaunchFailed,
}

/// Per-run result, in declaration order. Not persisted anywhere; the engine
/// holds no state between invocations.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<(String, TunnelOutcome)>,
}

/// Environment-level failures that make the rest of the run meaningless.
/// Everything else is tunnel-local and never aborts the pass.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),
    #[error("error reading JSON: {0}")]
    DocumentMalformed(String),
    #[error("'{0}' executable not found on PATH")]
    ToolUnavailable(String),
}

impl RunError {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::DocumentNotFound(_) => 1,
            RunError::DocumentMalformed(_) => 2,
            RunError::ToolUnavailable(_) => 3,
        }
    }
}

// Name for log lines and the report, tolerating records that fail validation.
fn display_name(raw: &Value, index: usize) -> String {
    raw.get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("tunnel-{index}"))
}

/// One reconciliation pass: load the document, and for each enabled tunnel in
/// declaration order bring it up if it is not already. Tunnels are processed
/// strictly sequentially; a failure in one never blocks the ones after it.
pub fn run(
    document_path: &Path,
    prober: &dyn Prober,
    launcher: &dyn Launcher,
    log: &dyn EventLog,
) -> Result<RunReport, RunError> {
    let document = match config::load_document(document_path) {
        Ok(document) => document,
        Err(err) => {
            log.error(&err.to_string());
            return Err(match err {
                DocumentError::NotFound(path) => RunError::DocumentNotFound(path),
                DocumentError::Malformed(reason) => RunError::DocumentMalformed(reason),
            });
        }
    };

    let enabled: Vec<&Value> = document
        .tunnels
        .iter()
        .filter(|raw| config::is_enabled(raw))
        .collect();
    if enabled.is_empty() {
        log.info("no tunnels enabled");
        return Ok(RunReport::default());
    }

    let mut report = RunReport::default();
    for (index, raw) in enabled.iter().enumerate() {
        let name = display_name(raw, index);

        let spec = match config::validate_tunnel(raw, index) {
            Ok(spec) => spec,
            Err(reason) => {
                log.error(&reason.to_string());
                report.outcomes.push((name, TunnelOutcome::SkippedInvalid));
                continue;
            }
        };

        if prober.port_is_up(spec.local_port) {
            log.info(&format!(
                "port {} on localhost UP ({})",
                spec.local_port, spec.name
            ));
            report.outcomes.push((name, TunnelOutcome::AlreadyUp));
            continue;
        }

        log.info(&format!(
            "port {} on localhost DOWN ({})",
            spec.local_port, spec.name
        ));
        log.info(&format!(
            "running: {}",
            build_invocation(&spec).command_line()
        ));

        match launcher.launch(&spec) {
            Ok(()) => report.outcomes.push((name, TunnelOutcome::Launched)),
            Err(LaunchError::ToolNotFound(program)) => {
                let fatal = RunError::ToolUnavailable(program);
                log.error(&fatal.to_string());
                return Err(fatal);
            }
            Err(failure) => {
                log.error(&format!("tunnel launch failed: {name} ({failure})"));
                report.outcomes.push((name, TunnelOutcome::LaunchFailed));
            }
        }
    }

    Ok(report)
}
