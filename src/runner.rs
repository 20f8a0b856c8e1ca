use std::io;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::config::TunnelSpec;
use crate::ssh_args::{build_invocation, Invocation};

#[derive(Debug, Error)]
pub enum LaunchError {
    /// The client binary is absent from the execution environment. No tunnel
    /// in this run can possibly succeed, so callers escalate this one.
    #[error("'{0}' executable not found on PATH")]
    ToolNotFound(String),
    /// The spawning invocation failed for this tunnel only.
    #[error("{0}")]
    Failed(String),
}

/// Narrow seam between the engine and process execution, so tests can swap in
/// a fake without spawning anything.
pub trait Launcher {
    fn launch(&self, spec: &TunnelSpec) -> Result<(), LaunchError>;
}

/// Executes the invocation and waits for the spawning `ssh` to report back.
/// With `-f -N` the child forks away once the forward is established, so the
/// wait is bounded by connection setup, not by the tunnel's lifetime.
pub fn run_invocation(inv: &Invocation) -> Result<(), LaunchError> {
    let status = Command::new(&inv.program)
        .args(&inv.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LaunchError::ToolNotFound(inv.program.clone()),
            _ => LaunchError::Failed(format!("spawn failed: {e}")),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(LaunchError::Failed(format!("ssh exited with {status}")))
    }
}

/// The real launcher: builds the argument vector and runs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshLauncher;

impl Launcher for SshLauncher {
    fn launch(&self, spec: &TunnelSpec) -> Result<(), LaunchError> {
        run_invocation(&build_invocation(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(program: &str, args: &[&str]) -> Invocation {
        Invocation {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn zero_exit_is_success() {
        assert!(run_invocation(&invocation("true", &[])).is_ok());
    }

    #[test]
    fn nonzero_exit_is_a_local_failure() {
        let err = run_invocation(&invocation("false", &[])).unwrap_err();
        assert!(matches!(err, LaunchError::Failed(_)));
    }

    #[test]
    fn missing_binary_is_tool_not_found() {
        let err = run_invocation(&invocation("definitely-not-a-real-client", &[])).unwrap_err();
        match err {
            LaunchError::ToolNotFound(program) => {
                assert_eq!(program, "definitely-not-a-real-client");
            }
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }
}
