use std::net::IpAddr;

use crate::config::TunnelSpec;

#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Single-line rendering for the event log.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

// IPv6 addresses must be bracketed inside a -L forward spec.
fn forward_host(host: &IpAddr) -> String {
    match host {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

/// Build the forwarding command for one tunnel. Deterministic: the same spec
/// always yields the same argument vector.
pub fn build_invocation(spec: &TunnelSpec) -> Invocation {
    let mut ssh_args: Vec<String> = Vec::new();

    // Target
    ssh_args.push(format!("{}@{}", spec.ssh_user, spec.ssh_host));

    // Non-default server port only
    if spec.ssh_port != 22 {
        ssh_args.push("-p".to_string());
        ssh_args.push(spec.ssh_port.to_string());
    }

    let forward_spec = format!(
        "{}:{}:{}",
        spec.local_port,
        forward_host(&spec.dest_host),
        spec.dest_port
    );
    ssh_args.push("-L".to_string());
    ssh_args.push(forward_spec);

    // Background after the forward is set up, allow non-local binds, run no
    // remote command. The spawning invocation exits; the forward stays up.
    ssh_args.push("-f".to_string());
    ssh_args.push("-g".to_string());
    ssh_args.push("-N".to_string());

    Invocation {
        program: "ssh".to_string(),
        args: ssh_args,
    }
}
