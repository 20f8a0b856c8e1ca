use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Answers "does this local port already have a listener?". The engine only
/// depends on this trait so tests can script the answers.
pub trait Prober {
    fn port_is_up(&self, port: u16) -> bool;
}

/// Connect-based probe. A successful connect proves *some* listener owns the
/// port, not that it is the declared tunnel; refused, unreachable and timeout
/// are all normal "down" signals, never errors.
#[derive(Debug, Clone)]
pub struct TcpProber {
    pub host: IpAddr,
    pub timeout: Duration,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Prober for TcpProber {
    fn port_is_up(&self, port: u16) -> bool {
        let addr = SocketAddr::new(self.host, port);
        // The socket is dropped (closed) as soon as the answer is known.
        TcpStream::connect_timeout(&addr, self.timeout).is_ok()
    }
}
