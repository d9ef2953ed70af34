//! TCP readiness probe.
//!
//! Only connection establishment is observed; nothing is written to or read
//! from the dependency, and the socket is closed immediately.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::Target;

/// Result of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    Unreachable(String),
}

pub trait Probe {
    fn probe(&mut self, target: &Target) -> ProbeResult;
}

/// Connects to every address `target` resolves to until one accepts.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Probe for TcpProbe {
    fn probe(&mut self, target: &Target) -> ProbeResult {
        // Resolved per attempt: container DNS entries often appear after the gate starts.
        let addrs = match (target.host(), target.port()).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => return ProbeResult::Unreachable(format!("resolve {target}: {e}")),
        };

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(_stream) => return ProbeResult::Reachable,
                Err(e) => last_error = Some(format!("{addr}: {e}")),
            }
        }
        ProbeResult::Unreachable(
            last_error.unwrap_or_else(|| format!("{target} resolved to no addresses")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn probe() -> TcpProbe {
        TcpProbe::new(Duration::from_millis(500))
    }

    /// Port that was just free on loopback.
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn listening_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = Target::new("127.0.0.1", port).unwrap();
        assert_eq!(probe().probe(&target), ProbeResult::Reachable);
    }

    #[test]
    fn hostname_is_resolved() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = Target::new("localhost", port).unwrap();
        assert_eq!(probe().probe(&target), ProbeResult::Reachable);
    }

    #[test]
    fn refused_connection_is_unreachable() {
        let target = Target::new("127.0.0.1", closed_port()).unwrap();
        match probe().probe(&target) {
            ProbeResult::Unreachable(reason) => {
                assert!(reason.contains("127.0.0.1"), "reason: {reason}")
            }
            ProbeResult::Reachable => panic!("closed port reported reachable"),
        }
    }

    #[test]
    fn unresolvable_host_is_unreachable() {
        let target = Target::new("no-such-host.invalid", 5432).unwrap();
        assert!(matches!(
            probe().probe(&target),
            ProbeResult::Unreachable(_)
        ));
    }
}
