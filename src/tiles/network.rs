//! Reachability checks run before any tile request touches the network

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cheap "is there a usable network path" probe
pub trait NetworkStatus: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Assumes the network is always there
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Connectivity flag maintained by the host application (e.g. from OS
/// connectivity notifications). Clones share the same flag.
#[derive(Debug, Clone)]
pub struct NetworkFlag {
    connected: Arc<AtomicBool>,
}

impl NetworkFlag {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for NetworkFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatus for NetworkFlag {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Considers the network up when a TCP connection to `address` succeeds
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    /// `address` is a `host:port` pair
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

impl NetworkStatus for TcpProbe {
    fn is_connected(&self) -> bool {
        let addrs = match self.address.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                log::debug!("cannot resolve {}: {}", self.address, e);
                return false;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return true,
                Err(e) => log::trace!("probe to {} failed: {}", addr, e),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_network_flag_is_shared() {
        let flag = NetworkFlag::default();
        let view = flag.clone();
        assert!(view.is_connected());
        flag.set_connected(false);
        assert!(!view.is_connected());
    }

    #[test]
    fn test_always_online() {
        assert!(AlwaysOnline.is_connected());
        assert!(!NetworkFlag::new(false).is_connected());
    }

    #[test]
    fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        assert!(TcpProbe::new(address, Duration::from_millis(500)).is_connected());

        drop(listener);
        assert!(!TcpProbe::new("not a host", Duration::from_millis(100)).is_connected());
    }
}
