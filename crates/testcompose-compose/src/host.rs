//! Host-side networking facts needed while resolving placeholders.

use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};

use testcompose_common::error::{Result, TestComposeError};

/// Source of free host ports and the host's reachable address.
pub trait HostNetwork: Send + Sync {
    /// Returns a host port that is currently free.
    ///
    /// # Errors
    ///
    /// Returns an error if no port could be reserved.
    fn free_port(&self) -> Result<u16>;

    /// Returns the address under which the host is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if no address could be determined.
    fn host_address(&self) -> Result<IpAddr>;
}

/// The real host: asks the OS for ports and routes for the address.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostNetwork for SystemHost {
    fn free_port(&self) -> Result<u16> {
        let listener =
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|e| TestComposeError::Io {
                path: "0.0.0.0:0".into(),
                source: e,
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| TestComposeError::Io {
                path: "0.0.0.0:0".into(),
                source: e,
            })?
            .port();
        tracing::debug!(port, "allocated free host port");
        Ok(port)
    }

    fn host_address(&self) -> Result<IpAddr> {
        // Connecting a UDP socket sends nothing; it only picks the
        // outbound interface.
        let routed = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .and_then(|socket| {
                socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
                socket.local_addr()
            })
            .map(|addr| addr.ip());
        match routed {
            Ok(ip) if !ip.is_unspecified() => Ok(ip),
            Ok(_) | Err(_) => {
                tracing::debug!("no routed interface, falling back to loopback");
                Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
            }
        }
    }
}

/// A deterministic host: sequential ports from a base and a fixed address.
#[derive(Debug)]
pub struct StaticHost {
    next_port: AtomicU16,
    address: IpAddr,
}

impl StaticHost {
    /// Hands out `base`, `base + 1`, ... and always reports `address`.
    #[must_use]
    pub const fn new(base: u16, address: IpAddr) -> Self {
        Self {
            next_port: AtomicU16::new(base),
            address,
        }
    }
}

impl Default for StaticHost {
    fn default() -> Self {
        Self::new(40_000, IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl HostNetwork for StaticHost {
    fn free_port(&self) -> Result<u16> {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        if port == 0 {
            return Err(TestComposeError::Config {
                message: "static host ran out of ports".into(),
            });
        }
        Ok(port)
    }

    fn host_address(&self) -> Result<IpAddr> {
        Ok(self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_host_allocates_nonzero_port() {
        let port = SystemHost.free_port().expect("free port");
        assert_ne!(port, 0);
    }

    #[test]
    fn system_host_address_is_not_unspecified() {
        let ip = SystemHost.host_address().expect("address");
        assert!(!ip.is_unspecified());
    }

    #[test]
    fn static_host_is_sequential() {
        let host = StaticHost::new(50_000, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(host.free_port().expect("port"), 50_000);
        assert_eq!(host.free_port().expect("port"), 50_001);
        assert_eq!(
            host.host_address().expect("addr"),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))
        );
    }
}
