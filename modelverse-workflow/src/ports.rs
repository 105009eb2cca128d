use async_trait::async_trait;
use modelverse_core::{CoreError, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Decides whether a port is free on the host.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_free(&self, port: u16) -> bool;
}

/// A port is free when an active connection attempt to it fails.
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    host: IpAddr,
    connect_timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            connect_timeout,
        }
    }
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_free(&self, port: u16) -> bool {
        !matches!(
            timeout(self.connect_timeout, TcpStream::connect((self.host, port))).await,
            Ok(Ok(_))
        )
    }
}

/// Sequential port scan from a fixed start.
///
/// The allocator does not bind anything. Each free candidate is offered to
/// a `claim` callback, which lets the caller atomically reserve it against
/// other in-flight starts; a rejected claim moves the scan on.
#[derive(Debug, Clone)]
pub struct PortAllocator<P: PortProbe> {
    probe: P,
    start: u16,
    max_attempts: u16,
}

impl<P: PortProbe> PortAllocator<P> {
    pub fn new(probe: P, start: u16, max_attempts: u16) -> Self {
        Self {
            probe,
            start,
            max_attempts,
        }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub async fn allocate(&self, mut claim: impl FnMut(u16) -> bool + Send) -> Result<u16> {
        for offset in 0..self.max_attempts {
            let Some(port) = self.start.checked_add(offset) else {
                break;
            };
            if !self.probe.is_free(port).await {
                debug!(port, "port busy");
                continue;
            }
            if claim(port) {
                return Ok(port);
            }
            debug!(port, "port reserved by another task");
        }
        Err(CoreError::ResourceUnavailable(format!(
            "no free port after {} attempts from {}",
            self.max_attempts, self.start
        )))
    }
}

impl PortAllocator<TcpPortProbe> {
    pub fn tcp(start: u16, max_attempts: u16) -> Self {
        Self::new(TcpPortProbe::default(), start, max_attempts)
    }
}
