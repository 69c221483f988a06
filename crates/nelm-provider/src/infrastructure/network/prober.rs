//! TCP reachability probe.
//!
//! Opens a plain TCP connection to the device's management endpoint and
//! closes it straight away.  No protocol bytes are exchanged, so the probe
//! says nothing about whether a management session would succeed; it only
//! tells the provider that a reconnection attempt is worth making.
//!
//! # Verdict
//!
//! The device counts as reachable only if the connection opened within the
//! timeout and still had a peer when checked.  Every failure (refused,
//! unroutable, timed out) is logged and folded into `false`.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use nelm_core::DeviceIdentity;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::application::collaborators::ReachabilityProber;

/// Why a probe failed.  Never leaves this module.
#[derive(Debug, Error)]
enum ProbeError {
    #[error("connect to {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("connection to {addr} closed before it could be checked")]
    Closed { addr: SocketAddr },
}

pub struct TcpReachabilityProber {
    timeout: Duration,
}

impl TcpReachabilityProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn try_probe(&self, addr: SocketAddr) -> Result<(), ProbeError> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::Timeout {
                addr,
                timeout: self.timeout,
            })?
            .map_err(|source| ProbeError::Connect { addr, source })?;

        let open = stream.peer_addr().is_ok();
        if let Err(e) = stream.shutdown().await {
            debug!("closing probe connection to {addr} failed: {e}");
        }
        drop(stream);

        if open {
            Ok(())
        } else {
            Err(ProbeError::Closed { addr })
        }
    }
}

impl Default for TcpReachabilityProber {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

#[async_trait]
impl ReachabilityProber for TcpReachabilityProber {
    async fn probe(&self, id: &DeviceIdentity) -> bool {
        match self.try_probe(id.socket_addr()).await {
            Ok(()) => {
                debug!("{id} is reachable");
                true
            }
            Err(e) => {
                info!("{id} is not reachable: {e}");
                false
            }
        }
    }
}
