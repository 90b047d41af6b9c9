//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus},
};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_PROBES: &[&str] = &["1.1.1.1:443", "8.8.8.8:53"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(10);

/// Desktop network monitor implementation
///
/// Reachability is a TCP connect to a small set of well-known hosts; the
/// first successful connect wins. Results are cached briefly so a burst of
/// `connect` calls does not probe once each.
pub struct DesktopNetworkMonitor {
    probes: Vec<String>,
    cached: Mutex<Option<(Instant, NetworkInfo)>>,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor
    pub fn new() -> Self {
        Self::with_probes(DEFAULT_PROBES.iter().map(|p| p.to_string()).collect())
    }

    /// Create a monitor that probes the given `host:port` addresses.
    pub fn with_probes(probes: Vec<String>) -> Self {
        Self {
            probes,
            cached: Mutex::new(None),
        }
    }

    async fn check_connectivity(&self) -> NetworkInfo {
        if self.probes.is_empty() {
            return NetworkInfo::new(NetworkStatus::Indeterminate);
        }

        for probe in &self.probes {
            match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(probe.as_str())).await {
                Ok(Ok(_)) => {
                    return NetworkInfo {
                        status: NetworkStatus::Connected,
                        reachable_via: Some(probe.clone()),
                    }
                }
                Ok(Err(e)) => debug!(probe = %probe, error = %e, "Reachability probe failed"),
                Err(_) => debug!(probe = %probe, "Reachability probe timed out"),
            }
        }

        NetworkInfo::new(NetworkStatus::Disconnected)
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let mut cached = self.cached.lock().await;
        if let Some((checked_at, info)) = cached.as_ref() {
            if checked_at.elapsed() < CACHE_TTL {
                return Ok(info.clone());
            }
        }

        let info = self.check_connectivity().await;
        *cached = Some((Instant::now(), info.clone()));
        debug!(status = ?info.status, via = ?info.reachable_via, "Network info updated");

        Ok(info)
    }
}
