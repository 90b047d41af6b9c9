//! Network reachability.
//!
//! Sign-in consults the monitor before touching the network: an offline
//! device short-circuits `connect` instead of failing deep inside a token
//! exchange.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// The host cannot tell (no probes configured, platform API missing).
    Indeterminate,
}

/// Result of one reachability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    /// Endpoint that answered, when the check was a probe.
    pub reachable_via: Option<String>,
}

impl NetworkInfo {
    pub fn new(status: NetworkStatus) -> Self {
        Self {
            status,
            reachable_via: None,
        }
    }
}

#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Only a definite `Disconnected` or a failed check counts as offline.
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected | NetworkStatus::Indeterminate,
                ..
            })
        )
    }
}
