//! Peer discovery.
//!
//! Two mechanisms feed the same registry: UDP multicast announcements
//! (primary) and an HTTP subnet scan (fallback for networks that filter
//! multicast). Deduplication is by fingerprint, never by address.

pub mod multicast;
pub mod registry;
pub mod scanner;

use std::sync::Arc;

use async_trait::async_trait;
use lanbeam_client::PeerClient;
use lanbeam_core::{DeviceInfo, NodeConfig, Result};

pub use multicast::MulticastDiscovery;
pub use registry::PeerRegistry;
pub use scanner::ScanDiscovery;

/// Callback invoked once per received peer message.
pub type PeerCallback = Arc<dyn Fn(DeviceInfo) + Send + Sync>;

/// A discovery mechanism feeding the peer registry.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self);
}

/// Which mechanism to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    Multicast,
    HttpScan,
}

/// Build a discovery backend over the shared registry and client.
pub fn create_discovery(
    method: DiscoveryMethod,
    config: Arc<NodeConfig>,
    registry: Arc<PeerRegistry>,
    client: Arc<PeerClient>,
    on_peer: Option<PeerCallback>,
) -> Arc<dyn Discovery> {
    match method {
        DiscoveryMethod::Multicast => {
            Arc::new(MulticastDiscovery::new(config, registry, client, on_peer))
        }
        DiscoveryMethod::HttpScan => {
            Arc::new(ScanDiscovery::new(config, registry, client, on_peer))
        }
    }
}

/// Non-loopback IPv4 addresses of this host. An enumeration failure is a
/// local concern: logged, and the caller falls back to defaults.
pub fn local_ipv4_addrs() -> Vec<std::net::Ipv4Addr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .filter_map(|iface| match iface.addr {
                if_addrs::IfAddr::V4(v4) => Some(v4.ip),
                _ => None,
            })
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "interface enumeration failed");
            Vec::new()
        }
    }
}
