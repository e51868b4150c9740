//! HTTP subnet scanner — fallback discovery for networks without
//! multicast. Probes every host of each local /24 with a bounded worker
//! pool; absence of a host is the normal case, so failures are silent.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lanbeam_client::PeerClient;
use lanbeam_core::{NodeConfig, Result};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info};

use crate::registry::PeerRegistry;
use crate::{Discovery, PeerCallback};

#[derive(Clone)]
pub struct ScanDiscovery {
    config: Arc<NodeConfig>,
    registry: Arc<PeerRegistry>,
    client: Arc<PeerClient>,
    on_peer: Option<PeerCallback>,
    scanning: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ScanDiscovery {
    pub fn new(
        config: Arc<NodeConfig>,
        registry: Arc<PeerRegistry>,
        client: Arc<PeerClient>,
        on_peer: Option<PeerCallback>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            registry,
            client,
            on_peer,
            scanning: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Run one subnet sweep now. A sweep already in flight swallows the
    /// trigger (single-flight).
    pub async fn scan_now(&self) {
        if self.scanning.swap(true, Ordering::SeqCst) {
            debug!("scan already in flight, ignoring trigger");
            return;
        }

        let locals = crate::local_ipv4_addrs();
        let candidates = scan_candidates(&locals);
        debug!(hosts = candidates.len(), "subnet scan starting");

        let semaphore = Arc::new(Semaphore::new(self.config.scan_concurrency));
        let mut probes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let registry = self.registry.clone();
            let on_peer = self.on_peer.clone();
            let self_fingerprint = self.config.device.fingerprint.clone();
            let preferred = self.config.device.protocol;
            let port = self.config.device.port;

            probes.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let Some(device) = client.info(&candidate.to_string(), port, preferred).await
                else {
                    return;
                };
                if device.fingerprint == self_fingerprint {
                    return;
                }
                debug!(fingerprint = %device.fingerprint, ip = %candidate, "scan found peer");
                registry.insert(device.clone());
                if let Some(callback) = &on_peer {
                    callback(device);
                }
            }));
        }
        for probe in probes {
            let _ = probe.await;
        }

        self.scanning.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Discovery for ScanDiscovery {
    async fn start(&self) -> Result<()> {
        let this = self.clone();
        let interval = self.config.scan_interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => this.scan_now().await,
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("subnet scanner stopping");
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Candidate hosts for a sweep: every address of each local /24 except
/// the local addresses themselves, deduplicated across interfaces.
fn scan_candidates(locals: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let own: BTreeSet<Ipv4Addr> = locals.iter().copied().collect();
    let mut candidates = BTreeSet::new();
    for local in locals {
        let [a, b, c, _] = local.octets();
        for host in 1..=254u8 {
            let candidate = Ipv4Addr::new(a, b, c, host);
            if !own.contains(&candidate) {
                candidates.insert(candidate);
            }
        }
    }
    candidates.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_cover_the_slash_24_without_self() {
        let local: Ipv4Addr = "192.168.1.42".parse().unwrap();
        let candidates = scan_candidates(&[local]);
        assert_eq!(candidates.len(), 253);
        assert!(!candidates.contains(&local));
        assert!(candidates.contains(&"192.168.1.1".parse().unwrap()));
        assert!(candidates.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!candidates.contains(&"192.168.1.0".parse().unwrap()));
        assert!(!candidates.contains(&"192.168.1.255".parse().unwrap()));
    }

    #[test]
    fn two_interfaces_on_one_subnet_share_candidates() {
        let a: Ipv4Addr = "10.0.0.5".parse().unwrap();
        let b: Ipv4Addr = "10.0.0.9".parse().unwrap();
        let candidates = scan_candidates(&[a, b]);
        assert_eq!(candidates.len(), 252);
        assert!(!candidates.contains(&a));
        assert!(!candidates.contains(&b));
    }

    #[test]
    fn distinct_subnets_produce_distinct_sweeps() {
        let candidates = scan_candidates(&[
            "192.168.1.10".parse().unwrap(),
            "10.1.2.3".parse().unwrap(),
        ]);
        assert_eq!(candidates.len(), 253 * 2);
    }

    #[test]
    fn no_interfaces_means_no_candidates() {
        assert!(scan_candidates(&[]).is_empty());
    }
}
