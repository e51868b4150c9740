//! Node lifecycle: discovery, serving, and shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use lanbeam_client::PeerClient;
use lanbeam_core::{DeviceInfo, Error, NodeConfig, NodeOptions, Protocol, Result};
use lanbeam_discovery::{
    Discovery, MulticastDiscovery, PeerCallback, PeerRegistry, ScanDiscovery,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::events::TransferObserver;
use crate::routes;
use crate::state::AppState;
use crate::tls;

/// How long in-flight handlers get to drain on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);
/// Idle-session sweep cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time snapshot for host UIs.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub running: bool,
    pub port: u16,
    pub alias: String,
    pub fingerprint: String,
    #[serde(rename = "knownPeers")]
    pub known_peers: usize,
    #[serde(rename = "activeSessions")]
    pub active_sessions: usize,
}

/// A running LanBeam node: server, discovery, and session state.
pub struct Node {
    state: Arc<AppState>,
    client: Arc<PeerClient>,
    multicast: Arc<MulticastDiscovery>,
    scanner: Arc<ScanDiscovery>,
    shutdown_tx: watch::Sender<bool>,
    tls_handle: Option<axum_server::Handle>,
    server_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    sweeper_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Node {
    /// Bring the node up: HTTP(S) listener, multicast discovery, subnet
    /// scanner, and the idle-session sweeper, all concurrent.
    pub async fn start(
        options: NodeOptions,
        observer: TransferObserver,
        on_peer: Option<PeerCallback>,
    ) -> Result<Node> {
        let config = Arc::new(NodeConfig::from_options(options)?);
        tokio::fs::create_dir_all(&config.save_dir).await?;

        let registry = Arc::new(PeerRegistry::new());
        let client = Arc::new(
            PeerClient::new(&config).map_err(|err| Error::Http(err.to_string()))?,
        );
        let state = Arc::new(AppState::new(config.clone(), registry.clone(), observer));
        let app = routes::build_router(state.clone());

        let (shutdown_tx, _) = watch::channel(false);
        let addr = SocketAddr::from(([0, 0, 0, 0], config.device.port));

        let (server_task, tls_handle) = match config.device.protocol {
            Protocol::Http => {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                let mut shutdown_rx = shutdown_tx.subscribe();
                let server = axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.changed().await;
                });
                let task = tokio::spawn(async move {
                    if let Err(err) = server.await {
                        error!(error = %err, "server error");
                    }
                });
                (task, None)
            }
            Protocol::Https => {
                let material = tls::self_signed()?;
                let rustls = RustlsConfig::from_pem(
                    material.cert_pem.into_bytes(),
                    material.key_pem.into_bytes(),
                )
                .await?;
                let handle = axum_server::Handle::new();
                let server_handle = handle.clone();
                let task = tokio::spawn(async move {
                    let server = axum_server::bind_rustls(addr, rustls)
                        .handle(server_handle)
                        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
                    if let Err(err) = server.await {
                        error!(error = %err, "server error");
                    }
                });
                (task, Some(handle))
            }
        };
        info!(
            %addr,
            protocol = config.device.protocol.scheme(),
            alias = %config.device.alias,
            "node listening"
        );

        let multicast = Arc::new(MulticastDiscovery::new(
            config.clone(),
            registry.clone(),
            client.clone(),
            on_peer.clone(),
        ));
        multicast.start().await?;

        let scanner = Arc::new(ScanDiscovery::new(
            config.clone(),
            registry,
            client.clone(),
            on_peer,
        ));
        scanner.start().await?;

        let sweeper_task = {
            let sessions = state.sessions.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            sessions.sweep_idle();
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
            })
        };

        Ok(Node {
            state,
            client,
            multicast,
            scanner,
            shutdown_tx,
            tls_handle,
            server_task: parking_lot::Mutex::new(Some(server_task)),
            sweeper_task: parking_lot::Mutex::new(Some(sweeper_task)),
            running: AtomicBool::new(true),
        })
    }

    /// Shut down: discovery first, then the listener (drained with a
    /// deadline), then every active session.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("node stopping");

        self.multicast.stop().await;
        self.scanner.stop().await;

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = &self.tls_handle {
            handle.graceful_shutdown(Some(SHUTDOWN_DEADLINE));
        }
        let server_task = self.server_task.lock().take();
        if let Some(task) = server_task {
            if tokio::time::timeout(SHUTDOWN_DEADLINE + Duration::from_secs(1), task)
                .await
                .is_err()
            {
                error!("server did not drain before the deadline");
            }
        }

        if let Some(task) = self.sweeper_task.lock().take() {
            task.abort();
        }

        self.state.sessions.cancel_all();
        info!("node stopped");
    }

    /// Send the multicast announcement burst.
    pub fn announce_presence(&self) -> Result<()> {
        self.multicast.announce_presence()
    }

    /// Trigger a subnet sweep (single-flight with the periodic one).
    pub async fn scan_now(&self) {
        self.scanner.scan_now().await;
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            running: self.running.load(Ordering::SeqCst),
            port: self.state.config.device.port,
            alias: self.state.config.device.alias.clone(),
            fingerprint: self.state.config.device.fingerprint.clone(),
            known_peers: self.state.registry.len(),
            active_sessions: self.state.sessions.active_count(),
        }
    }

    /// Snapshot of discovered peers.
    pub fn peers(&self) -> Vec<DeviceInfo> {
        self.state.registry.peers()
    }

    /// The peer-facing HTTP client, for host-initiated sends.
    pub fn client(&self) -> Arc<PeerClient> {
        self.client.clone()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.state.config
    }
}
