//! UDP multicast discoverer.
//!
//! One socket, bound with `SO_REUSEADDR` to the protocol port, joined to
//! the group on every non-loopback IPv4 interface. Announcements go out
//! as a triple burst to ride over single-datagram loss. All sends are
//! serialised behind one mutex: `IP_MULTICAST_IF` is socket state.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lanbeam_client::PeerClient;
use lanbeam_core::{DeviceInfo, Error, NodeConfig, Result, MULTICAST_PORT};
use lanbeam_protocol::Announcement;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::registry::PeerRegistry;
use crate::{Discovery, PeerCallback};

/// 224.0.0.167, the LocalSend group.
const MULTICAST_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 167);

/// Announcement burst schedule, offsets from `announce_presence`.
const BURST_OFFSETS_MS: [u64; 3] = [100, 500, 2000];

pub struct MulticastDiscovery {
    config: Arc<NodeConfig>,
    registry: Arc<PeerRegistry>,
    client: Arc<PeerClient>,
    on_peer: Option<PeerCallback>,
    socket: parking_lot::Mutex<Option<Arc<UdpSocket>>>,
    interfaces: parking_lot::Mutex<Vec<Ipv4Addr>>,
    send_lock: Arc<tokio::sync::Mutex<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl MulticastDiscovery {
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
            socket: parking_lot::Mutex::new(None),
            interfaces: parking_lot::Mutex::new(Vec::new()),
            send_lock: Arc::new(tokio::sync::Mutex::new(())),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Bind, join the group on every usable interface, start receiving.
    async fn start_inner(&self) -> Result<()> {
        let std_socket = bind_multicast_socket(MULTICAST_PORT)?;
        let joined = join_group(&std_socket, &crate::local_ipv4_addrs());
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);

        *self.socket.lock() = Some(socket.clone());
        *self.interfaces.lock() = joined;

        let registry = self.registry.clone();
        let client = self.client.clone();
        let on_peer = self.on_peer.clone();
        let device = self.config.device.clone();
        let send_lock = self.send_lock.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            // One MTU-sized datagram per announcement.
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    result = socket.recv_from(&mut buf) => {
                        match result {
                            Ok((len, src)) => {
                                handle_datagram(
                                    &buf[..len], src, &socket, &send_lock,
                                    &device, &registry, &client, &on_peer,
                                ).await;
                            }
                            Err(err) => {
                                debug!(error = %err, "multicast recv error");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("multicast discovery stopping");
                            break;
                        }
                    }
                }
            }
        });

        info!(port = MULTICAST_PORT, "multicast discovery started");
        Ok(())
    }

    /// Send the solicitation burst: offsets {100 ms, 500 ms, 2000 ms},
    /// rotated across every joined interface.
    pub fn announce_presence(&self) -> Result<()> {
        let socket = self
            .socket
            .lock()
            .clone()
            .ok_or_else(|| Error::Discovery("multicast discovery not started".into()))?;
        let interfaces = self.interfaces.lock().clone();
        let payload = Announcement::new(self.config.device.clone(), true).encode()?;
        let send_lock = self.send_lock.clone();

        tokio::spawn(async move {
            let mut elapsed = 0u64;
            for offset in BURST_OFFSETS_MS {
                tokio::time::sleep(Duration::from_millis(offset - elapsed)).await;
                elapsed = offset;
                send_on_interfaces(&socket, &send_lock, &interfaces, &payload).await;
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Discovery for MulticastDiscovery {
    async fn start(&self) -> Result<()> {
        self.start_inner().await
    }

    async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        *self.socket.lock() = None;
    }
}

fn bind_multicast_socket(port: u16) -> std::io::Result<std::net::UdpSocket> {
    use socket2::{Domain, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(socket2::Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.set_multicast_ttl_v4(1)?;
    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Join the group on each interface; a failed join loses that interface,
/// not the node. With no enumerable interfaces, join on the default one.
fn join_group(socket: &std::net::UdpSocket, interfaces: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let mut joined = Vec::new();
    for iface in interfaces {
        match socket.join_multicast_v4(&MULTICAST_GROUP_V4, iface) {
            Ok(()) => joined.push(*iface),
            Err(err) => warn!(interface = %iface, error = %err, "multicast join failed, skipping"),
        }
    }
    if joined.is_empty() {
        match socket.join_multicast_v4(&MULTICAST_GROUP_V4, &Ipv4Addr::UNSPECIFIED) {
            Ok(()) => debug!("joined multicast group on the default interface"),
            Err(err) => warn!(error = %err, "default multicast join failed"),
        }
    }
    joined
}

async fn send_on_interfaces(
    socket: &UdpSocket,
    send_lock: &tokio::sync::Mutex<()>,
    interfaces: &[Ipv4Addr],
    payload: &[u8],
) {
    let target = SocketAddr::from((MULTICAST_GROUP_V4, MULTICAST_PORT));

    if interfaces.is_empty() {
        let _guard = send_lock.lock().await;
        if let Err(err) = socket.send_to(payload, target).await {
            debug!(error = %err, "announcement send failed");
        }
        return;
    }

    for iface in interfaces {
        // The guard covers both the interface switch and the send.
        let _guard = send_lock.lock().await;
        if let Err(err) = socket2::SockRef::from(socket).set_multicast_if_v4(iface) {
            debug!(interface = %iface, error = %err, "IP_MULTICAST_IF failed");
            continue;
        }
        if let Err(err) = socket.send_to(payload, target).await {
            debug!(interface = %iface, error = %err, "announcement send failed");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_datagram(
    payload: &[u8],
    src: SocketAddr,
    socket: &Arc<UdpSocket>,
    send_lock: &tokio::sync::Mutex<()>,
    device: &DeviceInfo,
    registry: &PeerRegistry,
    client: &PeerClient,
    on_peer: &Option<PeerCallback>,
) {
    // The UDP channel is lossy by design; malformed datagrams vanish.
    let Ok(message) = Announcement::decode(payload) else {
        trace!(%src, "dropping malformed datagram");
        return;
    };
    if message.device.fingerprint == device.fingerprint {
        return;
    }

    let peer = message.device.clone().with_ip(src.ip().to_string());
    debug!(fingerprint = %peer.fingerprint, ip = %src.ip(), "peer announcement");

    if message.is_solicitation() {
        // Prefer answering over HTTP; fall back to a response datagram.
        if client.register(&peer).await.is_none() {
            let reply = Announcement::new(device.clone(), false);
            if let Ok(bytes) = reply.encode() {
                let _guard = send_lock.lock().await;
                if let Err(err) = socket.send_to(&bytes, src).await {
                    debug!(%src, error = %err, "response datagram failed");
                }
            }
        }
    }

    registry.insert(peer.clone());
    if let Some(callback) = on_peer {
        callback(peer);
    }
}
