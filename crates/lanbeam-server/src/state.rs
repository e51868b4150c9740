//! Shared application state accessible from all route handlers.

use std::sync::Arc;

use lanbeam_core::NodeConfig;
use lanbeam_discovery::PeerRegistry;

use crate::events::TransferObserver;
use crate::session::SessionManager;

pub struct AppState {
    pub config: Arc<NodeConfig>,
    pub sessions: Arc<SessionManager>,
    pub registry: Arc<PeerRegistry>,
    pub observer: TransferObserver,
}

impl AppState {
    pub fn new(
        config: Arc<NodeConfig>,
        registry: Arc<PeerRegistry>,
        observer: TransferObserver,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(config.session_idle_ttl));
        Self {
            config,
            sessions,
            registry,
            observer,
        }
    }
}
