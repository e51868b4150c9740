//! Host-facing transfer callbacks.
//!
//! Both callbacks run in the request-handling context and must not block
//! for long; hand anything expensive to a channel or task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use lanbeam_core::DeviceInfo;
use lanbeam_protocol::FileInfo;

/// Final accounting delivered with the `finished` progress event.
#[derive(Debug, Clone)]
pub struct CompletionInfo {
    pub file_path: PathBuf,
    pub total_time_seconds: f64,
    /// bytes per second over the whole file; 0 when no time elapsed.
    pub average_speed: f64,
}

/// One progress tick for a file being received.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub file_id: String,
    pub file_name: String,
    pub bytes_received: u64,
    pub total_bytes: u64,
    pub bytes_per_second: f64,
    pub finished: bool,
    pub completion: Option<CompletionInfo>,
}

/// Invoked once per prepare-upload when no PIN is configured; `false`
/// answers the sender with 403.
pub type TransferRequestHandler =
    Arc<dyn Fn(&DeviceInfo, &HashMap<String, FileInfo>) -> bool + Send + Sync>;

/// Invoked periodically during a chunk (at most every 100 ms) and once
/// with `finished = true` on file completion.
pub type TransferProgressHandler = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct TransferObserver {
    pub on_request: Option<TransferRequestHandler>,
    pub on_progress: Option<TransferProgressHandler>,
}

impl TransferObserver {
    /// Without a registered handler every transfer is accepted.
    pub fn request_allowed(
        &self,
        sender: &DeviceInfo,
        files: &HashMap<String, FileInfo>,
    ) -> bool {
        match &self.on_request {
            Some(handler) => handler(sender, files),
            None => true,
        }
    }

    pub fn progress(&self, event: ProgressEvent) {
        if let Some(handler) = &self.on_progress {
            handler(event);
        }
    }
}
