//! HTTP operations against a single peer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lanbeam_core::{DeviceInfo, NodeConfig, Protocol};
use lanbeam_protocol::{ContentRange, FileInfo, PrepareUploadRequest, PrepareUploadResponse};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

const INFO_TIMEOUT: Duration = Duration::from_secs(1);
const REGISTER_TIMEOUT: Duration = Duration::from_secs(2);
const PREPARE_TIMEOUT: Duration = Duration::from_secs(5);
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("peer requires a valid PIN")]
    PinRequired,

    #[error("peer rejected the transfer")]
    Rejected,

    #[error("peer is blocked by another session")]
    Blocked,

    #[error("peer answered HTTP {0}")]
    Status(u16),

    #[error("peer has no known address")]
    NoAddress,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Progress callback: `(bytes_sent, total_bytes, finished)`. Invoked
/// before each chunk goes out and once more on completion.
pub type SendProgress = Arc<dyn Fn(u64, u64, bool) + Send + Sync>;

/// Split a file into end-inclusive upload ranges of at most `chunk_size`.
pub fn chunk_ranges(size: u64, chunk_size: u64) -> Vec<ContentRange> {
    let mut ranges = Vec::new();
    let mut start = 0u64;
    while start < size {
        let end = (start + chunk_size).min(size) - 1;
        ranges.push(ContentRange {
            start,
            end,
            total: size,
        });
        start = end + 1;
    }
    ranges
}

pub struct PeerClient {
    http: reqwest::Client,
    device: DeviceInfo,
    chunk_threshold: u64,
    chunk_size: u64,
}

impl PeerClient {
    pub fn new(config: &NodeConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()?;
        Ok(Self {
            http,
            device: config.device.clone(),
            chunk_threshold: config.chunk_threshold,
            chunk_size: config.chunk_size,
        })
    }

    fn base_url(protocol: Protocol, ip: &str, port: u16) -> String {
        format!("{}://{}:{}/api/localsend/v2", protocol.scheme(), ip, port)
    }

    fn peer_url(peer: &DeviceInfo, endpoint: &str) -> Result<String, ClientError> {
        let ip = peer.ip.as_deref().ok_or(ClientError::NoAddress)?;
        Ok(format!(
            "{}/{}",
            Self::base_url(peer.protocol, ip, peer.port),
            endpoint
        ))
    }

    /// Probe a host for its descriptor, preferred protocol first. Any
    /// failure yields `None`; absence of a peer is the normal case.
    pub async fn info(&self, ip: &str, port: u16, preferred: Protocol) -> Option<DeviceInfo> {
        for protocol in [preferred, preferred.other()] {
            let url = format!("{}/info", Self::base_url(protocol, ip, port));
            let response = self.http.get(&url).timeout(INFO_TIMEOUT).send().await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(mut device) = resp.json::<DeviceInfo>().await {
                        device.ip = Some(ip.to_string());
                        device.protocol = protocol;
                        return Some(device);
                    }
                }
                Ok(_) | Err(_) => continue,
            }
        }
        None
    }

    /// Exchange descriptors with a discovered peer.
    pub async fn register(&self, peer: &DeviceInfo) -> Option<DeviceInfo> {
        let url = Self::peer_url(peer, "register").ok()?;
        let response = self
            .http
            .post(&url)
            .timeout(REGISTER_TIMEOUT)
            .json(&self.device)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => {
                let mut device = resp.json::<DeviceInfo>().await.ok()?;
                device.ip = peer.ip.clone();
                Some(device)
            }
            Ok(resp) => {
                debug!(status = %resp.status(), url, "register refused");
                None
            }
            Err(err) => {
                debug!(error = %err, url, "register unreachable");
                None
            }
        }
    }

    /// Negotiate an upload session for a set of files.
    pub async fn prepare_upload(
        &self,
        peer: &DeviceInfo,
        files: &[FileInfo],
        pin: Option<&str>,
    ) -> Result<PrepareUploadResponse, ClientError> {
        let url = Self::peer_url(peer, "prepare-upload")?;
        let body = PrepareUploadRequest {
            info: self.device.clone(),
            files: files
                .iter()
                .map(|f| (f.id.clone(), f.clone()))
                .collect::<HashMap<_, _>>(),
        };

        let mut request = self.http.post(&url).timeout(PREPARE_TIMEOUT).json(&body);
        if let Some(pin) = pin {
            request = request.query(&[("pin", pin)]);
        }
        let response = request.send().await?;

        match response.status().as_u16() {
            // Accepted with nothing to upload.
            204 => Ok(PrepareUploadResponse {
                session_id: String::new(),
                files: HashMap::new(),
            }),
            200..=299 => Ok(response.json::<PrepareUploadResponse>().await?),
            401 => Err(ClientError::PinRequired),
            403 => Err(ClientError::Rejected),
            409 => Err(ClientError::Blocked),
            status => Err(ClientError::Status(status)),
        }
    }

    /// Stream one file to the peer, chunked above the threshold.
    ///
    /// Chunks are sequential: the next one goes out only after the
    /// previous response. The first non-2xx response aborts the upload.
    pub async fn upload_file(
        &self,
        peer: &DeviceInfo,
        session_id: &str,
        file_id: &str,
        token: &str,
        path: &Path,
        progress: Option<SendProgress>,
    ) -> Result<(), ClientError> {
        let url = Self::peer_url(peer, "upload")?;
        let query = [
            ("sessionId", session_id),
            ("fileId", file_id),
            ("token", token),
        ];
        let size = tokio::fs::metadata(path).await?.len();

        let report = |sent: u64, finished: bool| {
            if let Some(cb) = &progress {
                cb(sent, size, finished);
            }
        };

        if size > self.chunk_threshold {
            let mut file = tokio::fs::File::open(path).await?;
            let mut sent = 0u64;
            for range in chunk_ranges(size, self.chunk_size) {
                report(sent, false);
                let mut buf = vec![0u8; range.len() as usize];
                file.read_exact(&mut buf).await?;

                let response = self
                    .http
                    .post(&url)
                    .timeout(CHUNK_TIMEOUT)
                    .query(&query)
                    .header("X-Content-Range", range.header_value())
                    .body(buf)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    warn!(status, file_id, start = range.start, "chunk refused, aborting");
                    return Err(ClientError::Status(status));
                }
                sent = range.end + 1;
            }
        } else {
            report(0, false);
            let body = tokio::fs::read(path).await?;
            let response = self
                .http
                .post(&url)
                .timeout(CHUNK_TIMEOUT)
                .query(&query)
                .body(body)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(ClientError::Status(response.status().as_u16()));
            }
        }

        report(size, true);
        Ok(())
    }

    /// Tear down a session on the peer. Best-effort.
    pub async fn cancel_session(&self, peer: &DeviceInfo, session_id: &str) -> bool {
        let Ok(url) = Self::peer_url(peer, "cancel") else {
            return false;
        };
        let response = self
            .http
            .post(&url)
            .timeout(CANCEL_TIMEOUT)
            .query(&[("sessionId", session_id)])
            .send()
            .await;
        matches!(response, Ok(resp) if resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_files_need_no_ranges_above_threshold_logic() {
        // A 120 MB file at 10 MB chunks: twelve ranges covering every byte.
        let ranges = chunk_ranges(120_000_000, 10_000_000);
        assert_eq!(ranges.len(), 12);
        assert_eq!(ranges[0].header_value(), "bytes 0-9999999/120000000");
        assert_eq!(
            ranges[11].header_value(),
            "bytes 110000000-119999999/120000000"
        );
        assert!(ranges[11].is_terminal());
        let covered: u64 = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(covered, 120_000_000);
    }

    #[test]
    fn ranges_are_contiguous_and_in_order() {
        let ranges = chunk_ranges(25, 10);
        assert_eq!(ranges.len(), 3);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        assert_eq!(ranges[2].end, 24);
        assert_eq!(ranges[2].len(), 5);
    }

    #[test]
    fn empty_file_has_no_ranges() {
        assert!(chunk_ranges(0, 10_000_000).is_empty());
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let ranges = chunk_ranges(20, 10);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].len(), 10);
        assert_eq!(ranges[1].len(), 10);
    }
}
