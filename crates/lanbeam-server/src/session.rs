//! Inbound session table.
//!
//! The manager exclusively owns session state and every open write
//! handle. All mutation happens under one mutex with O(1) hold time;
//! file handles are moved out of the table before any I/O touches them
//! and dropped outside the lock.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use lanbeam_core::DeviceInfo;
use lanbeam_protocol::{FileInfo, PrepareUploadResponse};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Blocked by another session")]
    Blocked,

    #[error("Session not found")]
    SessionNotFound,

    #[error("File not found in session")]
    FileNotFound,

    #[error("Invalid token")]
    BadToken,

    #[error("Session belongs to another address")]
    IpMismatch,
}

/// Receive-side accounting for one file. The writer lives here between
/// chunks; an in-flight chunk takes it out and puts it back.
pub struct FileProgress {
    pub bytes_received: u64,
    pub started_at: Instant,
    pub writer: Option<tokio::fs::File>,
}

pub struct Session {
    pub id: String,
    pub sender: DeviceInfo,
    pub client_addr: IpAddr,
    pub files: HashMap<String, FileInfo>,
    pub tokens: HashMap<String, String>,
    pub received: HashSet<String>,
    pub progress: HashMap<String, FileProgress>,
    pub last_activity: Instant,
}

pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    idle_ttl: Duration,
}

fn new_hex_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl SessionManager {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Admit a new session and issue one token per file.
    ///
    /// Single-peer-at-a-time: an active session for any *other* address
    /// blocks the request with 409. A prepare-upload from the same
    /// address replaces that address's previous session.
    pub fn create_session(
        &self,
        sender: DeviceInfo,
        client_addr: IpAddr,
        files: HashMap<String, FileInfo>,
    ) -> Result<PrepareUploadResponse, SessionError> {
        let mut replaced = Vec::new();
        let response = {
            let mut sessions = self.sessions.lock();
            if sessions.values().any(|s| s.client_addr != client_addr) {
                return Err(SessionError::Blocked);
            }

            let stale: Vec<String> = sessions.keys().cloned().collect();
            for id in stale {
                if let Some(session) = sessions.remove(&id) {
                    replaced.push(session);
                }
            }

            let session_id = new_hex_id();
            let tokens: HashMap<String, String> = files
                .keys()
                .map(|file_id| (file_id.clone(), new_hex_id()))
                .collect();

            sessions.insert(
                session_id.clone(),
                Session {
                    id: session_id.clone(),
                    sender,
                    client_addr,
                    files,
                    tokens: tokens.clone(),
                    received: HashSet::new(),
                    progress: HashMap::new(),
                    last_activity: Instant::now(),
                },
            );

            PrepareUploadResponse {
                session_id,
                files: tokens,
            }
        };

        // Dropping a replaced session closes its write handles.
        for session in replaced {
            warn!(session = %session.id, "session replaced by new prepare-upload");
        }

        info!(
            session = %response.session_id,
            files = response.files.len(),
            client = %client_addr,
            "transfer session created"
        );
        Ok(response)
    }

    /// Validate one chunk request against the session table.
    pub fn authorize_chunk(
        &self,
        session_id: &str,
        file_id: &str,
        token: &str,
        client_addr: IpAddr,
    ) -> Result<FileInfo, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or(SessionError::SessionNotFound)?;
        if session.client_addr != client_addr {
            return Err(SessionError::IpMismatch);
        }
        let expected = session
            .tokens
            .get(file_id)
            .ok_or(SessionError::FileNotFound)?;
        if expected != token {
            return Err(SessionError::BadToken);
        }
        let file = session
            .files
            .get(file_id)
            .cloned()
            .ok_or(SessionError::FileNotFound)?;
        session.last_activity = Instant::now();
        Ok(file)
    }

    /// Move the file's writer and counters out for an in-flight chunk.
    /// Returns `None` when the session is gone.
    pub fn take_progress(
        &self,
        session_id: &str,
        file_id: &str,
    ) -> Option<(Option<tokio::fs::File>, u64, Instant)> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(session_id)?;
        let progress = session
            .progress
            .entry(file_id.to_string())
            .or_insert_with(|| FileProgress {
                bytes_received: 0,
                started_at: Instant::now(),
                writer: None,
            });
        Some((progress.writer.take(), progress.bytes_received, progress.started_at))
    }

    /// Put the writer and counters back after a chunk. Returns `false`
    /// when the session vanished mid-chunk (cancelled); the caller drops
    /// the handle and the partial file stays on disk.
    pub fn store_progress(
        &self,
        session_id: &str,
        file_id: &str,
        writer: Option<tokio::fs::File>,
        bytes_received: u64,
    ) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        let Some(progress) = session.progress.get_mut(file_id) else {
            return false;
        };
        progress.writer = writer;
        progress.bytes_received = bytes_received;
        session.last_activity = Instant::now();
        true
    }

    /// Drop a file's write state after an unrecoverable per-file error.
    /// The session itself continues.
    pub fn abandon_file(&self, session_id: &str, file_id: &str) {
        let removed = {
            let mut sessions = self.sessions.lock();
            sessions
                .get_mut(session_id)
                .and_then(|session| session.progress.remove(file_id))
        };
        drop(removed);
    }

    /// Mark a file fully received. Returns `true` when this completed the
    /// whole session and destroyed it.
    pub fn complete_file(&self, session_id: &str, file_id: &str) -> bool {
        let (finished, dropped_progress, dropped_session) = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(session_id) else {
                return false;
            };
            session.received.insert(file_id.to_string());
            let dropped_progress = session.progress.remove(file_id);
            session.last_activity = Instant::now();

            if session.received.len() == session.files.len() {
                (true, dropped_progress, sessions.remove(session_id))
            } else {
                (false, dropped_progress, None)
            }
        };
        drop(dropped_progress);
        drop(dropped_session);

        if finished {
            info!(session = %session_id, "all files received, session closed");
        }
        finished
    }

    /// Tear a session down, closing any open write handles. Idempotent.
    pub fn cancel(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().remove(session_id);
        let cancelled = removed.is_some();
        drop(removed);
        if cancelled {
            info!(session = %session_id, "session cancelled");
        }
        cancelled
    }

    /// Cancel every active session (shutdown path).
    pub fn cancel_all(&self) {
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.lock();
            sessions.drain().map(|(_, s)| s).collect()
        };
        for session in &drained {
            info!(session = %session.id, "session cancelled on shutdown");
        }
    }

    /// Destroy sessions idle longer than the TTL. Returns how many.
    pub fn sweep_idle(&self) -> usize {
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.lock();
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.last_activity.elapsed() > self.idle_ttl)
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .iter()
                .filter_map(|id| sessions.remove(id))
                .collect()
        };
        for session in &expired {
            warn!(session = %session.id, "idle session expired");
        }
        expired.len()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanbeam_core::{DeviceType, Protocol};
    use std::sync::Arc;

    fn sender(fingerprint: &str) -> DeviceInfo {
        DeviceInfo {
            alias: "Sender".into(),
            version: "2.0".into(),
            device_model: None,
            device_type: DeviceType::Mobile,
            fingerprint: fingerprint.into(),
            port: 53317,
            protocol: Protocol::Http,
            download: false,
            ip: None,
        }
    }

    fn one_file(id: &str) -> HashMap<String, FileInfo> {
        let mut files = HashMap::new();
        files.insert(
            id.to_string(),
            FileInfo {
                id: id.to_string(),
                file_name: format!("{id}.bin"),
                size: 100,
                file_type: "application/octet-stream".into(),
                sha256: None,
                preview: None,
                metadata: None,
            },
        );
        files
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([192, 168, 1, last])
    }

    fn manager() -> SessionManager {
        SessionManager::new(Duration::from_secs(600))
    }

    #[test]
    fn session_ids_and_tokens_are_32_char_hex() {
        let m = manager();
        let resp = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        assert_eq!(resp.session_id.len(), 32);
        assert!(resp.session_id.chars().all(|c| c.is_ascii_hexdigit()));
        let token = resp.files.get("f1").unwrap();
        assert_eq!(token.len(), 32);
    }

    #[test]
    fn authorize_checks_each_credential() {
        let m = manager();
        let resp = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        let token = resp.files["f1"].clone();

        assert!(m
            .authorize_chunk(&resp.session_id, "f1", &token, ip(10))
            .is_ok());
        assert_eq!(
            m.authorize_chunk("missing", "f1", &token, ip(10)).unwrap_err(),
            SessionError::SessionNotFound
        );
        assert_eq!(
            m.authorize_chunk(&resp.session_id, "f2", &token, ip(10))
                .unwrap_err(),
            SessionError::FileNotFound
        );
        assert_eq!(
            m.authorize_chunk(&resp.session_id, "f1", "wrong", ip(10))
                .unwrap_err(),
            SessionError::BadToken
        );
        assert_eq!(
            m.authorize_chunk(&resp.session_id, "f1", &token, ip(11))
                .unwrap_err(),
            SessionError::IpMismatch
        );
    }

    #[test]
    fn second_peer_is_blocked_until_the_first_session_ends() {
        let m = manager();
        let first = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        assert_eq!(
            m.create_session(sender("b"), ip(11), one_file("f2"))
                .unwrap_err(),
            SessionError::Blocked
        );

        m.cancel(&first.session_id);
        assert!(m.create_session(sender("b"), ip(11), one_file("f2")).is_ok());
    }

    #[test]
    fn same_address_replaces_its_own_session() {
        let m = manager();
        let first = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        let second = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        assert!(!m.is_active(&first.session_id));
        assert!(m.is_active(&second.session_id));
        assert_eq!(m.active_count(), 1);
    }

    #[test]
    fn exactly_one_of_two_concurrent_peers_wins() {
        let m = Arc::new(manager());
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let mut handles = Vec::new();
        for peer in 0..2u8 {
            let m = m.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                m.create_session(sender("x"), ip(20 + peer), one_file("f"))
                    .is_ok()
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(m.active_count(), 1);
    }

    #[test]
    fn completing_every_file_destroys_the_session() {
        let m = manager();
        let mut files = one_file("f1");
        files.extend(one_file("f2"));
        let resp = m.create_session(sender("a"), ip(10), files).unwrap();

        assert!(!m.complete_file(&resp.session_id, "f1"));
        assert!(m.is_active(&resp.session_id));
        assert!(m.complete_file(&resp.session_id, "f2"));
        assert!(!m.is_active(&resp.session_id));
    }

    #[test]
    fn cancel_is_idempotent() {
        let m = manager();
        let resp = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        assert!(m.cancel(&resp.session_id));
        assert!(!m.cancel(&resp.session_id));
    }

    #[test]
    fn idle_sessions_are_swept() {
        let m = SessionManager::new(Duration::from_millis(0));
        let resp = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(m.sweep_idle(), 1);
        assert!(!m.is_active(&resp.session_id));
    }

    #[test]
    fn progress_round_trips_through_the_table() {
        let m = manager();
        let resp = m.create_session(sender("a"), ip(10), one_file("f1")).unwrap();
        let (writer, bytes, _started) = m.take_progress(&resp.session_id, "f1").unwrap();
        assert!(writer.is_none());
        assert_eq!(bytes, 0);
        assert!(m.store_progress(&resp.session_id, "f1", None, 42));
        let (_, bytes, _) = m.take_progress(&resp.session_id, "f1").unwrap();
        assert_eq!(bytes, 42);

        m.cancel(&resp.session_id);
        assert!(!m.store_progress(&resp.session_id, "f1", None, 50));
    }
}
