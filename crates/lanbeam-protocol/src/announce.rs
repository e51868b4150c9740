//! Multicast announcement codec.
//!
//! An announcement is the device descriptor plus a solicitation marker.
//! Current peers send `announce`; older ones send `announcement`. Either
//! being true marks a solicitation, and outgoing messages carry both for
//! compatibility.

use lanbeam_core::{DeviceInfo, Error, Result};
use serde::{Deserialize, Serialize};

/// A single announcement datagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(flatten)]
    pub device: DeviceInfo,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub announce: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub announcement: Option<bool>,
}

impl Announcement {
    /// Build an outgoing announcement. Both marker spellings are set.
    pub fn new(device: DeviceInfo, soliciting: bool) -> Self {
        Self {
            device,
            announce: Some(soliciting),
            announcement: Some(soliciting),
        }
    }

    /// True when the peer asks to be answered (by register or datagram).
    pub fn is_solicitation(&self) -> bool {
        self.announce.or(self.announcement).unwrap_or(false)
    }

    /// Encode to a single JSON datagram payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a datagram. Anything malformed (non-JSON, missing
    /// fingerprint, wrong field types) is an error; the UDP channel is
    /// lossy by design, so callers drop these silently.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let message: Announcement = serde_json::from_slice(payload)?;
        if message.device.fingerprint.is_empty() {
            return Err(Error::Codec("announcement without fingerprint".into()));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanbeam_core::{DeviceType, Protocol, PROTOCOL_VERSION};

    fn device(fingerprint: &str) -> DeviceInfo {
        DeviceInfo {
            alias: "Node".into(),
            version: PROTOCOL_VERSION.into(),
            device_model: None,
            device_type: DeviceType::Desktop,
            fingerprint: fingerprint.into(),
            port: 53317,
            protocol: Protocol::Http,
            download: false,
            ip: None,
        }
    }

    #[test]
    fn outgoing_announcement_carries_both_markers() {
        let json: serde_json::Value =
            serde_json::from_slice(&Announcement::new(device("aa"), true).encode().unwrap())
                .unwrap();
        assert_eq!(json["announce"], true);
        assert_eq!(json["announcement"], true);
        assert_eq!(json["fingerprint"], "aa");
    }

    #[test]
    fn legacy_marker_alone_is_a_solicitation() {
        let raw = r#"{
            "alias": "Old", "version": "2.0", "deviceType": "mobile",
            "fingerprint": "bb", "port": 53317, "protocol": "http",
            "download": false, "announcement": true
        }"#;
        let message = Announcement::decode(raw.as_bytes()).unwrap();
        assert!(message.is_solicitation());
    }

    #[test]
    fn announce_false_is_a_response_not_a_solicitation() {
        let message =
            Announcement::decode(&Announcement::new(device("cc"), false).encode().unwrap())
                .unwrap();
        assert!(!message.is_solicitation());
    }

    #[test]
    fn both_marker_spellings_decode_to_the_same_message() {
        let current = r#"{"alias":"N","version":"2.0","deviceType":"desktop",
            "fingerprint":"dd","port":53317,"protocol":"http","download":false,
            "announce":true}"#;
        let legacy = r#"{"alias":"N","version":"2.0","deviceType":"desktop",
            "fingerprint":"dd","port":53317,"protocol":"http","download":false,
            "announcement":true}"#;
        let a = Announcement::decode(current.as_bytes()).unwrap();
        let b = Announcement::decode(legacy.as_bytes()).unwrap();
        assert_eq!(a.is_solicitation(), b.is_solicitation());
        assert_eq!(a.device.fingerprint, b.device.fingerprint);
    }

    #[test]
    fn malformed_datagrams_fail_to_decode() {
        assert!(Announcement::decode(b"not json").is_err());
        // missing fingerprint
        assert!(Announcement::decode(
            br#"{"alias":"X","version":"2.0","deviceType":"desktop",
                "port":53317,"protocol":"http","download":false,"announce":true}"#
        )
        .is_err());
        // non-string alias
        assert!(Announcement::decode(
            br#"{"alias":7,"version":"2.0","deviceType":"desktop","fingerprint":"ee",
                "port":53317,"protocol":"http","download":false,"announce":true}"#
        )
        .is_err());
    }
}
