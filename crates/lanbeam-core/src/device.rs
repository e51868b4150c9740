//! Device descriptor and per-process identity.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Transport protocol the node's HTTP endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// URL scheme for this protocol.
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// The other protocol, for fallback probing.
    pub fn other(&self) -> Protocol {
        match self {
            Protocol::Http => Protocol::Https,
            Protocol::Https => Protocol::Http,
        }
    }
}

/// Device category advertised in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Web,
    Headless,
    Server,
}

/// Device information for discovery and identification.
///
/// Immutable for the lifetime of the process; the `ip` field is filled in
/// by discovery from the transport source address and never serialized
/// onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub alias: String,
    pub version: String,
    #[serde(rename = "deviceModel", skip_serializing_if = "Option::is_none", default)]
    pub device_model: Option<String>,
    #[serde(rename = "deviceType")]
    pub device_type: DeviceType,
    pub fingerprint: String,
    pub port: u16,
    pub protocol: Protocol,
    pub download: bool,
    #[serde(skip)]
    pub ip: Option<String>,
}

impl DeviceInfo {
    /// The same descriptor with the transport-derived address attached.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// Generate a fresh per-process fingerprint: 32 random bytes as lowercase hex.
pub fn generate_fingerprint() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Infer the device type from environment hints.
pub fn infer_device_type() -> DeviceType {
    if std::env::var("LANBEAM_SERVER").map(|v| v == "1").unwrap_or(false) {
        return DeviceType::Server;
    }
    if cfg!(target_os = "linux")
        && std::env::var("DISPLAY").is_err()
        && std::env::var("WAYLAND_DISPLAY").is_err()
    {
        return DeviceType::Headless;
    }
    DeviceType::Desktop
}

/// Default alias: the host name, or a generic label.
pub fn default_alias() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "LanBeam".to_string())
}

pub(crate) fn base_descriptor() -> DeviceInfo {
    DeviceInfo {
        alias: default_alias(),
        version: PROTOCOL_VERSION.to_string(),
        device_model: None,
        device_type: infer_device_type(),
        fingerprint: generate_fingerprint(),
        port: crate::DEFAULT_PORT,
        protocol: Protocol::Http,
        download: false,
        ip: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_64_hex_chars() {
        let fp = generate_fingerprint();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprints_are_unique_per_call() {
        assert_ne!(generate_fingerprint(), generate_fingerprint());
    }

    #[test]
    fn descriptor_serializes_protocol_fields() {
        let device = base_descriptor();
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["version"], "2.0");
        assert_eq!(json["port"], 53317);
        assert_eq!(json["protocol"], "http");
        assert!(json.get("ip").is_none());
    }

    #[test]
    fn device_type_round_trips_lowercase() {
        let json = serde_json::to_string(&DeviceType::Headless).unwrap();
        assert_eq!(json, "\"headless\"");
        let back: DeviceType = serde_json::from_str("\"mobile\"").unwrap();
        assert_eq!(back, DeviceType::Mobile);
    }
}
