//! Node configuration assembled once at startup.

use std::path::PathBuf;
use std::time::Duration;

use crate::device::{self, DeviceInfo, DeviceType, Protocol};
use crate::error::{Error, Result};

/// Caller-supplied options; everything is optional and defaulted.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub alias: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub enable_download_api: bool,
    pub device_type: Option<DeviceType>,
    pub save_dir: Option<PathBuf>,
    pub pin: Option<String>,
}

/// Resolved node configuration. Environment toggles are read exactly once
/// here; nothing else consults the environment at runtime.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub device: DeviceInfo,
    pub save_dir: PathBuf,
    pub pin: Option<String>,
    /// Tolerate self-signed peer certificates (LOCALSEND_INSECURE_TLS).
    pub insecure_tls: bool,
    /// Verbose discovery tracing (LOCALSEND_DEBUG_DISCOVERY).
    pub debug_discovery: bool,
    pub scan_interval: Duration,
    pub scan_concurrency: usize,
    pub session_idle_ttl: Duration,
    pub upload_body_limit: u64,
    pub chunk_threshold: u64,
    pub chunk_size: u64,
}

impl NodeConfig {
    pub fn from_options(options: NodeOptions) -> Result<Self> {
        if options.port == Some(0) {
            return Err(Error::InvalidConfig("port must be in 1..=65535".into()));
        }

        let mut device = device::base_descriptor();
        if let Some(alias) = options.alias {
            device.alias = alias;
        }
        if let Some(port) = options.port {
            device.port = port;
        }
        if let Some(protocol) = options.protocol {
            device.protocol = protocol;
        }
        if let Some(device_type) = options.device_type {
            device.device_type = device_type;
        }
        device.download = options.enable_download_api;

        Ok(Self {
            device,
            save_dir: options
                .save_dir
                .unwrap_or_else(|| PathBuf::from("./received_files")),
            pin: options.pin,
            insecure_tls: env_flag("LOCALSEND_INSECURE_TLS", true),
            debug_discovery: env_flag("LOCALSEND_DEBUG_DISCOVERY", false),
            scan_interval: Duration::from_secs(30),
            scan_concurrency: 50,
            session_idle_ttl: Duration::from_secs(600),
            upload_body_limit: 5 * 1024 * 1024 * 1024,
            chunk_threshold: 50 * 1024 * 1024,
            chunk_size: 10 * 1024 * 1024,
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => value == "1",
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_conventions() {
        let config = NodeConfig::from_options(NodeOptions::default()).unwrap();
        assert_eq!(config.device.port, 53317);
        assert_eq!(config.device.protocol, Protocol::Http);
        assert!(!config.device.download);
        assert_eq!(config.save_dir, PathBuf::from("./received_files"));
        assert_eq!(config.scan_concurrency, 50);
        assert_eq!(config.session_idle_ttl, Duration::from_secs(600));
        assert_eq!(config.chunk_threshold, 50 * 1024 * 1024);
        assert_eq!(config.chunk_size, 10 * 1024 * 1024);
    }

    #[test]
    fn port_zero_is_rejected() {
        let err = NodeConfig::from_options(NodeOptions {
            port: Some(0),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn explicit_options_override_defaults() {
        let config = NodeConfig::from_options(NodeOptions {
            alias: Some("Workbench".into()),
            port: Some(40404),
            protocol: Some(Protocol::Https),
            enable_download_api: true,
            device_type: Some(DeviceType::Server),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.device.alias, "Workbench");
        assert_eq!(config.device.port, 40404);
        assert_eq!(config.device.protocol, Protocol::Https);
        assert!(config.device.download);
        assert_eq!(config.device.device_type, DeviceType::Server);
    }
}
