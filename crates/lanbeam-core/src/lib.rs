//! LanBeam Core — node identity, configuration, shared error types.

pub mod config;
pub mod device;
pub mod error;

pub use config::{NodeConfig, NodeOptions};
pub use device::{generate_fingerprint, DeviceInfo, DeviceType, Protocol};
pub use error::{Error, Result};

/// Protocol version advertised in every descriptor.
pub const PROTOCOL_VERSION: &str = "2.0";
/// Standard LocalSend port (HTTP endpoint and multicast alike).
pub const DEFAULT_PORT: u16 = 53317;
/// Multicast group address.
pub const MULTICAST_GROUP: &str = "224.0.0.167";
/// Multicast port.
pub const MULTICAST_PORT: u16 = 53317;
