//! Peer-facing HTTP client.
//!
//! One client instance per node, built from the node configuration. Every
//! operation targets a peer's `(ip, port, protocol)` triple and uses its
//! own timeout; discovery probes are short, upload chunks generous.

mod client;

pub use client::{chunk_ranges, ClientError, PeerClient, SendProgress};
