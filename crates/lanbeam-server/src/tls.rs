//! Ephemeral TLS material for HTTPS serving.
//!
//! Certificate provisioning is out of scope for the protocol; a node
//! configured for HTTPS generates a self-signed certificate at startup
//! and peers on trusted LANs accept it via the insecure-TLS toggle.

use lanbeam_core::{Error, Result};

pub struct TlsMaterial {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generate a fresh self-signed certificate for this process.
pub fn self_signed() -> Result<TlsMaterial> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|err| Error::Internal(format!("certificate generation failed: {err}")))?;
    Ok(TlsMaterial {
        cert_pem: certified.cert.pem(),
        key_pem: certified.key_pair.serialize_pem(),
    })
}
