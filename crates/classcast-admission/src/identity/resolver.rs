//! Derives a stable identity key for a connecting device.

use std::net::IpAddr;

use rand::RngExt;
use sha2::{Digest, Sha256};

use classcast_entity::device::IdentityKey;

/// Raw connection metadata an identity key is derived from.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMeta {
    /// Client-supplied device identifier, stable across sessions when
    /// present.
    pub device_id: Option<String>,
    /// User-Agent header value.
    pub user_agent: Option<String>,
    /// Source IP address.
    pub ip_address: Option<IpAddr>,
}

/// Pure resolver producing deterministic device identity keys.
///
/// A client-supplied device id is preferred; otherwise a fingerprint is
/// derived from a keyed hash over user-agent and IP so the key is stable
/// across reconnects but not guessable from public request metadata. With
/// no usable inputs at all the resolver falls back to a random per-request
/// key: the device is treated as always-new rather than being denied, a
/// deliberate fail-safe.
#[derive(Debug, Clone)]
pub struct DeviceIdentityResolver {
    /// Server-side secret mixed into derived fingerprints.
    fingerprint_key: String,
}

impl DeviceIdentityResolver {
    /// Creates a resolver with the given fingerprint secret.
    pub fn new(fingerprint_key: impl Into<String>) -> Self {
        Self {
            fingerprint_key: fingerprint_key.into(),
        }
    }

    /// Resolves connection metadata into an identity key. Never fails.
    pub fn resolve(&self, meta: &ConnectionMeta) -> IdentityKey {
        if let Some(device_id) = meta.device_id.as_deref() {
            let trimmed = device_id.trim();
            if !trimmed.is_empty() {
                return IdentityKey::new(format!("dev:{trimmed}"));
            }
        }

        if meta.user_agent.is_some() || meta.ip_address.is_some() {
            let mut hasher = Sha256::new();
            hasher.update(self.fingerprint_key.as_bytes());
            hasher.update(b"\x00");
            hasher.update(meta.user_agent.as_deref().unwrap_or("").as_bytes());
            hasher.update(b"\x00");
            if let Some(ip) = meta.ip_address {
                hasher.update(ip.to_string().as_bytes());
            }
            let digest = hasher.finalize();
            return IdentityKey::new(format!("fp:{}", &hex::encode(digest)[..32]));
        }

        // No inputs at all: random key scoped to this request.
        let mut bytes = [0u8; 16];
        rand::rng().fill(&mut bytes);
        IdentityKey::new(format!("anon:{}", hex::encode(bytes)))
    }
}
