//! Device admission configuration.

use serde::{Deserialize, Serialize};

/// Device admission and session registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Inactivity duration in hours after which a device session is
    /// considered stale and no longer counts toward capacity.
    #[serde(default = "default_staleness_ttl")]
    pub staleness_ttl_hours: u64,
    /// Smallest capacity a credential may be configured with.
    #[serde(default = "default_min_capacity")]
    pub min_capacity: u32,
    /// Largest capacity a credential may be configured with.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u32,
    /// Server-side secret mixed into derived device fingerprints so they
    /// cannot be guessed from public request metadata alone.
    #[serde(default = "default_fingerprint_key")]
    pub fingerprint_key: String,
    /// Whether admission fails open when the session registry is
    /// unreachable. Disabling this turns registry outages into hard
    /// admission failures.
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            staleness_ttl_hours: default_staleness_ttl(),
            min_capacity: default_min_capacity(),
            max_capacity: default_max_capacity(),
            fingerprint_key: default_fingerprint_key(),
            fail_open: default_true(),
        }
    }
}

impl AdmissionConfig {
    /// Validates that a requested credential capacity falls within bounds.
    pub fn capacity_in_bounds(&self, capacity: i32) -> bool {
        capacity >= self.min_capacity as i32 && capacity <= self.max_capacity as i32
    }
}

fn default_staleness_ttl() -> u64 {
    24
}

fn default_min_capacity() -> u32 {
    1
}

fn default_max_capacity() -> u32 {
    50
}

fn default_fingerprint_key() -> String {
    // Overridden in any real deployment via CLASSCAST__ADMISSION__FINGERPRINT_KEY.
    "classcast-dev-fingerprint-key".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bounds() {
        let config = AdmissionConfig::default();
        assert!(config.capacity_in_bounds(1));
        assert!(config.capacity_in_bounds(50));
        assert!(!config.capacity_in_bounds(0));
        assert!(!config.capacity_in_bounds(51));
    }
}
