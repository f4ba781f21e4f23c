//! Desired-state hashing for change tracking.
//!
//! Each change request carries the hash of the desired template and
//! parameters it was built from, so an operator can tell which input a
//! change came from when several deploys race.

use sha2::{Digest, Sha256};

use super::spec::{FleetConfig, UnitConfig};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the whole fleet configuration.
    #[must_use]
    pub fn hash_config(&self, config: &FleetConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.project.name.as_bytes());
        hasher.update(config.project.environment.as_bytes());

        for unit in &config.units {
            hasher.update(self.hash_unit(config, unit).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the hash of one unit's desired state.
    ///
    /// Covers the resolved template location, parameters and tags, with
    /// maps sorted so the hash does not depend on iteration order.
    #[must_use]
    pub fn hash_unit(&self, config: &FleetConfig, unit: &UnitConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(unit.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(config.template_location(unit).as_bytes());

        let mut parameters: Vec<_> = unit.parameters.iter().collect();
        parameters.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in parameters {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([1u8]);
            hasher.update(value.as_bytes());
        }

        let mut tags: Vec<_> = unit.tags.iter().collect();
        tags.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in tags {
            hasher.update([2u8]);
            hasher.update(key.as_bytes());
            hasher.update([1u8]);
            hasher.update(value.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn config(size: &str) -> FleetConfig {
        let yaml = format!(
            "project:\n  name: shop\nengine:\n  endpoint: https://e\nunits:\n  - name: app\n    template: t1.yaml\n    parameters:\n      Size: \"{size}\"\n      Tier: web\n"
        );
        ConfigParser::with_env(|_| None).parse(&yaml, None).expect("config")
    }

    #[test]
    fn test_unit_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let a = config("1");
        let b = config("1");

        assert_eq!(
            hasher.hash_unit(&a, &a.units[0]),
            hasher.hash_unit(&b, &b.units[0])
        );
        assert_eq!(hasher.hash_config(&a), hasher.hash_config(&b));
    }

    #[test]
    fn test_parameter_change_changes_hash() {
        let hasher = ConfigHasher::new();
        let a = config("1");
        let b = config("2");

        assert_ne!(
            hasher.hash_unit(&a, &a.units[0]),
            hasher.hash_unit(&b, &b.units[0])
        );
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }
}
