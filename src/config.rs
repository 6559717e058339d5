//! Password-derivation parameters.
//!
//! Defaults follow OWASP guidance for Argon2id and PBKDF2-HMAC-SHA256. The
//! parameters are not stored with each group: every process that opens a
//! group must be configured with the values the group was created under.

use serde::{Deserialize, Serialize};

use crate::error::VaultlinkError;

/// Cost parameters for the two password derivations of a visibility group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// PBKDF2-HMAC-SHA256 iterations for the password verifier (default: 600000).
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

fn default_argon2_memory_kib() -> u32 {
    65536
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_pbkdf2_iterations() -> u32 {
    600_000
}

impl VaultConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, VaultlinkError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| VaultlinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the derivations would refuse later.
    pub fn validate(&self) -> Result<(), VaultlinkError> {
        argon2::Params::new(
            self.argon2_memory_kib,
            self.argon2_iterations,
            self.argon2_parallelism,
            Some(crate::crypto::KEY_LEN),
        )
        .map_err(|e| VaultlinkError::Config(format!("Argon2id: {e}")))?;

        if self.pbkdf2_iterations == 0 {
            return Err(VaultlinkError::Config(
                "pbkdf2_iterations must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        VaultConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let cfg = VaultConfig::from_json(r#"{ "argon2_iterations": 5 }"#).unwrap();
        assert_eq!(cfg.argon2_iterations, 5);
        assert_eq!(cfg.argon2_memory_kib, 65536);
        assert_eq!(cfg.pbkdf2_iterations, 600_000);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            VaultConfig::from_json(r#"{ "pbkdf2_iterations": 0 }"#),
            Err(VaultlinkError::Config(_))
        ));
        assert!(matches!(
            VaultConfig::from_json(r#"{ "argon2_memory_kib": 1 }"#),
            Err(VaultlinkError::Config(_))
        ));
        assert!(VaultConfig::from_json("not json").is_err());
    }
}
