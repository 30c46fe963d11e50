//! Argon2id implementation of the hashing capability.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use super::traits::SecretHasher;

/// Argon2id hasher with configurable cost parameters.
///
/// The same hasher covers passwords, OTP codes and refresh-token secrets;
/// the PHC string output embeds salt and parameters, so verification needs
/// no configuration.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Default parameters (argon2 crate defaults: 19 MiB, 2 iterations).
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Custom cost parameters. `m_cost` is in KiB.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| anyhow!("invalid argon2 params: {}", e))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow!("hashing failed: {}", e))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash("482913").unwrap();

        assert!(hasher.verify("482913", &hash));
        assert!(!hasher.verify("482914", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = Argon2Hasher::new();
        let a = hasher.hash("secret").unwrap();
        let b = hasher.hash("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        let hasher = Argon2Hasher::new();
        assert!(!hasher.verify("secret", "not-a-phc-string"));
    }
}
