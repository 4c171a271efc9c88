//! Argon2id password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use iamcore_core::config::CryptoConfig;

use crate::error::CryptoError;

/// Hashes and verifies passwords with Argon2id, using cost parameters drawn
/// from [`CryptoConfig`] rather than the library's built-in defaults, so an
/// operator can tune memory/iteration cost without a code change.
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Build a hasher from the configured Argon2 cost parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HashingFailed`] if `config` describes
    /// parameters Argon2 rejects (e.g. zero parallelism).
    pub fn new(config: CryptoConfig) -> Result<Self, CryptoError> {
        let params = Params::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| CryptoError::HashingFailed(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `password`, returning a self-describing PHC string that encodes
    /// the salt and cost parameters used, suitable for storage and later
    /// verification without separately persisting those parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HashingFailed`] if hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::HashingFailed(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify `password` against a previously stored PHC hash string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedHash`] if `hash` is not a valid PHC
    /// string, or [`CryptoError::VerificationFailed`] if the password does
    /// not match.
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), CryptoError> {
        let parsed = PasswordHash::new(hash).map_err(|e| CryptoError::MalformedHash(e.to_string()))?;
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    /// Whether a stored hash was produced with different cost parameters
    /// than this hasher is currently configured with, and should be
    /// rehashed the next time the plaintext password is available (e.g.
    /// right after a successful login).
    #[must_use]
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };
        let Ok(params) = Params::try_from(&parsed) else {
            return true;
        };
        let current = self.argon2.params();
        params.m_cost() != current.m_cost()
            || params.t_cost() != current.t_cost()
            || params.p_cost() != current.p_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(CryptoConfig {
            argon2_memory_kib: 8192,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            active_key_id: 1,
        })
        .expect("valid params")
    }

    #[test]
    fn hash_then_verify_round_trips() {
        let h = hasher();
        let hash = h.hash("correct horse battery staple").expect("hash");
        h.verify("correct horse battery staple", &hash).expect("verify");
    }

    #[test]
    fn wrong_password_is_rejected() {
        let h = hasher();
        let hash = h.hash("correct horse battery staple").expect("hash");
        assert!(matches!(
            h.verify("wrong password", &hash),
            Err(CryptoError::VerificationFailed)
        ));
    }

    #[test]
    fn malformed_hash_is_rejected() {
        let h = hasher();
        assert!(matches!(
            h.verify("anything", "not-a-valid-phc-string"),
            Err(CryptoError::MalformedHash(_))
        ));
    }

    #[test]
    fn two_hashes_of_the_same_password_differ_by_salt() {
        let h = hasher();
        let a = h.hash("same password").expect("hash");
        let b = h.hash("same password").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_with_current_params_does_not_need_rehash() {
        let h = hasher();
        let hash = h.hash("same password").expect("hash");
        assert!(!h.needs_rehash(&hash));
    }

    #[test]
    fn hash_with_stale_params_needs_rehash() {
        let old = hasher();
        let hash = old.hash("same password").expect("hash");

        let new = PasswordHasher::new(CryptoConfig {
            argon2_memory_kib: 19_456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            active_key_id: 1,
        })
        .expect("valid params");
        assert!(new.needs_rehash(&hash));
    }
}
