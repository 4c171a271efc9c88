//! HMAC-SHA256 signing for bearer tokens and webhook payloads.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies messages with a shared HMAC-SHA256 secret.
///
/// Intended for opaque bearer tokens and signed webhook deliveries: the
/// secret never leaves the process, so a signature only proves the message
/// was produced by something holding it.
pub struct Signer {
    secret: Vec<u8>,
}

impl Signer {
    /// Construct a signer over a raw secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Compute a URL-safe base64 signature over `message`.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(message);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Verify that `signature` is the correct HMAC over `message`, using a
    /// constant-time comparison to avoid timing side channels.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureMismatch`] if the signature is
    /// malformed or does not match.
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<(), CryptoError> {
        let provided =
            URL_SAFE_NO_PAD.decode(signature).map_err(|_| CryptoError::SignatureMismatch)?;
        let mut mac = self.mac();
        mac.update(message);
        mac.verify_slice(&provided).map_err(|_| CryptoError::SignatureMismatch)
    }

    #[allow(clippy::expect_used)]
    fn mac(&self) -> HmacSha256 {
        // HMAC-SHA256 accepts keys of any length, so this never fails.
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = Signer::new("top-secret");
        let sig = signer.sign(b"hello world");
        signer.verify(b"hello world", &sig).expect("verify");
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer = Signer::new("top-secret");
        let sig = signer.sign(b"hello world");
        assert!(signer.verify(b"hello mundo", &sig).is_err());
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let a = Signer::new("secret-a").sign(b"payload");
        let b = Signer::new("secret-b").sign(b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_signature_is_rejected() {
        let signer = Signer::new("top-secret");
        assert!(signer.verify(b"hello world", "not-base64!!!").is_err());
    }
}
