//! AES-256-GCM envelope encryption with a versioned key catalog.
//!
//! Ciphertext is tagged with the id of the key that produced it, so the
//! catalog's active key can rotate forward without invalidating data
//! encrypted under a previous key: decryption looks the key id up rather
//! than always using the currently active one.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;

/// An opaque, versioned AES-256 key.
pub type KeyId = u32;

/// Ciphertext plus the metadata needed to decrypt it: which key encrypted
/// it and the nonce used, both required alongside the key catalog itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    key_id: KeyId,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// The id of the key this envelope was encrypted under.
    #[must_use]
    pub const fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// Serialize to a single opaque string: `base64(key_id || nonce || ciphertext)`.
    #[must_use]
    pub fn to_encoded(&self) -> String {
        let mut buf = Vec::with_capacity(4 + NONCE_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.key_id.to_be_bytes());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        STANDARD.encode(buf)
    }

    /// Parse an envelope previously produced by [`Envelope::to_encoded`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if `encoded` is not valid
    /// base64 or too short to contain a key id and nonce.
    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let buf = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        if buf.len() < 4 + NONCE_LEN {
            return Err(CryptoError::DecryptionFailed("envelope too short".to_string()));
        }
        let key_id = KeyId::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[4..4 + NONCE_LEN]);
        let ciphertext = buf[4 + NONCE_LEN..].to_vec();
        Ok(Self { key_id, nonce, ciphertext })
    }
}

/// A catalog of AES-256-GCM keys keyed by id, with one designated as active
/// for new encryptions.
///
/// Built once at startup from configuration (see spec's `CryptoConfig`) and
/// held for the process lifetime; it is not itself persisted or rotated at
/// runtime.
pub struct KeyCatalog {
    keys: HashMap<KeyId, Aes256Gcm>,
    active_key_id: KeyId,
}

impl KeyCatalog {
    /// Build a catalog from `(key_id, 32-byte key)` pairs and the id of the
    /// key new encryptions should use.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if any key is not exactly
    /// 32 bytes, or if `active_key_id` is not among `keys`.
    pub fn new(keys: Vec<(KeyId, [u8; 32])>, active_key_id: KeyId) -> Result<Self, CryptoError> {
        let mut catalog = HashMap::with_capacity(keys.len());
        for (id, key) in keys {
            let cipher = Aes256Gcm::new_from_slice(&key)
                .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
            catalog.insert(id, cipher);
        }
        if !catalog.contains_key(&active_key_id) {
            return Err(CryptoError::EncryptionFailed(format!(
                "active_key_id {active_key_id} is not present in the key catalog"
            )));
        }
        Ok(Self { keys: catalog, active_key_id })
    }

    /// Encrypt `plaintext` under the catalog's currently active key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] on an AEAD failure.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope, CryptoError> {
        // active_key_id is validated to exist in `new`, so this lookup is infallible.
        let cipher = self.keys.get(&self.active_key_id).ok_or_else(|| {
            CryptoError::EncryptionFailed("active key id missing from catalog".to_string())
        })?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(Envelope { key_id: self.active_key_id, nonce: nonce_bytes, ciphertext })
    }

    /// Decrypt `envelope`, looking up the key it names rather than assuming
    /// the currently active one.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the envelope's key id is
    /// not in the catalog, or the ciphertext fails AEAD verification.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.keys.get(&envelope.key_id).ok_or_else(|| {
            CryptoError::DecryptionFailed(format!("unknown key id {}", envelope.key_id))
        })?;
        let nonce = Nonce::from_slice(&envelope.nonce);
        cipher
            .decrypt(nonce, envelope.ciphertext.as_ref())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> KeyCatalog {
        KeyCatalog::new(vec![(1, [1u8; 32]), (2, [2u8; 32])], 1).expect("valid catalog")
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let cat = catalog();
        let envelope = cat.encrypt(b"sensitive data").expect("encrypt");
        let plaintext = cat.decrypt(&envelope).expect("decrypt");
        assert_eq!(plaintext, b"sensitive data");
    }

    #[test]
    fn envelope_round_trips_through_encoding() {
        let cat = catalog();
        let envelope = cat.encrypt(b"sensitive data").expect("encrypt");
        let encoded = envelope.to_encoded();
        let decoded = Envelope::from_encoded(&encoded).expect("decode");
        let plaintext = cat.decrypt(&decoded).expect("decrypt");
        assert_eq!(plaintext, b"sensitive data");
    }

    #[test]
    fn decryption_uses_the_key_id_the_envelope_names() {
        let keys = vec![(1, [1u8; 32]), (2, [2u8; 32])];
        let encrypting_catalog = KeyCatalog::new(keys.clone(), 2).expect("valid catalog");
        let reading_catalog = KeyCatalog::new(keys, 1).expect("valid catalog");

        let envelope = encrypting_catalog.encrypt(b"payload").expect("encrypt");
        assert_eq!(envelope.key_id(), 2);

        // Even though the reading catalog's active key is 1, it can still
        // decrypt data encrypted under key 2 because it's still in its catalog.
        let plaintext = reading_catalog.decrypt(&envelope).expect("decrypt");
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn unknown_active_key_id_is_rejected() {
        let result = KeyCatalog::new(vec![(1, [1u8; 32])], 99);
        assert!(result.is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cat = catalog();
        let mut envelope = cat.encrypt(b"sensitive data").expect("encrypt");
        if let Some(byte) = envelope.ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        assert!(cat.decrypt(&envelope).is_err());
    }
}
