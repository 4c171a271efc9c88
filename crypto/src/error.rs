//! Error types for password hashing, signing, and envelope encryption.

use iamcore_core::error::{ErrorCode, HasErrorCode};
use thiserror::Error;

/// Errors raised by [`crate::password`], [`crate::signing`], and
/// [`crate::encryption`].
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Argon2 hashing failed (e.g. parameters rejected).
    #[error("password hashing failed: {0}")]
    HashingFailed(String),

    /// A password did not match its stored hash.
    #[error("password verification failed")]
    VerificationFailed,

    /// A stored password hash string could not be parsed.
    #[error("malformed password hash: {0}")]
    MalformedHash(String),

    /// Envelope encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Envelope decryption failed, or referenced an unknown key id.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// An HMAC signature did not match.
    #[error("signature verification failed")]
    SignatureMismatch,
}

impl HasErrorCode for CryptoError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::VerificationFailed | Self::SignatureMismatch => ErrorCode::PermissionDenied,
            Self::HashingFailed(_)
            | Self::MalformedHash(_)
            | Self::EncryptionFailed(_)
            | Self::DecryptionFailed(_) => ErrorCode::Internal,
        }
    }
}
