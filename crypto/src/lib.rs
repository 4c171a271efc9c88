//! Cryptographic primitives for the IAM backend: password hashing, secret
//! signing, envelope encryption, and time-ordered ID generation.
//!
//! None of these types read configuration themselves; they are constructed
//! once at process startup from [`iamcore_core::config::CryptoConfig`] /
//! [`iamcore_core::config::IdGeneratorConfig`] and then shared (typically
//! behind an `Arc`) for the process lifetime.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod encryption;
mod error;
mod password;
mod signing;
mod snowflake;

pub use encryption::{Envelope, KeyCatalog, KeyId};
pub use error::CryptoError;
pub use password::PasswordHasher;
pub use signing::Signer;
pub use snowflake::Snowflake;
