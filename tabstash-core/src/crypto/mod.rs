//! Cryptographic primitives for end-to-end encrypted sync.
//!
//! This module provides:
//! - HKDF-SHA256 per-user key derivation
//! - AES-256-GCM field encryption with an `enc:` tag
//! - A key manager that caches derived keys per user

pub mod cipher;
pub mod kdf;
pub mod keyring;

pub use cipher::{
    decrypt_field, decrypt_optional, encrypt_field, encrypt_optional, is_encrypted,
    EncryptionKey, ENCRYPTED_PREFIX,
};
pub use kdf::derive_user_key;
pub use keyring::KeyManager;

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Authentication failed - data may have been tampered with")]
    AuthenticationFailed,
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
/// Alias for Result used by callers outside this module
pub type CryptoResult<T> = Result<T>;
