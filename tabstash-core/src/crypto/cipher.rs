//! AES-256-GCM field encryption.
//!
//! Every encrypted field is stored as
//! `enc:` + base64(`nonce(12) || ciphertext || auth_tag(16)`).
//!
//! Values without the `enc:` tag are treated as legacy plaintext written
//! before encryption was introduced and are returned unchanged on decrypt.

use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use zeroize::Zeroize;

/// Tag prepended to every encrypted field.
pub const ENCRYPTED_PREFIX: &str = "enc:";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A per-user symmetric key used to encrypt individual fields.
///
/// Derived deterministically from the server-held secret and the user id,
/// so it is never transmitted. Zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    /// Create a key from raw bytes (use with caution)
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Export the key material for the local cache.
    pub fn export(&self) -> String {
        STANDARD.encode(self.key)
    }

    /// Import key material previously produced by [`EncryptionKey::export`].
    pub fn import(exported: &str) -> Result<Self> {
        let mut bytes = STANDARD
            .decode(exported)
            .map_err(|e| CryptoError::MalformedCiphertext(format!("Invalid key export: {}", e)))?;

        if bytes.len() != 32 {
            let got = bytes.len();
            bytes.zeroize();
            return Err(CryptoError::InvalidKeyLength { expected: 32, got });
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Whether a stored value carries the encryption tag.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Encrypt a single string field.
///
/// A fresh random nonce is generated for every call, so encrypting the same
/// plaintext twice yields different outputs. Empty strings are valid input.
pub fn encrypt_field(plaintext: &str, key: &EncryptionKey) -> Result<String> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    // aes-gcm appends the tag to the ciphertext
    let ciphertext_with_tag = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(format!("Field encryption failed: {}", e)))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext_with_tag);

    Ok(format!("{}{}", ENCRYPTED_PREFIX, STANDARD.encode(blob)))
}

/// Decrypt a single string field.
///
/// Untagged values are legacy plaintext and come back unchanged. A tagged
/// value that fails to decode or authenticate is an error; callers decide
/// whether to drop just that field.
pub fn decrypt_field(value: &str, key: &EncryptionKey) -> Result<String> {
    let Some(encoded) = value.strip_prefix(ENCRYPTED_PREFIX) else {
        return Ok(value.to_string());
    };

    let blob = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::MalformedCiphertext(format!("Invalid base64: {}", e)))?;

    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::MalformedCiphertext(
            "Ciphertext too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext_with_tag) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext_with_tag)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::DecryptionFailed("Invalid UTF-8".to_string()))
}

/// Encrypt a nullable field; `None` passes through.
pub fn encrypt_optional(plaintext: Option<&str>, key: &EncryptionKey) -> Result<Option<String>> {
    plaintext.map(|p| encrypt_field(p, key)).transpose()
}

/// Decrypt a nullable field; `None` passes through.
pub fn decrypt_optional(value: Option<&str>, key: &EncryptionKey) -> Result<Option<String>> {
    value.map(|v| decrypt_field(v, key)).transpose()
}
