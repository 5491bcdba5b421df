//! HKDF-SHA256 derivation of per-user field encryption keys.
//!
//! The key is a pure function of the server-held secret and the user id,
//! so a user signing in on a new device re-derives the same key without
//! any key exchange. The key itself never leaves the device.

use crate::crypto::{cipher::EncryptionKey, CryptoError, Result};
use hkdf::Hkdf;
use sha2::Sha256;

/// Fixed salt binding derived keys to this application and key version.
pub const KEY_DERIVATION_SALT: &[u8] = b"tabstash-field-key-v1";

/// Derive the 256-bit field encryption key for `user_id`.
///
/// The secret is the input keying material; the user id is the HKDF info
/// (context) string.
pub fn derive_user_key(secret: &[u8], user_id: &str) -> Result<EncryptionKey> {
    if secret.is_empty() {
        return Err(CryptoError::KdfFailed("Derivation secret is empty".to_string()));
    }
    if user_id.is_empty() {
        return Err(CryptoError::KdfFailed("User id is empty".to_string()));
    }

    let hkdf = Hkdf::<Sha256>::new(Some(KEY_DERIVATION_SALT), secret);
    let mut key = [0u8; 32];
    hkdf.expand(user_id.as_bytes(), &mut key)
        .map_err(|e| CryptoError::KdfFailed(format!("HKDF expand failed: {}", e)))?;

    Ok(EncryptionKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key1 = derive_user_key(b"server-secret", "user-1").unwrap();
        let key2 = derive_user_key(b"server-secret", "user-1").unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn different_users_get_different_keys() {
        let key1 = derive_user_key(b"server-secret", "user-1").unwrap();
        let key2 = derive_user_key(b"server-secret", "user-2").unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn different_secrets_get_different_keys() {
        let key1 = derive_user_key(b"secret-a", "user-1").unwrap();
        let key2 = derive_user_key(b"secret-b", "user-1").unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn empty_inputs_rejected() {
        assert!(derive_user_key(b"", "user-1").is_err());
        assert!(derive_user_key(b"secret", "").is_err());
    }
}
