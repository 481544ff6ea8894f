//! Field encryption codec
//!
//! Sensitive free-text fields are encrypted with AES-256-CBC before they
//! reach the backing store. The key ties each ciphertext to the process-wide
//! secret and to one user:
//!
//! ```text
//! user_key  = hex(SHA-256(user_id ‖ secret ‖ "user-salt"))
//! aes_key   = SHA-256(secret ‖ user_key)
//! blob      = base64(IV ‖ AES-256-CBC-PKCS7(aes_key, IV, plaintext))
//! ```
//!
//! The codec is stateless apart from the secret and knows nothing about
//! tenants.

use crate::errors::{AppError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// IV length, fixed by the AES block size
pub const IV_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

/// Domain separation tag mixed into user key derivation
const USER_KEY_TAG: &str = "user-salt";

/// Per-user derived key (hex encoded)
#[derive(Clone, PartialEq, Eq)]
pub struct UserKey(String);

impl UserKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserKey(..)")
    }
}

/// Symmetric codec for at-rest fields
#[derive(Clone)]
pub struct FieldCodec {
    secret: String,
}

impl fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCodec").finish_non_exhaustive()
    }
}

impl FieldCodec {
    /// Create a codec over the process-wide secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Derive the key of one user. Pure: same id, same secret, same key.
    pub fn derive_user_key(&self, user_id: &str) -> UserKey {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(self.secret.as_bytes());
        hasher.update(USER_KEY_TAG.as_bytes());
        UserKey(hex::encode(hasher.finalize()))
    }

    fn cipher_key(&self, key: &UserKey) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(key.0.as_bytes());
        hasher.finalize().into()
    }

    /// Encrypt `plaintext` under a fresh random IV
    pub fn encrypt(&self, plaintext: &str, key: &UserKey) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        OsRng.try_fill_bytes(&mut iv).map_err(|e| {
            tracing::error!(error = %e, "Failed to draw IV from OS RNG");
            AppError::EncryptionFailed {
                message: "random source unavailable".to_string(),
            }
        })?;

        let cipher_key = self.cipher_key(key);
        let ciphertext = Aes256CbcEnc::new(&cipher_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`FieldCodec::encrypt`]
    ///
    /// Fails with `DecryptionFailed` on malformed input, a wrong key or a
    /// result that is not valid UTF-8. Never returns garbage as success.
    pub fn decrypt(&self, blob: &str, key: &UserKey) -> Result<String> {
        let raw = STANDARD.decode(blob.trim()).map_err(|_| decryption_failed("malformed base64"))?;

        if raw.len() < IV_LEN + BLOCK_LEN {
            return Err(decryption_failed("ciphertext too short"));
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(decryption_failed("ciphertext not block aligned"));
        }

        let mut iv_block = [0u8; IV_LEN];
        iv_block.copy_from_slice(iv);
        let cipher_key = self.cipher_key(key);
        let plaintext = Aes256CbcDec::new(&cipher_key.into(), &iv_block.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| decryption_failed("invalid padding (wrong key or corrupted data)"))?;

        String::from_utf8(plaintext).map_err(|_| decryption_failed("plaintext is not valid UTF-8"))
    }

    /// Integrity probe: whether `blob` decrypts under `key`
    pub fn validate(&self, blob: &str, key: &UserKey) -> bool {
        self.decrypt(blob, key).is_ok()
    }
}

fn decryption_failed(reason: &str) -> AppError {
    AppError::DecryptionFailed {
        reason: reason.to_string(),
    }
}

/// Random token of `len` bytes, base64 encoded
pub fn generate_secure_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Argon2id hash of `password`, salted deterministically from `salt`
/// (a user id or email)
pub fn hash_password(password: &str, salt: &str) -> Result<String> {
    let digest = Sha256::digest(salt.as_bytes());
    let salt = SaltString::encode_b64(&digest[..16]).map_err(|e| AppError::Internal {
        message: format!("invalid password salt: {}", e),
    })?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("password hashing failed: {}", e),
        })
}

/// Verify `password` against a PHC hash from [`hash_password`]
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| AppError::InvalidFormat {
        message: format!("invalid hash format: {}", e),
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal {
            message: format!("verify error: {}", e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-prod";

    fn codec() -> FieldCodec {
        FieldCodec::new(SECRET)
    }

    #[test]
    fn test_derive_user_key_is_pure() {
        let codec = codec();
        let a = codec.derive_user_key("user-1");
        let b = codec.derive_user_key("user-1");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, codec.derive_user_key("user-2"));
        assert_ne!(a, FieldCodec::new("other-secret").derive_user_key("user-1"));
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let key = codec.derive_user_key("user-1");
        let long = "x".repeat(1000);
        for plaintext in [
            "",
            "a",
            "exactly sixteen!",
            "sk-live-0123456789abcdef",
            "çok gizli not: şifre = ğüşöç 🔐",
            long.as_str(),
        ] {
            let blob = codec.encrypt(plaintext, &key).unwrap();
            assert_eq!(codec.decrypt(&blob, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let codec = codec();
        let key = codec.derive_user_key("user-1");
        let a = codec.encrypt("same text", &key).unwrap();
        let b = codec.encrypt("same text", &key).unwrap();
        assert_ne!(a, b);

        let raw_a = STANDARD.decode(&a).unwrap();
        let raw_b = STANDARD.decode(&b).unwrap();
        assert_ne!(raw_a[..IV_LEN], raw_b[..IV_LEN]);
    }

    #[test]
    fn test_blob_layout() {
        let codec = codec();
        let key = codec.derive_user_key("user-1");
        let blob = codec.encrypt("hello", &key).unwrap();
        let raw = STANDARD.decode(blob).unwrap();
        // 16-byte IV followed by one padded block
        assert_eq!(raw.len(), IV_LEN + BLOCK_LEN);
    }

    #[test]
    fn test_wrong_key_fails() {
        let codec = codec();
        let right = codec.derive_user_key("user-1");
        let wrong = codec.derive_user_key("user-2");
        let blob = codec
            .encrypt("a longer secret note spanning several AES blocks of text", &right)
            .unwrap();

        assert!(matches!(
            codec.decrypt(&blob, &wrong),
            Err(AppError::DecryptionFailed { .. })
        ));
        assert!(!codec.validate(&blob, &wrong));
        assert!(codec.validate(&blob, &right));
    }

    #[test]
    fn test_rotated_secret_fails() {
        let key_before = codec().derive_user_key("user-1");
        let blob = codec().encrypt("api key material", &key_before).unwrap();

        let rotated = FieldCodec::new("rotated-secret-rotated-secret-rotated");
        let key_after = rotated.derive_user_key("user-1");
        assert!(!rotated.validate(&blob, &key_after));
    }

    #[test]
    fn test_malformed_blobs() {
        let codec = codec();
        let key = codec.derive_user_key("user-1");

        assert!(codec.decrypt("not base64!!", &key).is_err());
        assert!(codec.decrypt(&STANDARD.encode([0u8; 8]), &key).is_err());
        assert!(codec.decrypt(&STANDARD.encode([0u8; IV_LEN + 5]), &key).is_err());
        assert!(!codec.validate("", &key));
    }

    #[test]
    fn test_secure_token() {
        let a = generate_secure_token(32);
        let b = generate_secure_token(32);
        assert_ne!(a, b);
        assert_eq!(STANDARD.decode(&a).unwrap().len(), 32);
    }

    #[test]
    fn test_hash_password() {
        let hash = hash_password("hunter2", "user@example.com").unwrap();
        assert_eq!(hash, hash_password("hunter2", "user@example.com").unwrap());
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
        assert!(verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn test_debug_hides_material() {
        let codec = codec();
        let key = codec.derive_user_key("user-1");
        assert!(!format!("{:?}", codec).contains(SECRET));
        assert!(!format!("{:?}", key).contains(key.as_str()));
    }
}
