//! At-rest encryption for the License Cache's persisted snapshot.
//!
//! AES-256-GCM, layered as defense-in-depth *underneath* Ed25519 signature
//! verification (crate::crypto) rather than in place of it: even if this
//! layer's key were somehow recovered, tampered offline tokens still fail
//! the signature check in `crate::crypto::verify`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use rand::rngs::OsRng;
use rand::TryRngCore;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use sha2::{Digest, Sha256};

use crate::errors::{CryptoError, LicenseError, LicenseResult};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Derive the cache's at-rest encryption key from the configured storage
/// prefix. Deterministic by design: the key must be re-derivable on process
/// restart without its own persistence step rather than generated once and
/// persisted alongside the data it protects.
pub fn derive_key_from_prefix(storage_prefix: &str) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(b"licenseseat_cache_key_v1:");
    hasher.update(storage_prefix.as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    key
}

/// Generate a new random 256-bit key. Exposed for callers that want a
/// random rather than derived key (e.g. tests).
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    let mut rng = OsRng;
    rng.try_fill_bytes(&mut key)
        .expect("OsRng failed to generate encryption key");
    key
}

/// Encrypt arbitrary bytes using AES-256-GCM.
///
/// Output format: `[nonce (12 bytes)] || [ciphertext+tag]`.
pub fn encrypt_bytes(plaintext: &[u8], key: &[u8]) -> LicenseResult<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(LicenseError::Crypto(CryptoError::EncryptionFailed(
            format!("invalid key length: expected {KEY_SIZE} bytes, got {}", key.len()),
        )));
    }

    let key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    let mut rng = OsRng;
    rng.try_fill_bytes(&mut nonce_bytes)
        .expect("OsRng failed to generate nonce");
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| LicenseError::Crypto(CryptoError::EncryptionFailed(e.to_string())))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut ciphertext);

    Ok(output)
}

/// Decrypt bytes produced by `encrypt_bytes`.
pub fn decrypt_bytes(ciphertext: &[u8], key: &[u8]) -> LicenseResult<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(LicenseError::Crypto(CryptoError::DecryptionFailed(
            format!("invalid key length: expected {KEY_SIZE} bytes, got {}", key.len()),
        )));
    }

    if ciphertext.len() <= NONCE_SIZE {
        return Err(LicenseError::Crypto(CryptoError::DecryptionFailed(
            "ciphertext too short".to_string(),
        )));
    }

    let (nonce_bytes, ct) = ciphertext.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(key);

    cipher
        .decrypt(nonce, ct)
        .map_err(|e| LicenseError::Crypto(CryptoError::DecryptionFailed(e.to_string())))
}

/// Encrypt bytes and return a base64 string, for embedding in JSON envelopes.
pub fn encrypt_to_base64(plaintext: &[u8], key: &[u8]) -> LicenseResult<String> {
    let encrypted = encrypt_bytes(plaintext, key)?;
    Ok(B64.encode(encrypted))
}

/// Decrypt a base64 ciphertext previously produced by `encrypt_to_base64`.
pub fn decrypt_from_base64(ciphertext_b64: &str, key: &[u8]) -> LicenseResult<Vec<u8>> {
    let decoded = B64.decode(ciphertext_b64).map_err(|e| {
        LicenseError::Crypto(CryptoError::DecryptionFailed(format!(
            "base64 decode failed: {e}"
        )))
    })?;
    decrypt_bytes(&decoded, key)
}
