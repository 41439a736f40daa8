//! Crypto Verifier (spec.md §4.1).
//!
//! Verifies an Ed25519 signature over a server-provided canonical byte
//! string. Deliberately does not re-serialize any payload — the caller
//! hands us exactly the bytes the server signed (`OfflineToken::canonical`),
//! which sidesteps cross-language JSON-canonicalization hazards entirely.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::signature::{UnparsedPublicKey, ED25519};

use crate::errors::CryptoError;

const PUBLIC_KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// Verify `signature_base64url` over `message_bytes` using `public_key_bytes`.
///
/// Accepts base64url with or without padding. Returns a strict boolean on
/// any structurally valid input; returns `Err` only for malformed key or
/// signature encodings so callers can distinguish "this token's crypto is
/// unusable" from "the signature check genuinely failed".
pub fn verify(
    public_key_bytes: &[u8],
    signature_base64url: &str,
    message_bytes: &[u8],
) -> Result<bool, CryptoError> {
    if public_key_bytes.len() != PUBLIC_KEY_LEN {
        return Err(CryptoError::InvalidKey);
    }

    let signature_bytes = decode_base64url(signature_base64url)?;
    if signature_bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignature);
    }

    let public_key = UnparsedPublicKey::new(&ED25519, public_key_bytes);
    match public_key.verify(message_bytes, &signature_bytes) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Decode base64url, tolerating missing `=` padding (servers commonly omit
/// it for URL-safe tokens).
fn decode_base64url(input: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Constant-time byte-slice comparison, for any future comparison of
/// secrets. Not used by `verify` itself (ring's `verify` is already
/// constant-time), but exposed per spec.md §4.1.
pub fn constant_time_equals(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
