//! Error taxonomy for the licensing runtime.
//!
//! Every error a caller can observe from the public API is one of the
//! variants below. Network-class failures (status 0/408) are split out from
//! the general `Api` case because they alone drive the offline fallback
//! decision in the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type LicenseResult<T> = Result<T, LicenseError>;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    License(#[from] LicenseSemanticError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for LicenseError {
    fn from(e: std::io::Error) -> Self {
        LicenseError::Storage(e.to_string())
    }
}

impl From<keyring::Error> for LicenseError {
    fn from(e: keyring::Error) -> Self {
        LicenseError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for LicenseError {
    fn from(e: reqwest::Error) -> Self {
        LicenseError::Network(NetworkError {
            status: 0,
            message: e.to_string(),
        })
    }
}

/// A network-class failure: connection refused, DNS failure, timeout. Carries
/// the synthetic status code the HTTP adapter assigned (0 or 408).
#[derive(Debug, Clone, thiserror::Error)]
#[error("network error (status {status}): {message}")]
pub struct NetworkError {
    pub status: u16,
    pub message: String,
}

/// A structured error returned by the license server.
#[derive(Debug, Clone, thiserror::Error)]
#[error("api error {status} [{code}]: {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: ClientErrorCode,
    pub message: String,
    pub retryable: bool,
    pub body: String,
}

impl ApiError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, 401 | 403)
    }
}

/// License-semantic failures that bubble to the caller verbatim so
/// applications can switch on the code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LicenseSemanticError {
    #[error("no license is cached")]
    NoLicense,
    #[error("license is invalid: {0}")]
    InvalidLicense(String),
    #[error("license has expired")]
    Expired,
    #[error("license has been revoked")]
    Revoked,
    #[error("cached offline token does not match the current license")]
    LicenseMismatch,
}

/// Crypto/offline-verification failures. These never escape to the caller as
/// an `Err` from the offline path — `coordinator::offline` converts them into
/// a failed `ValidationResult` per spec. They're a real `LicenseError` variant
/// only when crypto is invoked directly (e.g. unit tests of `crypto`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("offline token signature is invalid")]
    SignatureInvalid,
    #[error("no public key available for the token's signing key id")]
    NoPublicKey,
    #[error("clock tamper detected; refusing offline verification")]
    ClockTamper,
    #[error("invalid public key")]
    InvalidKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

impl CryptoError {
    /// The machine-readable code used in a failed offline `ValidationResult`.
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::SignatureInvalid => "signature_invalid",
            CryptoError::NoPublicKey => "no_public_key",
            CryptoError::ClockTamper => "clock_tamper",
            CryptoError::InvalidKey => "invalid_key",
            CryptoError::InvalidSignature => "invalid_signature",
            CryptoError::VerificationFailed => "verification_failed",
            CryptoError::EncryptionFailed(_) => "encryption_failed",
            CryptoError::DecryptionFailed(_) => "decryption_failed",
        }
    }
}

/// Error codes returned by the license server API, mirrored client-side so
/// callers can switch on them without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorCode {
    LicenseNotFound,
    LicenseExpired,
    LicenseRevoked,
    LicenseSuspended,
    LicenseBlacklisted,
    LicenseInactive,
    SeatLimitExceeded,
    DeviceNotActivated,
    InvalidApiKey,
    AlreadyBound,
    NotBound,
    HardwareMismatch,
    InternalError,
    #[serde(other)]
    Unknown,
}

impl ClientErrorCode {
    /// Codes that indicate server-side revocation and should terminate the
    /// session per spec.md §4.7.3 step 4.
    pub fn is_revocation(&self) -> bool {
        matches!(
            self,
            ClientErrorCode::LicenseRevoked | ClientErrorCode::LicenseSuspended
        )
    }
}

impl fmt::Display for ClientErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revocation_codes() {
        assert!(ClientErrorCode::LicenseRevoked.is_revocation());
        assert!(ClientErrorCode::LicenseSuspended.is_revocation());
        assert!(!ClientErrorCode::LicenseExpired.is_revocation());
    }

    #[test]
    fn unknown_code_forward_compat() {
        let parsed: ClientErrorCode = serde_json::from_str("\"some_future_code\"").unwrap();
        assert_eq!(parsed, ClientErrorCode::Unknown);
    }

    #[test]
    fn auth_failure_detection() {
        let err = ApiError {
            status: 401,
            code: ClientErrorCode::InvalidApiKey,
            message: "bad key".into(),
            retryable: false,
            body: String::new(),
        };
        assert!(err.is_auth_failure());
    }
}
