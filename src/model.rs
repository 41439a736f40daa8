//! Core data model (spec.md §3).
//!
//! The Cache (`crate::cache`) exclusively owns these types; the Coordinator
//! is the only mutator. Application code only ever sees defensive copies
//! handed back by `Coordinator` accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a license as tracked server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseState {
    Active,
    Expired,
    Suspended,
    Revoked,
    Unknown,
}

/// A feature grant carried by a license.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entitlement {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Entitlement {
    /// An entitlement is active iff it has no expiry, or its expiry is still
    /// in the future relative to `now`. Does not itself know whether the
    /// owning license is valid — callers combine this with license state.
    pub fn is_unexpired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => exp > now,
            None => true,
        }
    }
}

/// Identity of a seat-bound license grant. Owned by the Cache; mutated only
/// by the Coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub key: String,
    pub product_slug: String,
    pub device_id: String,
    pub status: LicenseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_limit: Option<u32>,
    pub active_seats: u32,
    pub active_entitlements: Vec<Entitlement>,
    pub activated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validation_result: Option<ValidationResult>,
}

impl License {
    /// The *license-valid* predicate used throughout §4.7: true iff the
    /// server (or the offline token) last reported the license as active.
    pub fn is_valid(&self) -> bool {
        self.status == LicenseState::Active
    }
}

/// Detached Ed25519 signature block accompanying an offline token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub algorithm: String,
    pub key_id: String,
    pub value: String,
}

/// An offline entitlement as carried inside a signed token (mirrors
/// `Entitlement` but deserialized independently since the token's JSON shape
/// is server-defined and may drift from the cache's internal shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineEntitlement {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl From<OfflineEntitlement> for Entitlement {
    fn from(e: OfflineEntitlement) -> Self {
        Entitlement {
            key: e.key,
            expires_at: e.expires_at,
            metadata: e.metadata,
        }
    }
}

/// Signed, self-contained validity proof (spec.md §3 "OfflineToken").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineToken {
    pub schema_version: u32,
    pub license_key: String,
    pub product_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_key: Option<String>,
    pub device_id: String,
    pub iat: DateTime<Utc>,
    pub nbf: DateTime<Utc>,
    pub exp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_expires_at: Option<DateTime<Utc>>,
    pub kid: String,
    pub entitlements: Vec<OfflineEntitlement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub signature: SignatureBlock,
    /// The exact byte sequence the server signed. Consumed unmodified by
    /// the Crypto Verifier — never re-derived from the struct above.
    pub canonical: String,
}

impl OfflineToken {
    pub fn is_within_validity_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.nbf && now <= self.exp
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.iat).num_seconds()
    }

    pub fn entitlements_as_of(&self, now: DateTime<Utc>) -> Vec<Entitlement> {
        self.entitlements
            .iter()
            .cloned()
            .map(Entitlement::from)
            .filter(|e| e.is_unexpired(now))
            .collect()
    }
}

/// A 32-byte Ed25519 public key, keyed by `kid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    pub key_id: String,
    pub algorithm: String,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Outcome of an activation or validation call, as returned to the caller
/// and stored (without the `license`/`activation` back-reference cycle the
/// source representation had — only the latest result is kept, keyed by
/// license key, inside the Cache; see SPEC_FULL.md's "Cycles and
/// back-references" note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub offline: bool,
    #[serde(default)]
    pub optimistic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_entitlements: Option<Vec<Entitlement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl ValidationResult {
    pub fn failed(code: impl Into<String>, message: impl Into<String>, offline: bool) -> Self {
        Self {
            valid: false,
            code: Some(code.into()),
            message: Some(message.into()),
            offline,
            optimistic: false,
            license: None,
            activation: None,
            active_entitlements: None,
            warnings: None,
        }
    }
}

/// Server-side activation record acknowledged back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationInfo {
    pub activation_id: String,
    pub activated_at: DateTime<Utc>,
}

/// Derived view of the current license state. Never persisted; computed on
/// demand by `Coordinator::get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatusType {
    Inactive,
    Pending,
    Active,
    Invalid,
    OfflineValid,
    OfflineInvalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseStatus {
    pub status: LicenseStatusType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LicenseStatus {
    pub fn new(status: LicenseStatusType, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Reason an entitlement check did not resolve to `active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementReason {
    NoLicense,
    NotFound,
    Expired,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementCheck {
    pub active: bool,
    pub reason: EntitlementReason,
}

impl EntitlementCheck {
    pub fn new(reason: EntitlementReason) -> Self {
        Self {
            active: reason == EntitlementReason::Active,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn entitlement_expiry_round_trip() {
        let now = Utc::now();
        let future = Entitlement {
            key: "pro".into(),
            expires_at: Some(now + Duration::seconds(10)),
            metadata: None,
        };
        let past = Entitlement {
            key: "pro".into(),
            expires_at: Some(now - Duration::seconds(1)),
            metadata: None,
        };
        let forever = Entitlement {
            key: "pro".into(),
            expires_at: None,
            metadata: None,
        };

        assert!(future.is_unexpired(now));
        assert!(!past.is_unexpired(now));
        assert!(forever.is_unexpired(now));
    }

    #[test]
    fn offline_token_validity_window() {
        let now = Utc::now();
        let token = sample_token(now);
        assert!(token.is_within_validity_window(now));
        assert!(!token.is_within_validity_window(now - Duration::days(2)));
        assert!(!token.is_within_validity_window(now + Duration::days(31)));
    }

    fn sample_token(now: DateTime<Utc>) -> OfflineToken {
        OfflineToken {
            schema_version: 1,
            license_key: "LIC-1".into(),
            product_slug: "acme".into(),
            plan_key: None,
            device_id: "dev-1".into(),
            iat: now,
            nbf: now,
            exp: now + Duration::days(30),
            license_expires_at: None,
            kid: "key-1".into(),
            entitlements: vec![],
            metadata: None,
            signature: SignatureBlock {
                algorithm: "ed25519".into(),
                key_id: "key-1".into(),
                value: "x".into(),
            },
            canonical: "x".into(),
        }
    }

    #[test]
    fn entitlement_check_active_iff_reason_active() {
        assert!(EntitlementCheck::new(EntitlementReason::Active).active);
        assert!(!EntitlementCheck::new(EntitlementReason::Expired).active);
        assert!(!EntitlementCheck::new(EntitlementReason::NotFound).active);
        assert!(!EntitlementCheck::new(EntitlementReason::NoLicense).active);
    }
}
