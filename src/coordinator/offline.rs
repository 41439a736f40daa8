//! Offline fallback cascade (spec.md §4.7.3): the seven checks a cached
//! offline token must clear before the coordinator trusts it in place of a
//! live server response.
//!
//! 1. Load the cached offline token (none cached ⇒ cannot fall back).
//! 2. Observe the wall clock; a detected regression fails closed.
//! 3. The token's `device_id`/`license_key` must match this session.
//! 4. The token must be within its `nbf..exp` window and no older than
//!    `max_offline_days`.
//! 5. Look up the signing public key for the token's `kid`: cache first,
//!    falling back to a single best-effort network fetch (the key is
//!    long-lived, so this one call is allowed even during otherwise-offline
//!    verification).
//! 6. Verify the Ed25519 signature over the token's canonical bytes.
//! 7. On success, build a `ValidationResult` from the token's entitlements
//!    as of now and emit the offline success events.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::ApiClient;
use crate::cache::Cache;
use crate::clock::{ClockMonitor, ClockObservation};
use crate::crypto;
use crate::events::{topics, EventBus, EventPayload};
use crate::model::ValidationResult;

pub struct OfflineFallbackInput<'a> {
    pub cache: &'a Arc<Cache>,
    pub clock: &'a Arc<ClockMonitor>,
    pub events: &'a Arc<EventBus>,
    pub api: &'a Arc<ApiClient>,
    pub license_key: &'a str,
    pub device_id: &'a str,
    pub max_offline_days: u32,
    pub now: DateTime<Utc>,
}

/// Outcome of the cascade, distinguishing "token says license is invalid"
/// (a normal failed `ValidationResult`) from "clock tamper detected" (which
/// the coordinator must turn into a terminal `Invalid(ClockTamper)` state,
/// not just a failed validation).
pub enum OfflineOutcome {
    Result(ValidationResult),
    ClockTamper,
}

pub async fn validate_offline(input: OfflineFallbackInput<'_>) -> OfflineOutcome {
    input.events.emit(topics::OFFLINE_LICENSE_FETCHING, EventPayload::Empty);

    // Step 1: load the cached token.
    let Some(token) = input.cache.offline_token().await else {
        input.events.emit(
            topics::OFFLINE_LICENSE_FETCH_ERROR,
            EventPayload::Message("no offline token cached".into()),
        );
        return OfflineOutcome::Result(ValidationResult::failed(
            "no_offline_token",
            "no cached offline token is available",
            true,
        ));
    };
    input.events.emit(topics::OFFLINE_LICENSE_FETCHED, EventPayload::Empty);

    // Step 2: clock tamper check. The sticky flag from an earlier
    // regression is checked first since a single fine observation in
    // between doesn't clear it — only `reset()` does.
    let fresh_tamper = !input.clock.is_tampered() && input.clock.observe(input.now) == ClockObservation::Tamper;
    input.cache.set_last_seen_ms(input.clock.last_seen_ms()).await;
    if input.clock.is_tampered() || fresh_tamper {
        input.events.emit(
            topics::OFFLINE_LICENSE_VERIFICATION_FAILED,
            EventPayload::Message("clock tamper detected".into()),
        );
        return OfflineOutcome::ClockTamper;
    }

    // Step 3: key/device match.
    if token.device_id != input.device_id || token.license_key != input.license_key {
        return OfflineOutcome::Result(ValidationResult::failed(
            "license_mismatch",
            "cached offline token does not match the current license/device",
            true,
        ));
    }

    // Step 4: validity window + max offline age.
    if !token.is_within_validity_window(input.now) {
        return OfflineOutcome::Result(ValidationResult::failed(
            "token_expired",
            "cached offline token is outside its validity window",
            true,
        ));
    }
    let max_age_seconds = i64::from(input.max_offline_days) * 86_400;
    if token.age_seconds(input.now) > max_age_seconds {
        return OfflineOutcome::Result(ValidationResult::failed(
            "offline_period_exceeded",
            "offline token exceeds the configured maximum offline period",
            true,
        ));
    }

    // Step 5: public key lookup. Prefer the cache; the key is long-lived, so
    // a single network call to fetch it is permitted even while otherwise
    // validating offline (spec.md §4.7.3 step 5). Only a cache miss *and* a
    // failed fetch is fatal.
    let public_key = match input.cache.public_key(&token.kid).await {
        Some(key) => key,
        None => match input.api.fetch_public_key(&token.kid).await {
            Ok(key) => {
                input.cache.set_public_key(key.clone()).await;
                key
            }
            Err(_) => {
                input.events.emit(
                    topics::OFFLINE_LICENSE_VERIFICATION_FAILED,
                    EventPayload::Message("no public key cached or fetchable for token kid".into()),
                );
                return OfflineOutcome::Result(ValidationResult::failed(
                    "no_public_key",
                    "no signing key cached or fetchable for this offline token",
                    true,
                ));
            }
        },
    };

    // Step 6: signature verification.
    let verified = crypto::verify(
        &public_key.public_key,
        &token.signature.value,
        token.canonical.as_bytes(),
    );
    let is_valid = match verified {
        Ok(valid) => valid,
        Err(_) => false,
    };
    if !is_valid {
        input.events.emit(
            topics::OFFLINE_LICENSE_VERIFICATION_FAILED,
            EventPayload::Message("signature verification failed".into()),
        );
        return OfflineOutcome::Result(ValidationResult::failed(
            "signature_invalid",
            "offline token signature failed verification",
            true,
        ));
    }
    input.events.emit(topics::OFFLINE_LICENSE_VERIFIED, EventPayload::Empty);

    // Step 7: success.
    let entitlements = token.entitlements_as_of(input.now);
    let result = ValidationResult {
        valid: true,
        code: None,
        message: None,
        offline: true,
        optimistic: false,
        license: None,
        activation: None,
        active_entitlements: Some(entitlements),
        warnings: None,
    };
    input.events.emit(topics::OFFLINE_LICENSE_READY, EventPayload::Empty);
    input.events.emit(topics::VALIDATION_OFFLINE_SUCCESS, EventPayload::Empty);
    OfflineOutcome::Result(result)
}
