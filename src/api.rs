//! API Layer (spec.md §4.5).
//!
//! Talks to the license server through an injected `HttpAdapter`, wraps
//! every call in exponential-backoff-with-jitter retry, and converts
//! between the server's wire shapes and the crate's internal model —
//! mirroring the wire-to-public `From` conversions the teacher uses in
//! `client/responses.rs`, generalized to the activation/offline-token
//! surface this crate exposes.
//!
//! Network reachability is edge-triggered here: `network:online` /
//! `network:offline` fire only on a *transition*, never on every request,
//! so a long outage doesn't spam the event bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ApiError, ClientErrorCode, LicenseError, LicenseResult, NetworkError};
use crate::events::{topics, EventBus, EventPayload};
use crate::http::HttpAdapter;
use crate::model::{
    ActivationInfo, Entitlement, License, LicenseState, OfflineEntitlement, OfflineToken,
    PublicKey, SignatureBlock, ValidationResult,
};

/// Statuses the retry loop will retry: `0` (connection failure, assigned by
/// the `HttpAdapter`), `408` (timeout), `429` (rate limited), and every
/// `5xx`.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 0 | 408 | 429) || (502..=599).contains(&status)
}

/// Exponential backoff with up to 10% jitter: `base * 2^attempt + U(0, 0.1 *
/// base * 2^attempt)`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.as_millis().saturating_mul(1u128 << attempt.min(20));
    let jitter_span = (exponential as f64 * 0.1) as u64;
    let jitter = if jitter_span == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_span)
    };
    Duration::from_millis(exponential as u64 + jitter)
}

pub struct ApiClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub timeout: Duration,
}

pub struct ApiClient {
    http: Arc<dyn HttpAdapter>,
    events: Arc<EventBus>,
    config: ApiClientConfig,
    was_online: AtomicBool,
}

impl ApiClient {
    pub fn new(http: Arc<dyn HttpAdapter>, events: Arc<EventBus>, config: ApiClientConfig) -> Self {
        Self {
            http,
            events,
            config,
            was_online: AtomicBool::new(true),
        }
    }

    fn auth_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.config.api_key),
        );
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn note_network_status(&self, reachable: bool) {
        let was_online = self.was_online.swap(reachable, Ordering::SeqCst);
        if was_online != reachable {
            let topic = if reachable { topics::NETWORK_ONLINE } else { topics::NETWORK_OFFLINE };
            self.events.emit(topic, EventPayload::Empty);
        }
    }

    /// POST `path` with `body`, retrying retryable failures up to
    /// `max_retries` additional times (so `max_retries + 1` attempts total).
    async fn post_with_retry(&self, path: &str, body: Value) -> LicenseResult<Value> {
        let url = self.url(path);
        let headers = self.auth_headers();
        let mut attempt = 0;

        loop {
            let response = self.http.post(&url, &headers, &body).await;

            if response.is_success() {
                self.note_network_status(true);
                return Ok(response.body);
            }

            let retryable = is_retryable_status(response.status);
            // Any non-zero status means we did reach *something*; only 0
            // (connection failure) or 408 (timeout) count as unreachable
            // for network-status purposes.
            self.note_network_status(!matches!(response.status, 0 | 408));

            if retryable && attempt < self.config.max_retries {
                let delay = backoff_delay(self.config.retry_base_delay, attempt);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(response_to_error(response.status, response.body));
        }
    }

    async fn get_with_retry(&self, path: &str) -> LicenseResult<Value> {
        let url = self.url(path);
        let headers = self.auth_headers();
        let mut attempt = 0;

        loop {
            let response = self.http.get(&url, &headers).await;

            if response.is_success() {
                self.note_network_status(true);
                return Ok(response.body);
            }

            let retryable = is_retryable_status(response.status);
            self.note_network_status(!matches!(response.status, 0 | 408));

            if retryable && attempt < self.config.max_retries {
                let delay = backoff_delay(self.config.retry_base_delay, attempt);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(response_to_error(response.status, response.body));
        }
    }

    /// `{slug}/licenses/{key}` path prefix shared by every per-license
    /// endpoint (spec.md §6).
    fn license_path(product_slug: &str, license_key: &str, suffix: &str) -> String {
        format!("/products/{product_slug}/licenses/{license_key}/{suffix}")
    }

    pub async fn activate(
        &self,
        license_key: &str,
        product_slug: &str,
        device_id: &str,
        device_name: Option<&str>,
        metadata: Option<Value>,
    ) -> LicenseResult<(License, Option<ActivationInfo>)> {
        let mut body = json!({ "device_id": device_id });
        if let Some(name) = device_name {
            body["device_name"] = Value::String(name.to_string());
        }
        if let Some(meta) = metadata {
            body["metadata"] = meta;
        }
        let path = Self::license_path(product_slug, license_key, "activate");
        let raw = self.post_with_retry(&path, body).await?;
        let wire: WireActivateResponse = serde_json::from_value(raw)
            .map_err(|e| LicenseError::Api(malformed_response_error(e)))?;
        Ok((wire.license.into(), wire.activation.map(Into::into)))
    }

    pub async fn deactivate(&self, product_slug: &str, license_key: &str, device_id: &str) -> LicenseResult<()> {
        let body = json!({ "device_id": device_id });
        let path = Self::license_path(product_slug, license_key, "deactivate");
        self.post_with_retry(&path, body).await?;
        Ok(())
    }

    pub async fn validate(&self, product_slug: &str, license_key: &str, device_id: &str) -> LicenseResult<ValidationResult> {
        let body = json!({ "device_id": device_id });
        let path = Self::license_path(product_slug, license_key, "validate");
        let raw = self.post_with_retry(&path, body).await?;
        let wire: WireValidationResponse = serde_json::from_value(raw)
            .map_err(|e| LicenseError::Api(malformed_response_error(e)))?;
        Ok(wire.into())
    }

    pub async fn fetch_offline_token(
        &self,
        product_slug: &str,
        license_key: &str,
        device_id: &str,
    ) -> LicenseResult<OfflineToken> {
        let body = json!({ "device_id": device_id });
        let path = Self::license_path(product_slug, license_key, "offline-token");
        let raw = self.post_with_retry(&path, body).await?;
        let wire: WireOfflineToken = serde_json::from_value(raw)
            .map_err(|e| LicenseError::Api(malformed_response_error(e)))?;
        Ok(wire.into())
    }

    pub async fn fetch_public_key(&self, kid: &str) -> LicenseResult<PublicKey> {
        let raw = self
            .get_with_retry(&format!("/signing-keys/{kid}"))
            .await?;
        let wire: WirePublicKey = serde_json::from_value(raw)
            .map_err(|e| LicenseError::Api(malformed_response_error(e)))?;
        Ok(wire.into())
    }

    pub async fn heartbeat(&self, product_slug: &str, license_key: &str, device_id: &str) -> LicenseResult<DateTime<Utc>> {
        let body = json!({ "device_id": device_id });
        let path = Self::license_path(product_slug, license_key, "heartbeat");
        let raw = self.post_with_retry(&path, body).await?;
        let wire: WireHeartbeatResponse = serde_json::from_value(raw)
            .map_err(|e| LicenseError::Api(malformed_response_error(e)))?;
        Ok(wire.server_time)
    }

    /// True iff the health endpoint answers with a 2xx status (spec.md
    /// §4.7.2's `test_auth`); the body carries `{status, api_version}`, not
    /// a boolean, so success is the status code itself, not a field in it.
    pub async fn health(&self) -> LicenseResult<bool> {
        self.get_with_retry("/health").await?;
        Ok(true)
    }
}

fn malformed_response_error(e: serde_json::Error) -> ApiError {
    ApiError {
        status: 200,
        code: ClientErrorCode::Unknown,
        message: format!("malformed response body: {e}"),
        retryable: false,
        body: String::new(),
    }
}

fn response_to_error(status: u16, body: Value) -> LicenseError {
    if matches!(status, 0 | 408) {
        return LicenseError::Network(NetworkError {
            status,
            message: body.as_str().map(str::to_string).unwrap_or_else(|| body.to_string()),
        });
    }

    let wire: Option<WireErrorBody> = serde_json::from_value(body.clone()).ok();
    let (code, message) = match wire {
        Some(w) => (w.error.code, w.error.message),
        None => (ClientErrorCode::Unknown, body.to_string()),
    };

    LicenseError::Api(ApiError {
        status,
        code,
        message,
        retryable: is_retryable_status(status),
        body: body.to_string(),
    })
}

// --- Wire shapes ---

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    code: ClientErrorCode,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEntitlement {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl From<WireEntitlement> for Entitlement {
    fn from(w: WireEntitlement) -> Self {
        Entitlement { key: w.key, expires_at: w.expires_at, metadata: None }
    }
}

#[derive(Debug, Deserialize)]
struct WireLicense {
    license_key: String,
    product_slug: String,
    device_id: String,
    status: LicenseState,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    plan_key: Option<String>,
    seat_limit: Option<u32>,
    active_seats: u32,
    entitlements: Vec<WireEntitlement>,
    activated_at: DateTime<Utc>,
}

impl From<WireLicense> for License {
    fn from(w: WireLicense) -> Self {
        License {
            key: w.license_key,
            product_slug: w.product_slug,
            device_id: w.device_id,
            status: w.status,
            starts_at: w.starts_at,
            expires_at: w.expires_at,
            plan_key: w.plan_key,
            seat_limit: w.seat_limit,
            active_seats: w.active_seats,
            active_entitlements: w.entitlements.into_iter().map(Into::into).collect(),
            activated_at: w.activated_at,
            last_validated_at: None,
            last_validation_result: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireActivationInfo {
    activation_id: String,
    activated_at: DateTime<Utc>,
}

impl From<WireActivationInfo> for ActivationInfo {
    fn from(w: WireActivationInfo) -> Self {
        ActivationInfo { activation_id: w.activation_id, activated_at: w.activated_at }
    }
}

#[derive(Debug, Deserialize)]
struct WireActivateResponse {
    license: WireLicense,
    activation: Option<WireActivationInfo>,
}

#[derive(Debug, Deserialize)]
struct WireValidationResponse {
    valid: bool,
    code: Option<String>,
    message: Option<String>,
    license: Option<WireLicense>,
    active_entitlements: Option<Vec<WireEntitlement>>,
    warnings: Option<Vec<String>>,
}

impl From<WireValidationResponse> for ValidationResult {
    fn from(w: WireValidationResponse) -> Self {
        ValidationResult {
            valid: w.valid,
            code: w.code,
            message: w.message,
            offline: false,
            optimistic: false,
            license: w.license.map(Into::into),
            activation: None,
            active_entitlements: w
                .active_entitlements
                .map(|es| es.into_iter().map(Into::into).collect()),
            warnings: w.warnings,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireOfflineToken {
    schema_version: u32,
    license_key: String,
    product_slug: String,
    plan_key: Option<String>,
    device_id: String,
    iat: DateTime<Utc>,
    nbf: DateTime<Utc>,
    exp: DateTime<Utc>,
    license_expires_at: Option<DateTime<Utc>>,
    kid: String,
    entitlements: Vec<WireEntitlement>,
    signature_algorithm: String,
    signature: String,
    canonical: String,
}

impl From<WireOfflineToken> for OfflineToken {
    fn from(w: WireOfflineToken) -> Self {
        OfflineToken {
            schema_version: w.schema_version,
            license_key: w.license_key,
            product_slug: w.product_slug,
            plan_key: w.plan_key,
            device_id: w.device_id,
            iat: w.iat,
            nbf: w.nbf,
            exp: w.exp,
            license_expires_at: w.license_expires_at,
            kid: w.kid.clone(),
            entitlements: w
                .entitlements
                .into_iter()
                .map(|e| OfflineEntitlement { key: e.key, expires_at: e.expires_at, metadata: None })
                .collect(),
            metadata: None,
            signature: SignatureBlock {
                algorithm: w.signature_algorithm,
                key_id: w.kid,
                value: w.signature,
            },
            canonical: w.canonical,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePublicKey {
    key_id: String,
    algorithm: String,
    public_key_hex: String,
}

impl From<WirePublicKey> for PublicKey {
    fn from(w: WirePublicKey) -> Self {
        PublicKey {
            key_id: w.key_id,
            algorithm: w.algorithm,
            public_key: hex::decode(w.public_key_hex).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireHeartbeatResponse {
    server_time: DateTime<Utc>,
}
