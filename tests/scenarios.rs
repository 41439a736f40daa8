//! End-to-end lifecycle scenarios driven through the public `Coordinator`
//! API against a scripted `HttpAdapter`, no real sockets involved.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use licenseseat::config::{OfflineFallbackMode, RuntimeConfig};
use licenseseat::coordinator::Coordinator;
use licenseseat::events::topics;
use licenseseat::http::{HttpAdapter, HttpResponse};
use licenseseat::storage::InMemoryStorage;
use serde_json::{json, Value};

struct ScriptedAdapter {
    responses: Mutex<VecDeque<HttpResponse>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, status: u16, body: Value) {
        self.responses.lock().unwrap().push_back(HttpResponse { status, body });
    }
}

#[async_trait]
impl HttpAdapter for ScriptedAdapter {
    async fn get(&self, _url: &str, _headers: &HashMap<String, String>) -> HttpResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(HttpResponse { status: 0, body: Value::Null })
    }

    async fn post(&self, _url: &str, _headers: &HashMap<String, String>, _body: &Value) -> HttpResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(HttpResponse { status: 0, body: Value::Null })
    }
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        api_key: "test-key".into(),
        product_slug: "acme".into(),
        api_base_url: "https://license.example.test".into(),
        auto_validate_interval_secs: 0,
        heartbeat_interval_secs: 0,
        max_retries: 1,
        retry_delay_ms: 1,
        http_timeout_secs: 5,
        offline_fallback_mode: OfflineFallbackMode::NetworkOnly,
        max_offline_days: 7,
        max_clock_skew_ms: licenseseat::clock::DEFAULT_SKEW_TOLERANCE_MS,
        storage_prefix: format!("scenario-{}", uniq()),
        auto_initialize: false,
        debug: false,
    }
}

fn uniq() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering as O};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, O::SeqCst)
}

fn license_body(key: &str, status: &str, seat_limit: Option<u32>, active_seats: u32) -> Value {
    json!({
        "license_key": key,
        "product_slug": "acme",
        "device_id": "dev-scenario",
        "status": status,
        "starts_at": null,
        "expires_at": null,
        "plan_key": null,
        "seat_limit": seat_limit,
        "active_seats": active_seats,
        "entitlements": [{"key": "pro"}],
        "activated_at": Utc::now().to_rfc3339(),
    })
}

/// S1 — first activation online: status goes Active and an
/// activation:success event fires.
#[tokio::test]
async fn s1_first_activation_online() {
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.push(201, json!({ "license": license_body("K-1", "active", Some(3), 1), "activation": null }));

    let coordinator = Coordinator::new(config(), adapter, Arc::new(InMemoryStorage::new()));
    coordinator.initialize().await.unwrap();

    let events = coordinator.events();
    let success_count = Arc::new(AtomicUsize::new(0));
    let sc = success_count.clone();
    events.on(topics::ACTIVATION_SUCCESS, move |_| {
        sc.fetch_add(1, Ordering::SeqCst);
    });

    let result = coordinator.activate("K-1", None).await.unwrap();
    assert!(result.valid);
    assert_eq!(success_count.load(Ordering::SeqCst), 1);

    let status = coordinator.get_status().await;
    assert_eq!(status.status, licenseseat::model::LicenseStatusType::Active);
}

/// S2 — a cached entitlement whose `expires_at` is in the past reads as
/// `Expired`, not `Active`.
#[tokio::test]
async fn s2_entitlement_expiry() {
    let adapter = Arc::new(ScriptedAdapter::new());
    let mut license = license_body("K-1", "active", None, 1);
    license["entitlements"] = json!([{ "key": "pro", "expires_at": (Utc::now() - chrono::Duration::seconds(1)).to_rfc3339() }]);
    adapter.push(201, json!({ "license": license, "activation": null }));

    let coordinator = Coordinator::new(config(), adapter, Arc::new(InMemoryStorage::new()));
    coordinator.initialize().await.unwrap();
    coordinator.activate("K-1", None).await.unwrap();

    let check = coordinator.check_entitlement("pro").await;
    assert_eq!(check.reason, licenseseat::model::EntitlementReason::Expired);
    assert!(!coordinator.has_entitlement("pro").await);
}

/// S3 — network outage with a valid cached offline token falls back
/// successfully; recovery on the next validate() goes back online.
#[tokio::test]
async fn s3_network_outage_falls_back_to_offline_token() {
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.push(201, json!({ "license": license_body("K-1", "active", None, 1), "activation": null }));
    // offline-materials refresh, spawned in the background after activation
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = ring::signature::Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let key_pair = ring::signature::Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
    use ring::signature::KeyPair;
    let public_key_hex = hex::encode(key_pair.public_key().as_ref());

    let now = Utc::now();
    let canonical = "canonical-s3";
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    let signature = URL_SAFE_NO_PAD.encode(key_pair.sign(canonical.as_bytes()).as_ref());

    adapter.push(
        200,
        json!({
            "schema_version": 1,
            "license_key": "K-1",
            "product_slug": "acme",
            "plan_key": null,
            "device_id": "dev-scenario",
            "iat": now.to_rfc3339(),
            "nbf": now.to_rfc3339(),
            "exp": (now + chrono::Duration::days(7)).to_rfc3339(),
            "license_expires_at": null,
            "kid": "key-s3",
            "entitlements": [{"key": "pro"}],
            "signature_algorithm": "ed25519",
            "signature": signature,
            "canonical": canonical,
        }),
    );
    adapter.push(
        200,
        json!({ "key_id": "key-s3", "algorithm": "ed25519", "public_key_hex": public_key_hex }),
    );
    adapter.push(0, Value::Null); // server unreachable for the next validate()

    let coordinator = Coordinator::new(config(), adapter.clone(), Arc::new(InMemoryStorage::new()));
    coordinator.initialize().await.unwrap();
    coordinator.activate("K-1", None).await.unwrap();

    // Give the background offline-materials refresh a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = coordinator.validate().await.unwrap();
    assert!(result.valid);
    assert!(result.offline);
}

/// S4 — a clock that regresses past tolerance (here, simulated by a
/// heartbeat reporting a server time far ahead, then real wall-clock time
/// reading as "behind" it) blocks offline fallback even with a valid
/// signature on the cached token.
#[tokio::test]
async fn s4_clock_tamper_blocks_offline_fallback() {
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.push(201, json!({ "license": license_body("K-1", "active", None, 1), "activation": null }));

    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = ring::signature::Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
    let key_pair = ring::signature::Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
    use ring::signature::KeyPair;
    let public_key_hex = hex::encode(key_pair.public_key().as_ref());

    let now = Utc::now();
    let canonical = "canonical-s4";
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    let signature = URL_SAFE_NO_PAD.encode(key_pair.sign(canonical.as_bytes()).as_ref());

    adapter.push(
        200,
        json!({
            "schema_version": 1,
            "license_key": "K-1",
            "product_slug": "acme",
            "plan_key": null,
            "device_id": "dev-scenario",
            "iat": now.to_rfc3339(),
            "nbf": now.to_rfc3339(),
            "exp": (now + chrono::Duration::days(7)).to_rfc3339(),
            "license_expires_at": null,
            "kid": "key-s4",
            "entitlements": [{"key": "pro"}],
            "signature_algorithm": "ed25519",
            "signature": signature,
            "canonical": canonical,
        }),
    );
    adapter.push(
        200,
        json!({ "key_id": "key-s4", "algorithm": "ed25519", "public_key_hex": public_key_hex }),
    );
    // heartbeat reports a server time 2 hours ahead, advancing last_seen.
    adapter.push(200, json!({ "server_time": (now + chrono::Duration::hours(2)).to_rfc3339() }));
    // validate() then sees the server unreachable, forcing offline fallback.
    adapter.push(0, Value::Null);

    let coordinator = Coordinator::new(config(), adapter.clone(), Arc::new(InMemoryStorage::new()));
    coordinator.initialize().await.unwrap();
    coordinator.activate("K-1", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    coordinator.heartbeat().await.unwrap();

    let events = coordinator.events();
    let offline_failed = Arc::new(AtomicUsize::new(0));
    let of = offline_failed.clone();
    events.on(topics::VALIDATION_OFFLINE_FAILED, move |_| {
        of.fetch_add(1, Ordering::SeqCst);
    });

    let result = coordinator.validate().await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.code.as_deref(), Some("clock_tamper"));
    assert_eq!(offline_failed.load(Ordering::SeqCst), 1);

    let status = coordinator.get_status().await;
    assert_eq!(status.status, licenseseat::model::LicenseStatusType::Invalid);
}

/// S5 — a server-reported revocation during validation terminates the
/// session: status becomes Invalid and entitlements stop resolving.
#[tokio::test]
async fn s5_revocation_invalidates_session() {
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.push(201, json!({ "license": license_body("K-1", "active", None, 1), "activation": null }));
    adapter.push(200, json!({ "valid": false, "code": "license_revoked", "message": "revoked" }));

    let coordinator = Coordinator::new(config(), adapter, Arc::new(InMemoryStorage::new()));
    coordinator.initialize().await.unwrap();
    coordinator.activate("K-1", None).await.unwrap();

    let events = coordinator.events();
    let revoked = Arc::new(AtomicUsize::new(0));
    let r = revoked.clone();
    events.on(topics::LICENSE_REVOKED, move |_| {
        r.fetch_add(1, Ordering::SeqCst);
    });

    let result = coordinator.validate().await.unwrap();
    assert!(!result.valid);
    assert_eq!(revoked.load(Ordering::SeqCst), 1);

    let status = coordinator.get_status().await;
    assert_eq!(status.status, licenseseat::model::LicenseStatusType::Invalid);
    assert!(!coordinator.has_entitlement("pro").await);
}

/// S6 — a seat-limit rejection on activation propagates as an Api error
/// and never transitions the cache/state to Active.
#[tokio::test]
async fn s6_seat_limit_exceeded_on_activation() {
    let adapter = Arc::new(ScriptedAdapter::new());
    adapter.push(
        409,
        json!({ "error": { "code": "seat_limit_exceeded", "message": "seat limit reached" } }),
    );

    let coordinator = Coordinator::new(config(), adapter, Arc::new(InMemoryStorage::new()));
    coordinator.initialize().await.unwrap();

    let events = coordinator.events();
    let success = Arc::new(AtomicUsize::new(0));
    let s = success.clone();
    events.on(topics::ACTIVATION_SUCCESS, move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    let err = coordinator.activate("K-2", None).await.unwrap_err();
    match err {
        licenseseat::LicenseError::Api(api_err) => {
            assert_eq!(api_err.code, licenseseat::errors::ClientErrorCode::SeatLimitExceeded);
        }
        other => panic!("expected an Api error, got {other:?}"),
    }
    assert_eq!(success.load(Ordering::SeqCst), 0);
    assert!(coordinator.get_current_license().await.is_none());
}
