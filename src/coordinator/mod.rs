//! Lifecycle Coordinator (spec.md §5) — the façade applications embed.
//!
//! Owns the Cache, the API client, the clock monitor, and the event bus,
//! and is the only thing allowed to mutate license state. `activate`,
//! `deactivate`, and `reset` serialize on `transition_lock` since they
//! change which license is bound to this device; `validate` single-flights
//! concurrent callers instead (a burst of `validate()` calls within the
//! same tick should hit the network once, not once per caller); the read
//! accessors (`get_status`, `get_current_license`, `check_entitlement`,
//! `has_entitlement`) never take the transition lock at all.

pub mod offline;
pub mod state;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, ApiClientConfig};
use crate::cache::Cache;
use crate::clock::ClockMonitor;
use crate::config::{OfflineFallbackMode, RuntimeConfig};
use crate::errors::{LicenseError, LicenseResult, LicenseSemanticError};
use crate::events::{topics, EventBus, EventPayload};
use crate::hardware::{self, get_device_id};
use crate::http::HttpAdapter;
use crate::model::{
    EntitlementCheck, EntitlementReason, License, LicenseStatus, LicenseStatusType, ValidationResult,
};
use crate::storage::PersistenceAdapter;

use offline::{validate_offline, OfflineFallbackInput, OfflineOutcome};
use state::{CoordinatorState, InvalidReason};

/// Concurrent `validate()` calls arriving within this window of each other
/// reuse the in-flight/just-finished result instead of issuing a fresh
/// network request — the single-flight dedup window from spec.md §5.
const VALIDATE_DEDUP_WINDOW_MS: i64 = 1500;

fn is_auth_failure(e: &LicenseError) -> bool {
    matches!(e, LicenseError::Api(api_err) if api_err.is_auth_failure())
}

/// Awaits the next tick of `ticker` if one is configured, otherwise never
/// resolves — used to disable one arm of a `tokio::select!` without an
/// `Option`-unwrapping branch per call site.
async fn tick_or_pending(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub struct Coordinator {
    cache: Arc<Cache>,
    api: Arc<ApiClient>,
    clock: Arc<ClockMonitor>,
    events: Arc<EventBus>,
    config: RuntimeConfig,
    device_id: String,
    state: RwLock<CoordinatorState>,
    transition_lock: Mutex<()>,
    validate_lock: Mutex<()>,
    last_validate_ms: AtomicI64,
    last_validate_result: RwLock<Option<ValidationResult>>,
    /// Shutdown signal for the background timer loop. `reset()` cancels the
    /// current token and installs a fresh one so a later `initialize()` can
    /// start the loop again.
    cancellation: Mutex<CancellationToken>,
    /// Whether the combined auto-validate/heartbeat loop is currently
    /// spawned and running, so `start_background_tasks` never double-spawns
    /// and the `network:online` handler knows whether there's anything to
    /// resume.
    timers_active: AtomicBool,
    /// Set when `validate()` hits a 401/403; stops the background loop
    /// (spec.md §4.7.3 step 5) until a successful `activate()` or a
    /// `network:online` recovery clears it.
    auth_failed: AtomicBool,
}

impl Coordinator {
    pub fn new(
        config: RuntimeConfig,
        http: Arc<dyn HttpAdapter>,
        storage: Arc<dyn PersistenceAdapter>,
    ) -> Arc<Self> {
        let events = Arc::new(EventBus::new());
        let cache = Arc::new(Cache::new(storage, config.storage_prefix.clone()));
        let api = Arc::new(ApiClient::new(
            http,
            events.clone(),
            ApiClientConfig {
                base_url: config.api_base_url.clone(),
                api_key: config.api_key.clone(),
                max_retries: config.max_retries,
                retry_base_delay: Duration::from_millis(config.retry_delay_ms),
                timeout: Duration::from_secs(config.http_timeout_secs),
            },
        ));
        let clock = Arc::new(ClockMonitor::new(config.max_clock_skew_ms, Utc::now().timestamp_millis()));
        let device_id = get_device_id();

        let coordinator = Arc::new(Self {
            cache,
            api,
            clock,
            events,
            config,
            device_id,
            state: RwLock::new(CoordinatorState::Uninitialized),
            transition_lock: Mutex::new(()),
            validate_lock: Mutex::new(()),
            last_validate_ms: AtomicI64::new(0),
            last_validate_result: RwLock::new(None),
            cancellation: Mutex::new(CancellationToken::new()),
            timers_active: AtomicBool::new(false),
            auth_failed: AtomicBool::new(false),
        });

        // spec.md §4.7.1/§4.7.3: a `network:online` transition after the
        // loop stopped on a non-terminal condition (an auth failure) is the
        // trigger to resume it.
        let restart_target = coordinator.clone();
        coordinator.events.on(topics::NETWORK_ONLINE, move |_| {
            let this = restart_target.clone();
            tokio::spawn(async move {
                this.maybe_restart_background_tasks().await;
            });
        });

        coordinator
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Load any persisted cache snapshot and bring the state machine up to
    /// date with what it contains, then (if configured) start the
    /// background auto-validate and heartbeat loops.
    ///
    /// Also restores the Clock Monitor's high-water mark from the Cache's
    /// persisted `last_seen` and immediately re-observes the wall clock: a
    /// clock rolled back while the process wasn't running must be caught
    /// here, on the very first observation after restart, rather than
    /// silently re-basing on whatever `now` the new process started with
    /// (spec.md §4.2/§8 property 1).
    pub async fn initialize(self: &Arc<Self>) -> LicenseResult<()> {
        let loaded = self.cache.load().await.unwrap_or(false);

        self.clock.seed(self.cache.last_seen_ms().await);
        let tampered = self.clock.observe(Utc::now()) == crate::clock::ClockObservation::Tamper;
        self.cache.set_last_seen_ms(self.clock.last_seen_ms()).await;

        let next_state = if tampered {
            CoordinatorState::Invalid(InvalidReason::ClockTamper)
        } else if loaded {
            match self.cache.license().await {
                Some(license) if license.is_valid() => CoordinatorState::Active,
                Some(_) => CoordinatorState::Invalid(InvalidReason::Other),
                None => CoordinatorState::NoLicense,
            }
        } else {
            CoordinatorState::NoLicense
        };
        self.set_state(next_state).await;

        if self.config.auto_initialize {
            self.start_background_tasks().await;
        }

        Ok(())
    }

    async fn set_state(&self, next: CoordinatorState) {
        *self.state.write().await = next;
    }

    /// Whether the background loop must stop at its current tick: either
    /// terminal-invalid (revoked/clock-tamper, spec.md §4.7.1) or an
    /// unresolved auth failure (spec.md §4.7.3 step 5). Both conditions stop
    /// auto-validation *and* heartbeat together, since they share one loop.
    async fn timers_should_stop(&self) -> bool {
        self.auth_failed.load(Ordering::SeqCst) || self.state.read().await.is_terminal()
    }

    /// Spawn the combined auto-validate/heartbeat loop if it isn't already
    /// running. A no-op when both intervals are 0 (both disabled) or when a
    /// prior spawn is still alive.
    async fn start_background_tasks(self: &Arc<Self>) {
        if self.config.auto_validate_interval_secs == 0 && self.config.heartbeat_interval_secs == 0 {
            return;
        }
        if self.timers_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = self.clone();
        let cancellation = self.cancellation.lock().await.clone();
        let auto_validate_secs = self.config.auto_validate_interval_secs;
        let heartbeat_secs = self.config.heartbeat_interval_secs;

        tokio::spawn(async move {
            let mut auto_validate_ticker =
                (auto_validate_secs > 0).then(|| tokio::time::interval(Duration::from_secs(auto_validate_secs)));
            let mut heartbeat_ticker =
                (heartbeat_secs > 0).then(|| tokio::time::interval(Duration::from_secs(heartbeat_secs)));

            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = tick_or_pending(&mut auto_validate_ticker) => {
                        this.events.emit(topics::AUTOVALIDATION_CYCLE, EventPayload::Empty);
                        // spec.md §4.7.3 steps 3-6: heartbeat immediately after
                        // a successful cycle; an auth failure has already
                        // flipped `auth_failed` and emitted
                        // `validation:auth-failed` inside `validate()`, so it
                        // isn't re-reported as a transient auto-failure here.
                        match this.validate().await {
                            Ok(_) => {
                                let _ = this.heartbeat().await;
                            }
                            Err(e) if !is_auth_failure(&e) => {
                                this.events.emit(
                                    topics::VALIDATION_AUTO_FAILED,
                                    EventPayload::Message(e.to_string()),
                                );
                            }
                            Err(_) => {}
                        }
                        if this.timers_should_stop().await {
                            break;
                        }
                    }
                    _ = tick_or_pending(&mut heartbeat_ticker) => {
                        if this.timers_should_stop().await {
                            break;
                        }
                        let _ = this.heartbeat().await;
                    }
                }
            }
            this.timers_active.store(false, Ordering::SeqCst);
            this.events.emit(topics::AUTOVALIDATION_STOPPED, EventPayload::Empty);
        });
    }

    /// Resume the background loop after a `network:online` transition if it
    /// was stopped on an auth failure — not if it's stopped because the
    /// session is in a genuinely terminal state (revoked/clock-tamper),
    /// which only `reset()` can clear.
    async fn maybe_restart_background_tasks(self: &Arc<Self>) {
        if self.timers_active.load(Ordering::SeqCst) {
            return;
        }
        if self.state.read().await.is_terminal() {
            return;
        }
        self.auth_failed.store(false, Ordering::SeqCst);
        self.start_background_tasks().await;
    }

    /// A terminal `Invalid` state (revoked or clock-tampered) blocks every
    /// state-changing operation until `reset()` clears it.
    async fn reject_if_terminal(&self) -> LicenseResult<()> {
        let state = self.state.read().await;
        if state.is_terminal() {
            return Err(LicenseError::License(match &*state {
                CoordinatorState::Invalid(InvalidReason::Revoked) => LicenseSemanticError::Revoked,
                _ => LicenseSemanticError::InvalidLicense(
                    "session is in a terminal state; call reset() first".into(),
                ),
            }));
        }
        Ok(())
    }

    pub async fn activate(self: &Arc<Self>, license_key: &str, metadata: Option<Value>) -> LicenseResult<ValidationResult> {
        let _guard = self.transition_lock.lock().await;
        self.reject_if_terminal().await?;
        self.events.emit(topics::ACTIVATION_START, EventPayload::Empty);
        self.set_state(CoordinatorState::Validating).await;

        let result = self
            .api
            .activate(
                license_key,
                &self.config.product_slug,
                &self.device_id,
                Some(&hardware::device_name()),
                metadata,
            )
            .await;

        match result {
            Ok((license, activation)) => {
                self.cache.set_license(license.clone()).await;
                self.set_state(CoordinatorState::Active).await;
                self.auth_failed.store(false, Ordering::SeqCst);

                let validation_result = ValidationResult {
                    valid: true,
                    code: None,
                    message: None,
                    offline: false,
                    optimistic: false,
                    license: Some(license.clone()),
                    activation,
                    active_entitlements: Some(license.active_entitlements.clone()),
                    warnings: None,
                };
                self.cache
                    .set_validation_result(license.key.clone(), validation_result.clone())
                    .await;
                self.events.emit(
                    topics::ACTIVATION_SUCCESS,
                    EventPayload::json(validation_result.clone()),
                );
                self.spawn_offline_materials_refresh(license.key.clone());
                if !self.timers_active.load(Ordering::SeqCst) {
                    self.start_background_tasks().await;
                }
                Ok(validation_result)
            }
            Err(e) => {
                self.set_state(CoordinatorState::ActivationFailed).await;
                self.events.emit(topics::ACTIVATION_ERROR, EventPayload::Message(e.to_string()));
                Err(e)
            }
        }
    }

    /// Fetch and cache a fresh offline token plus its signing key in the
    /// background, so a later network outage can fall back immediately
    /// instead of offline validation failing cold. Runs detached from
    /// `activate`/`validate` so those calls don't wait on it; failures are
    /// logged via the usual `offlineLicense:fetchError` event, never
    /// propagated.
    fn spawn_offline_materials_refresh(self: &Arc<Self>, license_key: String) {
        let this = self.clone();
        tokio::spawn(async move {
            this.events.emit(topics::OFFLINE_LICENSE_FETCHING, EventPayload::Empty);
            let token = match this
                .api
                .fetch_offline_token(&this.config.product_slug, &license_key, &this.device_id)
                .await
            {
                Ok(token) => token,
                Err(e) => {
                    this.events.emit(
                        topics::OFFLINE_LICENSE_FETCH_ERROR,
                        EventPayload::Message(e.to_string()),
                    );
                    return;
                }
            };

            let public_key = match this.api.fetch_public_key(&token.kid).await {
                Ok(key) => key,
                Err(e) => {
                    this.events.emit(
                        topics::OFFLINE_LICENSE_FETCH_ERROR,
                        EventPayload::Message(e.to_string()),
                    );
                    return;
                }
            };

            this.cache.set_public_key(public_key).await;
            this.cache.set_offline_token(token).await;
            this.events.emit(topics::OFFLINE_LICENSE_FETCHED, EventPayload::Empty);
            this.events.emit(topics::OFFLINE_LICENSE_READY, EventPayload::Empty);
        });
    }

    pub async fn deactivate(self: &Arc<Self>) -> LicenseResult<()> {
        let _guard = self.transition_lock.lock().await;
        self.events.emit(topics::DEACTIVATION_START, EventPayload::Empty);

        let Some(license) = self.cache.license().await else {
            return Err(LicenseError::License(LicenseSemanticError::NoLicense));
        };

        match self
            .api
            .deactivate(&self.config.product_slug, &license.key, &self.device_id)
            .await
        {
            Ok(()) => {
                self.cache.clear_license().await;
                self.cache.clear_offline_token().await;
                self.set_state(CoordinatorState::NoLicense).await;
                self.events.emit(topics::DEACTIVATION_SUCCESS, EventPayload::Empty);
                Ok(())
            }
            Err(e) => {
                self.events.emit(topics::DEACTIVATION_ERROR, EventPayload::Message(e.to_string()));
                Err(e)
            }
        }
    }

    /// Validate the current license, falling back to the cached offline
    /// token on a network failure per `offline_fallback_mode`.
    pub async fn validate(self: &Arc<Self>) -> LicenseResult<ValidationResult> {
        let _guard = self.validate_lock.lock().await;
        self.reject_if_terminal().await?;

        let now_ms = Utc::now().timestamp_millis();
        let last = self.last_validate_ms.load(Ordering::SeqCst);
        if now_ms - last < VALIDATE_DEDUP_WINDOW_MS {
            if let Some(cached) = self.last_validate_result.read().await.clone() {
                return Ok(cached);
            }
        }

        let Some(license) = self.cache.license().await else {
            return Err(LicenseError::License(LicenseSemanticError::NoLicense));
        };

        self.events.emit(topics::VALIDATION_START, EventPayload::Empty);
        self.set_state(CoordinatorState::Validating).await;

        // `always` mode verifies against a fresh-enough cached offline
        // token first, skipping the network call entirely — spec.md
        // §4.7.4. Any other outcome (no token, stale token, failed
        // verification) falls through to the normal online attempt below.
        if self.config.offline_fallback_mode == OfflineFallbackMode::Always {
            if let Some(result) = self.try_offline_first(&license).await {
                self.last_validate_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
                *self.last_validate_result.write().await = Some(result.clone());
                return Ok(result);
            }
        }

        let outcome = self
            .api
            .validate(&self.config.product_slug, &license.key, &self.device_id)
            .await;

        let result = match outcome {
            Ok(result) if result.valid => {
                self.set_state(CoordinatorState::Active).await;
                if let Some(updated) = &result.license {
                    self.cache.set_license(updated.clone()).await;
                }
                self.cache.set_validation_result(license.key.clone(), result.clone()).await;
                self.events.emit(topics::VALIDATION_SUCCESS, EventPayload::Empty);
                self.spawn_offline_materials_refresh(license.key.clone());
                result
            }
            Ok(result) => {
                self.handle_invalid_from_server(&result).await;
                self.events.emit(topics::VALIDATION_FAILED, EventPayload::Message(
                    result.message.clone().unwrap_or_default(),
                ));
                result
            }
            Err(LicenseError::Network(network_err)) => {
                self.events.emit(
                    topics::VALIDATION_ERROR,
                    EventPayload::Message(network_err.message.clone()),
                );
                self.fallback_to_offline(&license).await?
            }
            Err(LicenseError::Api(api_err)) if api_err.is_auth_failure() => {
                self.auth_failed.store(true, Ordering::SeqCst);
                self.events.emit(topics::VALIDATION_AUTH_FAILED, EventPayload::Message(api_err.message.clone()));
                return Err(LicenseError::Api(api_err));
            }
            Err(e) => {
                self.events.emit(topics::VALIDATION_ERROR, EventPayload::Message(e.to_string()));
                return Err(e);
            }
        };

        self.last_validate_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        *self.last_validate_result.write().await = Some(result.clone());
        Ok(result)
    }

    async fn handle_invalid_from_server(&self, result: &ValidationResult) {
        let is_revoked = result.code.as_deref() == Some("license_revoked")
            || result.code.as_deref() == Some("license_suspended");
        if is_revoked {
            self.set_state(CoordinatorState::Invalid(InvalidReason::Revoked)).await;
            self.events.emit(topics::LICENSE_REVOKED, EventPayload::Empty);
        } else {
            self.set_state(CoordinatorState::Invalid(InvalidReason::Other)).await;
        }
    }

    /// `always` mode's pre-online-call attempt: only returns `Some` when a
    /// cached token exists and is within its validity window and offline
    /// age budget, so a verification failure here (bad signature, mismatch)
    /// is a real answer, not just "nothing to try" — a missing/stale token
    /// falls through to the normal online path instead of being reported as
    /// a failure.
    async fn try_offline_first(&self, license: &License) -> Option<ValidationResult> {
        let token = self.cache.offline_token().await?;
        let now = Utc::now();
        let max_age_seconds = i64::from(self.config.max_offline_days) * 86_400;
        if !token.is_within_validity_window(now) || token.age_seconds(now) > max_age_seconds {
            return None;
        }

        let outcome = validate_offline(OfflineFallbackInput {
            cache: &self.cache,
            clock: &self.clock,
            events: &self.events,
            api: &self.api,
            license_key: &license.key,
            device_id: &self.device_id,
            max_offline_days: self.config.max_offline_days,
            now,
        })
        .await;

        match outcome {
            OfflineOutcome::Result(result) if result.valid => {
                self.set_state(CoordinatorState::OfflineActive).await;
                Some(result)
            }
            OfflineOutcome::Result(result) => {
                self.set_state(CoordinatorState::Invalid(InvalidReason::Other)).await;
                self.events.emit(topics::VALIDATION_OFFLINE_FAILED, EventPayload::Empty);
                Some(result)
            }
            OfflineOutcome::ClockTamper => {
                self.set_state(CoordinatorState::Invalid(InvalidReason::ClockTamper)).await;
                self.events.emit(topics::VALIDATION_OFFLINE_FAILED, EventPayload::Empty);
                Some(ValidationResult::failed(
                    "clock_tamper",
                    "clock tamper detected; refusing offline validation",
                    true,
                ))
            }
        }
    }

    /// Network-class-failure fallback for `network-only`/`always` mode,
    /// and the propagation point for `disabled` mode (spec.md §7: "Disabled
    /// never uses offline; network-class failures propagate").
    async fn fallback_to_offline(&self, license: &License) -> LicenseResult<ValidationResult> {
        if self.config.offline_fallback_mode == OfflineFallbackMode::Disabled {
            self.set_state(CoordinatorState::Invalid(InvalidReason::Other)).await;
            return Err(LicenseError::Network(crate::errors::NetworkError {
                status: 0,
                message: "offline fallback is disabled".into(),
            }));
        }

        let now = Utc::now();
        let outcome = validate_offline(OfflineFallbackInput {
            cache: &self.cache,
            clock: &self.clock,
            events: &self.events,
            api: &self.api,
            license_key: &license.key,
            device_id: &self.device_id,
            max_offline_days: self.config.max_offline_days,
            now,
        })
        .await;

        match outcome {
            OfflineOutcome::Result(result) if result.valid => {
                self.set_state(CoordinatorState::OfflineActive).await;
                Ok(result)
            }
            OfflineOutcome::Result(result) => {
                self.set_state(CoordinatorState::Invalid(InvalidReason::Other)).await;
                self.events.emit(topics::VALIDATION_OFFLINE_FAILED, EventPayload::Empty);
                Ok(result)
            }
            OfflineOutcome::ClockTamper => {
                self.set_state(CoordinatorState::Invalid(InvalidReason::ClockTamper)).await;
                self.events.emit(topics::VALIDATION_OFFLINE_FAILED, EventPayload::Empty);
                Ok(ValidationResult::failed(
                    "clock_tamper",
                    "clock tamper detected; refusing offline validation",
                    true,
                ))
            }
        }
    }

    pub async fn heartbeat(&self) -> LicenseResult<()> {
        let Some(license) = self.cache.license().await else {
            return Err(LicenseError::License(LicenseSemanticError::NoLicense));
        };

        match self
            .api
            .heartbeat(&self.config.product_slug, &license.key, &self.device_id)
            .await
        {
            Ok(server_time) => {
                self.clock.observe(server_time);
                self.cache.set_last_seen_ms(self.clock.last_seen_ms()).await;
                self.events.emit(topics::HEARTBEAT_SUCCESS, EventPayload::Empty);
                Ok(())
            }
            Err(e) => {
                self.events.emit(topics::HEARTBEAT_ERROR, EventPayload::Message(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn test_auth(&self) -> LicenseResult<bool> {
        self.events.emit(topics::AUTH_TEST_START, EventPayload::Empty);
        match self.api.health().await {
            Ok(ok) => {
                self.events.emit(topics::AUTH_TEST_SUCCESS, EventPayload::Empty);
                Ok(ok)
            }
            Err(e) => {
                self.events.emit(topics::AUTH_TEST_ERROR, EventPayload::Message(e.to_string()));
                Err(e)
            }
        }
    }

    /// Lock-free status read: never touches `transition_lock`.
    pub async fn get_status(&self) -> LicenseStatus {
        let state = self.state.read().await.clone();
        let message = match &state {
            CoordinatorState::Uninitialized => "not yet initialized",
            CoordinatorState::NoLicense => "no license is bound to this device",
            CoordinatorState::Validating => "validating license",
            CoordinatorState::Active => "license is active",
            CoordinatorState::ActivationFailed => "activation failed",
            CoordinatorState::OfflineActive => "license is active (offline)",
            CoordinatorState::Invalid(InvalidReason::Revoked) => "license has been revoked",
            CoordinatorState::Invalid(InvalidReason::ClockTamper) => "clock tamper detected",
            CoordinatorState::Invalid(InvalidReason::Expired) => "license has expired",
            CoordinatorState::Invalid(InvalidReason::Other) => "license is invalid",
        };
        LicenseStatus::new(state.to_status_type(), message)
    }

    pub async fn get_current_license(&self) -> Option<License> {
        self.cache.license().await
    }

    pub async fn check_entitlement(&self, key: &str) -> EntitlementCheck {
        let state = self.state.read().await.clone();
        if !state.license_is_usable() {
            return EntitlementCheck::new(EntitlementReason::NoLicense);
        }

        let Some(license) = self.cache.license().await else {
            return EntitlementCheck::new(EntitlementReason::NoLicense);
        };

        let now = Utc::now();
        match license.active_entitlements.iter().find(|e| e.key == key) {
            Some(e) if e.is_unexpired(now) => EntitlementCheck::new(EntitlementReason::Active),
            Some(_) => EntitlementCheck::new(EntitlementReason::Expired),
            None => EntitlementCheck::new(EntitlementReason::NotFound),
        }
    }

    pub async fn has_entitlement(&self, key: &str) -> bool {
        self.check_entitlement(key).await.active
    }

    /// Wipe all cached/session state, stop background loops, and clear the
    /// clock's tamper latch. The only way out of a terminal `Invalid`
    /// state.
    pub async fn reset(self: &Arc<Self>) -> LicenseResult<()> {
        let _guard = self.transition_lock.lock().await;
        {
            let mut token = self.cancellation.lock().await;
            token.cancel();
            *token = CancellationToken::new();
        }
        self.timers_active.store(false, Ordering::SeqCst);
        self.auth_failed.store(false, Ordering::SeqCst);
        self.cache.clear_all().await;
        self.clock.clear_tamper();
        self.set_state(CoordinatorState::Uninitialized).await;
        *self.last_validate_result.write().await = None;
        self.last_validate_ms.store(0, Ordering::SeqCst);
        self.events.emit(topics::SDK_RESET, EventPayload::Empty);
        Ok(())
    }

    /// Drop the cached license/offline token without touching the server
    /// (e.g. to force a fresh activation on next launch), short of a full
    /// `reset()`.
    pub async fn purge_cached_license(&self) -> LicenseResult<()> {
        self.cache.clear_license().await;
        self.cache.clear_offline_token().await;
        self.set_state(CoordinatorState::NoLicense).await;
        Ok(())
    }
}
