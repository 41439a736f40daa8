//! Runtime configuration (spec.md §6).
//!
//! Precedence, highest to lowest:
//! 1. Environment variables (`LICENSESEAT_*`)
//! 2. `licenseseat.toml` in the working directory
//! 3. Built-in defaults
//!
//! Same `config`-crate builder pattern the teacher uses for its server
//! config (`set_default` + `add_source(File)` + `set_override_option` per
//! env var), scaled down to the client-runtime surface this crate exposes.

use std::env;
use std::sync::OnceLock;

use config::Config;
use serde::Deserialize;

use crate::errors::{LicenseError, LicenseResult};

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// How the runtime behaves when it cannot reach the license server
/// (spec.md §4.7.4's offline fallback cascade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfflineFallbackMode {
    /// Never fall back; a network-class failure is a hard validation
    /// failure and propagates to the caller.
    Disabled,
    /// Try online first; fall back to the cached offline token only when
    /// the online attempt fails with a network-class error.
    NetworkOnly,
    /// Verify against the cached offline token first, skipping network I/O
    /// entirely, as long as a fresh-enough token is on hand.
    Always,
}

impl Default for OfflineFallbackMode {
    fn default() -> Self {
        OfflineFallbackMode::Disabled
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub api_key: String,
    pub product_slug: String,
    pub api_base_url: String,
    pub auto_validate_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub offline_fallback_mode: OfflineFallbackMode,
    pub max_offline_days: u32,
    pub max_clock_skew_ms: i64,
    pub storage_prefix: String,
    pub auto_initialize: bool,
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            product_slug: String::new(),
            api_base_url: "https://licenseseat.com/api/v1".to_string(),
            auto_validate_interval_secs: 3600,
            heartbeat_interval_secs: 300,
            max_retries: 3,
            retry_delay_ms: 1000,
            http_timeout_secs: 30,
            offline_fallback_mode: OfflineFallbackMode::Disabled,
            max_offline_days: 0,
            max_clock_skew_ms: crate::clock::DEFAULT_SKEW_TOLERANCE_MS,
            storage_prefix: "default".to_string(),
            auto_initialize: true,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    fn load() -> LicenseResult<Self> {
        let defaults = RuntimeConfig::default();

        let builder = Config::builder()
            .set_default("api_key", defaults.api_key.clone())
            .map_err(config_err)?
            .set_default("product_slug", defaults.product_slug.clone())
            .map_err(config_err)?
            .set_default("api_base_url", defaults.api_base_url.clone())
            .map_err(config_err)?
            .set_default("auto_validate_interval_secs", defaults.auto_validate_interval_secs as i64)
            .map_err(config_err)?
            .set_default("heartbeat_interval_secs", defaults.heartbeat_interval_secs as i64)
            .map_err(config_err)?
            .set_default("max_retries", defaults.max_retries as i64)
            .map_err(config_err)?
            .set_default("retry_delay_ms", defaults.retry_delay_ms as i64)
            .map_err(config_err)?
            .set_default("http_timeout_secs", defaults.http_timeout_secs as i64)
            .map_err(config_err)?
            .set_default("offline_fallback_mode", "disabled")
            .map_err(config_err)?
            .set_default("max_offline_days", defaults.max_offline_days as i64)
            .map_err(config_err)?
            .set_default("max_clock_skew_ms", defaults.max_clock_skew_ms)
            .map_err(config_err)?
            .set_default("storage_prefix", defaults.storage_prefix.clone())
            .map_err(config_err)?
            .set_default("auto_initialize", defaults.auto_initialize)
            .map_err(config_err)?
            .set_default("debug", defaults.debug)
            .map_err(config_err)?
            .add_source(config::File::with_name("licenseseat").required(false))
            .set_override_option("api_key", env::var("LICENSESEAT_API_KEY").ok())
            .map_err(config_err)?
            .set_override_option("product_slug", env::var("LICENSESEAT_PRODUCT_SLUG").ok())
            .map_err(config_err)?
            .set_override_option("api_base_url", env::var("LICENSESEAT_API_BASE_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "auto_validate_interval_secs",
                env::var("LICENSESEAT_AUTO_VALIDATE_INTERVAL_SECS").ok().and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "heartbeat_interval_secs",
                env::var("LICENSESEAT_HEARTBEAT_INTERVAL_SECS").ok().and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "max_retries",
                env::var("LICENSESEAT_MAX_RETRIES").ok().and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "retry_delay_ms",
                env::var("LICENSESEAT_RETRY_DELAY_MS").ok().and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "http_timeout_secs",
                env::var("LICENSESEAT_HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("offline_fallback_mode", env::var("LICENSESEAT_OFFLINE_FALLBACK_MODE").ok())
            .map_err(config_err)?
            .set_override_option(
                "max_offline_days",
                env::var("LICENSESEAT_MAX_OFFLINE_DAYS").ok().and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "max_clock_skew_ms",
                env::var("LICENSESEAT_MAX_CLOCK_SKEW_MS").ok().and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("storage_prefix", env::var("LICENSESEAT_STORAGE_PREFIX").ok())
            .map_err(config_err)?
            .set_override_option(
                "auto_initialize",
                env::var("LICENSESEAT_AUTO_INITIALIZE").ok().and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "debug",
                env::var("LICENSESEAT_DEBUG").ok().and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(config_err)?;

        let settings = builder.build().map_err(|e| {
            LicenseError::Configuration(format!("failed to build configuration: {e}"))
        })?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::Configuration(format!("failed to deserialize configuration: {e}")))
    }

    /// Per SPEC_FULL.md's Open Question 3 resolution: a missing
    /// `product_slug` is a hard `Configuration` error, raised explicitly
    /// here rather than discovered later as a confusing API rejection.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.product_slug.is_empty() {
            return Err(LicenseError::Configuration(
                "product_slug is required (set LICENSESEAT_PRODUCT_SLUG or licenseseat.toml's product_slug)".into(),
            ));
        }
        if self.api_key.is_empty() {
            return Err(LicenseError::Configuration(
                "api_key is required (set LICENSESEAT_API_KEY or licenseseat.toml's api_key)".into(),
            ));
        }
        if self.max_retries > 20 {
            return Err(LicenseError::Configuration(
                "max_retries must be 20 or fewer".into(),
            ));
        }
        Ok(())
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::Configuration(e.to_string())
}

/// Load, validate, and cache the global configuration. Subsequent calls
/// return the cached value; configuration is immutable for the process's
/// lifetime once loaded.
pub fn get_config() -> LicenseResult<&'static RuntimeConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = RuntimeConfig::load()?;
    config.validate()?;

    let _ = CONFIG.set(config);
    Ok(CONFIG.get().expect("config was just set"))
}
