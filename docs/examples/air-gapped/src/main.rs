//! # Air-Gapped / Offline Validation Example
//!
//! Demonstrates using licenseseat in environments where network connectivity
//! is intermittent or unavailable (industrial controllers, field deployments,
//! high-security networks).
//!
//! ## Key Concepts
//!
//! 1. **Encrypted cache**: every successful validation caches a signed
//!    offline token locally, encrypted with AES-256-GCM under a key derived
//!    from `storage_prefix`.
//! 2. **Offline fallback mode**: set `LICENSESEAT_OFFLINE_FALLBACK_MODE` to
//!    `network-only` (try the network, fall back to the cached token on
//!    failure) or `always` (verify the cached token first and skip the
//!    network call entirely).
//! 3. **Max offline age**: `LICENSESEAT_MAX_OFFLINE_DAYS` bounds how long a
//!    cached token is trusted without talking to the server again.
//!
//! ## Running This Example
//!
//! ```bash
//! # Phase 1: activate and validate online, populating the cache
//! LICENSESEAT_API_KEY=... LICENSESEAT_PRODUCT_SLUG=acme \
//!     LICENSESEAT_OFFLINE_FALLBACK_MODE=network-only \
//!     LICENSESEAT_MAX_OFFLINE_DAYS=14 \
//!     LICENSE_KEY="LIC-XXXX-XXXX-XXXX" cargo run
//!
//! # Phase 2: point at an unreachable server and validate again - this
//! # exercises the offline fallback path against the cached token
//! LICENSESEAT_API_BASE_URL=http://127.0.0.1:1 \
//!     LICENSESEAT_OFFLINE_FALLBACK_MODE=network-only \
//!     cargo run -- --offline
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use licenseseat::config::get_config;
use licenseseat::coordinator::Coordinator;
use licenseseat::http::ReqwestAdapter;
use licenseseat::storage::KeyringFileStorage;

fn get_license_file_path() -> PathBuf {
    PathBuf::from("license.key")
}

fn get_license_key() -> io::Result<String> {
    if let Ok(key) = std::env::var("LICENSE_KEY") {
        println!("using license key from LICENSE_KEY environment variable");
        return Ok(key.trim().to_string());
    }

    let license_path = get_license_file_path();
    if license_path.exists() {
        let key = std::fs::read_to_string(&license_path)?;
        let key = key.trim().to_string();
        if !key.is_empty() {
            println!("using saved license key from {:?}", license_path);
            return Ok(key);
        }
    }

    print!("License Key: ");
    io::stdout().flush()?;
    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim().to_string();

    if key.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "license key cannot be empty"));
    }

    std::fs::write(&license_path, &key)?;
    println!("license key saved to {:?} for future runs\n", license_path);
    Ok(key)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let offline_mode = args.iter().any(|a| a == "--offline" || a == "-o");

    let config = match get_config() {
        Ok(config) => config.clone(),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let http = Arc::new(ReqwestAdapter::new(Duration::from_secs(config.http_timeout_secs)));
    let storage = Arc::new(KeyringFileStorage::new(config.storage_prefix.clone()));
    let coordinator = Coordinator::new(config, http, storage);

    coordinator.initialize().await.expect("failed to initialize");

    if offline_mode {
        println!("=== Air-Gapped Example (OFFLINE MODE) ===\n");
        println!("validating against the cached offline token only\n");
        run_offline_check(&coordinator).await;
        return;
    }

    println!("=== Air-Gapped Example ===\n");
    println!("this phase connects to the server to populate the offline cache.");
    println!("once it succeeds, rerun with --offline against an unreachable server.\n");

    let license_key = match get_license_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("failed to get license key: {e}");
            std::process::exit(1);
        }
    };

    println!("Phase 1: initial online activation");
    println!("-----------------------------------");
    if let Err(e) = coordinator.activate(&license_key, Some(serde_json::json!("Air-gapped industrial controller"))).await {
        eprintln!("  activation failed: {e}");
        eprintln!("  for air-gapped systems, activate at least once while network is available");
        std::process::exit(1);
    }
    println!("  activated");

    match coordinator.validate().await {
        Ok(result) => println!("  validated and cached: valid={} offline={}", result.valid, result.offline),
        Err(e) => {
            eprintln!("  validation failed: {e}");
            std::process::exit(1);
        }
    }

    if let Err(e) = coordinator.heartbeat().await {
        eprintln!("  heartbeat failed (non-critical): {e}");
    } else {
        println!("  heartbeat recorded, extending the offline validity window");
    }
    println!();

    println!("Phase 2: offline operation (simulated against the same server)");
    println!("----------------------------------------------------------------");
    run_offline_check(&coordinator).await;

    print_best_practices();

    println!("=== Example Complete ===");
    println!("the offline token is now cached on disk. Point LICENSESEAT_API_BASE_URL");
    println!("at an unreachable host and rerun with --offline to see true offline validation.");
}

async fn run_offline_check(coordinator: &Coordinator) {
    match coordinator.validate().await {
        Ok(result) => {
            println!("  valid={} offline={} code={:?}", result.valid, result.offline, result.code);
            for key in ["basic", "export", "advanced", "premium"] {
                let enabled = coordinator.has_entitlement(key).await;
                println!("    {} {}", if enabled { "+" } else { "-" }, key);
            }
        }
        Err(e) => {
            eprintln!("  offline validation failed: {e}");
            eprintln!("  the cached token may be missing, expired, or past max_offline_days");
        }
    }
}

fn print_best_practices() {
    println!("\n=== Best Practices for Air-Gapped Systems ===\n");
    println!("1. Activate and validate while network is available to populate the cache.");
    println!("2. During maintenance windows, call heartbeat() and validate() to refresh it.");
    println!("3. Set offline_fallback_mode to network-only (fall back on failure) or always");
    println!("   (skip the network call whenever a fresh token is cached).");
    println!("4. Bound max_offline_days to the grace period your license terms allow.");
    println!("5. The cache is encrypted with a hardware-bound key and authenticated with");
    println!("   AES-256-GCM, so it cannot be copied to another device undetected.\n");
}
