//! # Basic licenseseat Client Example
//!
//! Demonstrates the core license lifecycle with a license key entered at
//! runtime - no recompilation required to change keys.
//!
//! ## How License Keys Work
//!
//! 1. User purchases/receives a license key (e.g., "LIC-A1B2-C3D4-E5F6-G7H8")
//! 2. User enters the key into your app (first run dialog, config file, etc.)
//! 3. Your app calls `activate()` to bind the key to this device
//! 4. Done - the license is now active on their machine
//!
//! ## Running This Example
//!
//! ```bash
//! LICENSESEAT_API_KEY=... LICENSESEAT_PRODUCT_SLUG=acme \
//!     LICENSE_KEY="LIC-XXXX-XXXX-XXXX" cargo run
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

/// Get the license key from (in order of priority):
/// 1. Environment variable (LICENSE_KEY)
/// 2. Saved license file (from previous run)
/// 3. User prompt (first run)
fn get_license_key() -> io::Result<String> {
    if let Ok(key) = std::env::var("LICENSE_KEY") {
        println!("Using license key from LICENSE_KEY environment variable");
        return Ok(key.trim().to_string());
    }

    let license_path = get_license_file_path();
    if license_path.exists() {
        let key = std::fs::read_to_string(&license_path)?;
        let key = key.trim().to_string();
        if !key.is_empty() {
            println!("Using saved license key from {:?}", license_path);
            return Ok(key);
        }
    }

    println!("\nNo license key found. Please enter your license key.");
    println!("(You can also set the LICENSE_KEY environment variable)\n");
    print!("License Key: ");
    io::stdout().flush()?;

    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim().to_string();

    if key.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "license key cannot be empty"));
    }

    std::fs::write(&license_path, &key)?;
    println!("License key saved to {:?} for future runs\n", license_path);
    Ok(key)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    println!("=== licenseseat Basic Client Example ===\n");

    let license_key = match get_license_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("failed to get license key: {e}");
            std::process::exit(1);
        }
    };

    let config = match get_config() {
        Ok(config) => config.clone(),
        Err(e) => {
            eprintln!("configuration error: {e}");
            eprintln!("set LICENSESEAT_API_KEY and LICENSESEAT_PRODUCT_SLUG");
            std::process::exit(1);
        }
    };

    println!("Server URL: {}", config.api_base_url);
    println!("License Key: {}...\n", &license_key[..license_key.len().min(12)]);

    let http = Arc::new(ReqwestAdapter::new(Duration::from_secs(config.http_timeout_secs)));
    let storage = Arc::new(KeyringFileStorage::new(config.storage_prefix.clone()));
    let coordinator = Coordinator::new(config, http, storage);

    if let Err(e) = coordinator.initialize().await {
        eprintln!("failed to initialize: {e}");
        std::process::exit(1);
    }

    println!("Step 1: Activating license on this device...");
    match coordinator.activate(&license_key, Some(serde_json::json!("Basic client example"))).await {
        Ok(result) => println!("  activated: valid={}\n", result.valid),
        Err(e) => {
            eprintln!("  activation failed: {e}");
            eprintln!("  possible causes: wrong key, already bound elsewhere, or seat limit reached");
            std::process::exit(1);
        }
    }

    println!("Step 2: Validating license...");
    match coordinator.validate().await {
        Ok(result) => println!("  valid={} offline={} code={:?}\n", result.valid, result.offline, result.code),
        Err(e) => eprintln!("  validation failed: {e}\n"),
    }

    println!("Step 3: Checking entitlements...");
    for key in ["basic", "export", "premium", "analytics"] {
        let enabled = coordinator.has_entitlement(key).await;
        println!("  {key} - {}", if enabled { "enabled" } else { "disabled" });
    }
    println!();

    println!("Step 4: Sending heartbeat...");
    match coordinator.heartbeat().await {
        Ok(()) => println!("  heartbeat ok\n"),
        Err(e) => eprintln!("  heartbeat failed: {e}\n"),
    }

    println!("Step 5: Deactivating license...");
    match coordinator.deactivate().await {
        Ok(()) => println!("  license deactivated; the seat is now free for another device"),
        Err(e) => eprintln!("  deactivation failed: {e}"),
    }

    println!("\n=== Example Complete ===");
}
