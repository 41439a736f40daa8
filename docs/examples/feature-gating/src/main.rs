//! # Feature Gating Example
//!
//! Demonstrates how to gate application features on the entitlements granted
//! by a license. Useful for:
//!
//! - **Tiered pricing**: Basic vs Pro vs Enterprise features
//! - **Add-on modules**: Export, Analytics, Integrations, etc.
//! - **Trial limitations**: Limited features during a trial period
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

/// Application features gated by entitlement key.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Feature {
    Basic,
    Export,
    Analytics,
    Premium,
    Api,
    Whitelabel,
}

impl Feature {
    fn key(&self) -> &'static str {
        match self {
            Feature::Basic => "basic",
            Feature::Export => "export",
            Feature::Analytics => "analytics",
            Feature::Premium => "premium",
            Feature::Api => "api",
            Feature::Whitelabel => "whitelabel",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Feature::Basic => "Core application functionality",
            Feature::Export => "Export data to CSV, JSON, Excel",
            Feature::Analytics => "Advanced analytics and reporting dashboards",
            Feature::Premium => "Priority support and extended features",
            Feature::Api => "REST API access for integrations",
            Feature::Whitelabel => "Custom branding and white-label options",
        }
    }
}

const ALL_FEATURES: [Feature; 6] = [
    Feature::Basic,
    Feature::Export,
    Feature::Analytics,
    Feature::Premium,
    Feature::Api,
    Feature::Whitelabel,
];

async fn export_data(coordinator: &Coordinator, format: &str) -> Result<String, String> {
    if !coordinator.has_entitlement(Feature::Export.key()).await {
        return Err(format!("export feature not available; upgrade your license to access {format} export"));
    }
    Ok(format!("exported data to {format} format! (1,234 records)"))
}

async fn generate_report(coordinator: &Coordinator, report_type: &str) -> Result<String, String> {
    if !coordinator.has_entitlement(Feature::Analytics.key()).await {
        return Err("analytics feature not available; upgrade to pro or enterprise for advanced reports".into());
    }
    Ok(format!("generated {report_type} report with 15 charts and 42 insights"))
}

async fn get_api_key(coordinator: &Coordinator) -> Result<String, String> {
    if !coordinator.has_entitlement(Feature::Api.key()).await {
        return Err("api access not available; contact sales to add api access to your license".into());
    }
    Ok("api key issued (use this in your integrations)".into())
}

async fn contact_priority_support(coordinator: &Coordinator) -> Result<String, String> {
    if !coordinator.has_entitlement(Feature::Premium.key()).await {
        return Err("priority support not available; upgrade to premium for 24/7 dedicated support".into());
    }
    Ok("priority support ticket created; our team will respond within 1 hour".into())
}

fn get_license_file_path() -> PathBuf {
    PathBuf::from("license.key")
}

fn get_license_key() -> io::Result<String> {
    if let Ok(key) = std::env::var("LICENSE_KEY") {
        return Ok(key.trim().to_string());
    }

    let license_path = get_license_file_path();
    if license_path.exists() {
        let key = std::fs::read_to_string(&license_path)?;
        let key = key.trim().to_string();
        if !key.is_empty() {
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
    Ok(key)
}

#[tokio::main]
async fn main() {
    println!("=== licenseseat Feature Gating Example ===\n");

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
            std::process::exit(1);
        }
    };

    let http = Arc::new(ReqwestAdapter::new(Duration::from_secs(config.http_timeout_secs)));
    let storage = Arc::new(KeyringFileStorage::new(config.storage_prefix.clone()));
    let coordinator = Coordinator::new(config, http, storage);

    coordinator.initialize().await.expect("failed to initialize");

    println!("Step 1: Activating license...");
    if let Err(e) = coordinator.activate(&license_key, Some(serde_json::json!("Feature demo app"))).await {
        eprintln!("  activation failed: {e}");
        std::process::exit(1);
    }
    coordinator.validate().await.expect("validation failed");
    println!("  license active\n");

    println!("Step 2: Checking feature availability...\n");
    println!("{:<12} {:<8} description", "feature", "status");
    for feature in ALL_FEATURES {
        let enabled = coordinator.has_entitlement(feature.key()).await;
        let status = if enabled { "on" } else { "off" };
        println!("{:<12} {:<8} {}", feature.key(), status, feature.description());
    }
    println!();

    println!("Step 3: Attempting to use gated features...\n");
    match export_data(&coordinator, "csv").await {
        Ok(msg) => println!("  export: {msg}"),
        Err(msg) => println!("  export blocked: {msg}"),
    }
    match generate_report(&coordinator, "monthly sales").await {
        Ok(msg) => println!("  analytics: {msg}"),
        Err(msg) => println!("  analytics blocked: {msg}"),
    }
    match get_api_key(&coordinator).await {
        Ok(msg) => println!("  api: {msg}"),
        Err(msg) => println!("  api blocked: {msg}"),
    }
    match contact_priority_support(&coordinator).await {
        Ok(msg) => println!("  support: {msg}"),
        Err(msg) => println!("  support blocked: {msg}"),
    }
    println!();

    let mut missing = Vec::new();
    for feature in ALL_FEATURES {
        if !coordinator.has_entitlement(feature.key()).await {
            missing.push(feature);
        }
    }
    if !missing.is_empty() {
        println!("{} feature(s) could be unlocked by upgrading:", missing.len());
        for feature in missing {
            println!("  - {} ({})", feature.key(), feature.description());
        }
        println!();
    }

    println!("Step 4: Deactivating license...");
    if let Err(e) = coordinator.deactivate().await {
        eprintln!("  deactivation failed (non-critical): {e}");
    } else {
        println!("  license deactivated");
    }

    println!("\n=== Example Complete ===");
}
