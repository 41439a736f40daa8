//! Demo CLI driving the `licenseseat` runtime through a full activate →
//! validate → heartbeat cycle against a real server, reading configuration
//! from `licenseseat.toml`/`LICENSESEAT_*` env vars the same way an embedding
//! application would.
//!
//! Usage: `licenseseat_client <license-key> [--offline]`
//!
//! `--offline` skips straight to `validate()` without a prior `activate()`,
//! exercising the offline-fallback path against whatever was cached by a
//! previous run.

use std::sync::Arc;
use std::time::Duration;

use licenseseat::config::get_config;
use licenseseat::coordinator::Coordinator;
use licenseseat::http::ReqwestAdapter;
use licenseseat::storage::KeyringFileStorage;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let offline_mode = args.iter().any(|a| a == "--offline");
    let license_key = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with("--"))
        .cloned();

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

    if let Err(e) = coordinator.initialize().await {
        eprintln!("failed to initialize: {e}");
        std::process::exit(1);
    }

    let status = coordinator.get_status().await;
    println!("startup status: {:?} ({})", status.status, status.message);

    if !offline_mode {
        let Some(license_key) = license_key else {
            eprintln!("usage: licenseseat_client <license-key> [--offline]");
            std::process::exit(2);
        };

        println!("activating {license_key}...");
        match coordinator.activate(&license_key, None).await {
            Ok(result) => println!("activated: valid={}", result.valid),
            Err(e) => {
                eprintln!("activation failed: {e}");
                std::process::exit(1);
            }
        }
    }

    println!("validating...");
    match coordinator.validate().await {
        Ok(result) => println!(
            "validation: valid={} offline={} code={:?}",
            result.valid, result.offline, result.code
        ),
        Err(e) => eprintln!("validation failed: {e}"),
    }

    println!("heartbeat...");
    match coordinator.heartbeat().await {
        Ok(()) => println!("heartbeat ok"),
        Err(e) => eprintln!("heartbeat failed: {e}"),
    }

    let has_pro = coordinator.has_entitlement("pro").await;
    println!("entitlement 'pro' active: {has_pro}");
}
