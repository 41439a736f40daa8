//! Device identifier derivation (spec.md §4.6).
//!
//! A device id must be stable across process restarts on the same machine
//! and distinct across machines, without itself being sensitive hardware
//! data the server needs to store verbatim. We gather the same
//! platform-specific stable attributes the teacher's CPU/motherboard-ID
//! lookup does, add the machine and user name for hosts where those IDs are
//! unavailable (containers, VMs with opaque firmware), and hash the
//! concatenation down to a 16-byte hex id.

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "linux")]
mod linux;

use sha2::{Digest, Sha256};

const DEVICE_ID_BYTES: usize = 16;

/// Derive this machine's stable device identifier.
pub fn get_device_id() -> String {
    let attributes = stable_attributes();
    let mut hasher = Sha256::new();
    hasher.update(b"licenseseat_device_v1:");
    for attribute in &attributes {
        hasher.update(attribute.as_bytes());
        hasher.update(b"\0");
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..DEVICE_ID_BYTES])
}

fn stable_attributes() -> Vec<String> {
    vec![
        get_cpu_id(),
        get_motherboard_id(),
        machine_name(),
        user_name(),
    ]
}

/// Best-effort human-readable device label for the Activate payload's
/// optional `device_name` (spec.md §6). Not guaranteed unique across
/// machines; `get_device_id` is the identifier the server actually binds.
pub fn device_name() -> String {
    machine_name()
}

fn machine_name() -> String {
    hostname_from_env().unwrap_or_else(|| "unknown-host".to_string())
}

fn hostname_from_env() -> Option<String> {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|s| !s.is_empty())
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown-user".to_string())
}

fn get_cpu_id() -> String {
    #[cfg(target_os = "windows")]
    {
        windows::get_cpu_id().unwrap_or_else(|_| "windows_cpu_unknown".to_string())
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_cpu_id().unwrap_or_else(|_| "macos_cpu_unknown".to_string())
    }
    #[cfg(target_os = "linux")]
    {
        linux::get_cpu_id().unwrap_or_else(|_| "linux_cpu_unknown".to_string())
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "unsupported_platform_cpu".to_string()
    }
}

fn get_motherboard_id() -> String {
    #[cfg(target_os = "windows")]
    {
        windows::get_motherboard_id().unwrap_or_else(|_| "windows_mb_unknown".to_string())
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_motherboard_id().unwrap_or_else(|_| "macos_mb_unknown".to_string())
    }
    #[cfg(target_os = "linux")]
    {
        linux::get_motherboard_id().unwrap_or_else(|_| "linux_mb_unknown".to_string())
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "unsupported_platform_mb".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_stable_across_calls() {
        assert_eq!(get_device_id(), get_device_id());
    }

    #[test]
    fn device_id_is_16_bytes_hex() {
        let id = get_device_id();
        assert_eq!(id.len(), DEVICE_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn differing_attributes_produce_differing_ids() {
        let mut hasher_a = Sha256::new();
        hasher_a.update(b"licenseseat_device_v1:");
        hasher_a.update(b"cpu-a\0board-a\0host-a\0user-a\0");

        let mut hasher_b = Sha256::new();
        hasher_b.update(b"licenseseat_device_v1:");
        hasher_b.update(b"cpu-b\0board-b\0host-b\0user-b\0");

        assert_ne!(hasher_a.finalize(), hasher_b.finalize());
    }
}
