//! Hardware fingerprints for license binding.
//!
//! Several independent identifiers are collected so that replacing one
//! component (a NIC, a disk) leaves enough of the binding intact. Each is
//! reported as `source:hash`, where `hash` is the first 16 bytes of the
//! SHA-256 of the raw identifier, hex encoded. Raw identifiers never leave
//! this module.

use crate::grant::FingerprintBinding;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Anything that can report the local machine's fingerprints.
pub trait FingerprintSource: Send + Sync {
    fn collect(&self) -> BTreeSet<String>;
}

/// Reads fingerprints from the running machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFingerprints;

impl FingerprintSource for LocalFingerprints {
    fn collect(&self) -> BTreeSet<String> {
        collect_local_fingerprints()
    }
}

/// A fixed set, for tooling that checks a grant against recorded values.
impl FingerprintSource for BTreeSet<String> {
    fn collect(&self) -> BTreeSet<String> {
        self.clone()
    }
}

/// Hashes one raw identifier into its `source:hash` form.
#[must_use]
pub fn fingerprint(source: &str, raw: &str) -> String {
    let digest = Sha256::digest(raw.trim().as_bytes());
    format!("{source}:{}", hex::encode(&digest[..16]))
}

/// Collects every readable fingerprint source. May block on OS queries.
#[must_use]
pub fn collect_local_fingerprints() -> BTreeSet<String> {
    let sources: [(&str, fn() -> Option<String>); 5] = [
        ("machine", machine_id),
        ("firmware", firmware_id),
        ("disk", disk_id),
        ("net", primary_mac),
        ("host", host_name),
    ];

    let mut out = BTreeSet::new();
    for (source, read) in sources {
        match read().filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => {
                out.insert(fingerprint(source, &raw));
            }
            None => debug!(source, "Fingerprint source unavailable"),
        }
    }
    out
}

/// `|binding ∩ local| >= min_matching`.
#[must_use]
pub fn matches(binding: &FingerprintBinding, local: &BTreeSet<String>) -> bool {
    let hits = binding.fingerprints.intersection(local).count();
    hits >= binding.min_matching as usize
}

/// Runs `source` on the blocking pool. Returns `None` if `shutdown` fires
/// (or its sender is dropped) before collection finishes.
pub async fn collect_cancellable(
    source: Arc<dyn FingerprintSource>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<BTreeSet<String>> {
    if *shutdown.borrow() {
        return None;
    }
    let task = tokio::task::spawn_blocking(move || source.collect());
    tokio::select! {
        joined = task => match joined {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(error = %e, "Fingerprint collection task failed");
                None
            }
        },
        _ = shutdown_signalled(shutdown) => {
            debug!("Fingerprint collection abandoned on shutdown");
            None
        }
    }
}

async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn host_name() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
}

#[cfg(target_os = "macos")]
fn ioreg_value(key: &str) -> Option<String> {
    command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"]).and_then(|out| {
        out.lines()
            .find(|l| l.contains(key))
            .and_then(|l| l.split('"').nth(3))
            .map(String::from)
    })
}

fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        ioreg_value("IOPlatformUUID")
    }

    #[cfg(target_os = "windows")]
    {
        command_output(
            "reg",
            &["query", r"HKLM\SOFTWARE\Microsoft\Cryptography", "/v", "MachineGuid"],
        )
        .and_then(|out| {
            out.lines()
                .find(|l| l.contains("MachineGuid"))
                .and_then(|l| l.split_whitespace().last())
                .map(String::from)
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

fn firmware_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        ["/sys/class/dmi/id/product_uuid", "/sys/class/dmi/id/board_serial"]
            .iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        ioreg_value("IOPlatformSerialNumber")
    }

    #[cfg(target_os = "windows")]
    {
        command_output("wmic", &["bios", "get", "serialnumber"])
            .and_then(|out| out.lines().nth(1).map(|l| l.trim().to_string()))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

fn disk_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let mut ids: Vec<String> = std::fs::read_dir("/dev/disk/by-id")
            .ok()?
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| !n.contains("-part") && !n.starts_with("dm-") && !n.starts_with("wwn-"))
            .collect();
        ids.sort();
        ids.into_iter().next()
    }

    #[cfg(target_os = "macos")]
    {
        command_output("diskutil", &["info", "/"]).and_then(|out| {
            out.lines()
                .find(|l| l.contains("Volume UUID"))
                .and_then(|l| l.split(':').nth(1))
                .map(|s| s.trim().to_string())
        })
    }

    #[cfg(target_os = "windows")]
    {
        command_output("cmd", &["/C", "vol", "C:"]).and_then(|out| {
            out.lines()
                .find(|l| l.contains("Serial Number"))
                .and_then(|l| l.split_whitespace().last())
                .map(String::from)
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

fn primary_mac() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let mut macs: Vec<String> = std::fs::read_dir("/sys/class/net")
            .ok()?
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != "lo")
            .filter_map(|e| std::fs::read_to_string(e.path().join("address")).ok())
            .map(|s| s.trim().to_lowercase())
            .filter(|m| is_usable_mac(m))
            .collect();
        macs.sort();
        macs.into_iter().next()
    }

    #[cfg(target_os = "macos")]
    {
        let out = command_output("ifconfig", &[])?;
        let mut macs: Vec<String> = out
            .lines()
            .filter_map(|l| l.trim().strip_prefix("ether "))
            .map(|m| m.trim().to_lowercase())
            .filter(|m| is_usable_mac(m))
            .collect();
        macs.sort();
        macs.into_iter().next()
    }

    #[cfg(target_os = "windows")]
    {
        let out = command_output("getmac", &["/fo", "csv", "/nh"])?;
        let mut macs: Vec<String> = out
            .lines()
            .filter_map(|l| l.split(',').next())
            .map(|m| m.trim_matches('"').replace('-', ":").to_lowercase())
            .filter(|m| is_usable_mac(m))
            .collect();
        macs.sort();
        macs.into_iter().next()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

#[allow(dead_code)]
fn is_usable_mac(mac: &str) -> bool {
    mac.len() == 17 && mac != "00:00:00:00:00:00"
}
