//! One-time discovery of nbd device slots.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::nbd;

/// Name of one kernel nbd slot (e.g. "nbd3").
///
/// Produced at discovery time from the sysfs entry name and immutable
/// afterwards; the pool hands these out and takes them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceName(String);

impl DeviceName {
    /// Parse a sysfs entry name, accepting only `nbd<digits>`.
    pub fn parse(name: &str) -> Option<Self> {
        let digits = name.strip_prefix(nbd::DEVICE_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(name.to_owned()))
    }

    /// The bare slot name (e.g. "nbd3").
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Slot index (3 for "nbd3"), used to order discovery results.
    pub fn index(&self) -> u32 {
        self.0[nbd::DEVICE_PREFIX.len()..].parse().unwrap_or(u32::MAX)
    }

    /// Device node handed to qemu-nbd (e.g. "/dev/nbd3").
    pub fn node_path(&self, dev_dir: &Path) -> PathBuf {
        dev_dir.join(&self.0)
    }

    /// Sysfs attribute present while the slot has a backing process.
    pub fn pid_path(&self, sys_block_dir: &Path) -> PathBuf {
        sys_block_dir.join(&self.0).join(nbd::PID_ATTRIBUTE)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scan the sysfs block directory for nbd device slots.
///
/// Returns the slots sorted by index, so a pool seeded from this list
/// pops the highest slot first. An absent directory yields an empty
/// list; whether that is a problem is decided at allocation time, when
/// kernel support is probed.
pub fn detect_devices(sys_block_dir: &Path) -> Vec<DeviceName> {
    let entries = match fs::read_dir(sys_block_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(
                dir = %sys_block_dir.display(),
                error = %e,
                "No block device directory, assuming no nbd devices"
            );
            return Vec::new();
        }
    };

    let mut devices: Vec<DeviceName> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| DeviceName::parse(&name))
        .collect();
    devices.sort_by_key(|device| device.index());

    tracing::debug!(count = devices.len(), "Detected nbd devices");
    devices
}
