//! Configuration for nbd attachment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::nbd;

/// Tunables for device discovery and attachment.
///
/// All fields have working defaults for a stock Linux host; tests point
/// the directory roots at fixture trees instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NbdOptions {
    /// Seconds to wait for a connected device to come up.
    ///
    /// qemu-nbd detaches into the background, so readiness is polled
    /// rather than signaled. Default: 10.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Invoke qemu-nbd through sudo.
    ///
    /// Connecting and disconnecting device nodes requires elevated
    /// privilege on most hosts. Default: true.
    #[serde(default = "default_run_as_root")]
    pub run_as_root: bool,

    /// Sysfs directory used for discovery and liveness checks.
    ///
    /// Default: /sys/block
    #[serde(default = "default_sys_block_dir")]
    pub sys_block_dir: PathBuf,

    /// Directory holding the device nodes handed to qemu-nbd.
    ///
    /// Default: /dev
    #[serde(default = "default_dev_dir")]
    pub dev_dir: PathBuf,
}

fn default_timeout_secs() -> u64 {
    nbd::DEFAULT_TIMEOUT_SECS
}

fn default_run_as_root() -> bool {
    true
}

fn default_sys_block_dir() -> PathBuf {
    PathBuf::from(nbd::SYS_BLOCK_DIR)
}

fn default_dev_dir() -> PathBuf {
    PathBuf::from(nbd::DEV_DIR)
}

impl Default for NbdOptions {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            run_as_root: default_run_as_root(),
            sys_block_dir: default_sys_block_dir(),
            dev_dir: default_dev_dir(),
        }
    }
}
