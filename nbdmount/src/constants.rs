//! Constants for the host nbd surfaces and the external tool.
//!
//! Centralized location for the fixed paths and names the kernel and
//! qemu-nbd expose. Tests redirect the directory roots through
//! [`NbdOptions`](crate::options::NbdOptions) instead of patching these.

/// Kernel-exposed nbd surfaces.
pub mod nbd {
    /// Sysfs directory enumerating block devices present on the host.
    pub const SYS_BLOCK_DIR: &str = "/sys/block";

    /// Directory holding device nodes.
    pub const DEV_DIR: &str = "/dev";

    /// Name prefix of nbd device slots (nbd0, nbd1, ...).
    pub const DEVICE_PREFIX: &str = "nbd";

    /// Sysfs attribute present while a slot has a backing process.
    pub const PID_ATTRIBUTE: &str = "pid";

    /// Slot whose sysfs entry signals kernel nbd support.
    pub const PROBE_DEVICE: &str = "nbd0";

    /// Default seconds to wait for a connected device to come up.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// Seconds between readiness polls.
    pub const POLL_INTERVAL_SECS: u64 = 1;
}

/// External tool invocation.
pub mod tool {
    /// Binary that connects and disconnects nbd devices.
    pub const QEMU_NBD: &str = "qemu-nbd";

    /// Privilege elevation wrapper.
    pub const SUDO: &str = "sudo";
}
