//! Error types for nbd attachment.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type NbdMountResult<T> = Result<T, NbdMountError>;

/// Reported failure conditions of an attachment attempt.
///
/// Every variant is recoverable: the device involved has already been
/// returned to the pool (or was never taken) by the time the error
/// surfaces, and the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum NbdMountError {
    /// The kernel nbd module is not loaded (probe slot missing from sysfs).
    #[error("nbd unavailable: module not loaded")]
    ModuleUnavailable,

    /// The free pool is exhausted, or every remaining slot is already
    /// attached by some other process on the host.
    #[error("No free nbd devices")]
    NoFreeDevices,

    /// qemu-nbd reported an error while connecting the image.
    #[error("qemu-nbd error: {0}")]
    AttachTool(String),

    /// The device never exposed its backing-process marker within the
    /// configured timeout.
    #[error("nbd device {0} did not show up")]
    DeviceTimeout(String),
}
