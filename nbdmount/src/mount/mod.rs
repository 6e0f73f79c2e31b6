//! Disk-image attachment sessions.

mod nbd;
mod tool;

pub use nbd::NbdMount;
pub use tool::{NbdTool, QemuNbd};

use std::path::{Path, PathBuf};

use crate::errors::NbdMountError;

/// Contract between an attachment session and the disk-mount machinery
/// above it.
///
/// A session starts unlinked. `get_dev` leases a device and connects the
/// image to it; `unget_dev` disconnects and returns the device. Callers
/// wanting several images attached at once run one session per image,
/// each against the same shared pool.
pub trait Mount {
    /// Lease a device and attach the image to it.
    ///
    /// Returns true once the device is up; on false, [`Mount::error`]
    /// describes the failure and no device is held. No retry happens
    /// here; retry policy belongs to the caller.
    fn get_dev(&mut self) -> bool;

    /// Disconnect the device and return it to the pool.
    ///
    /// Safe to call repeatedly; calls after the first (or on a session
    /// that never linked) do nothing.
    fn unget_dev(&mut self);

    /// The disk image this session attaches.
    fn image(&self) -> &Path;

    /// The leased device node, while linked.
    fn device(&self) -> Option<PathBuf>;

    /// Whether the image is currently attached to a device.
    fn linked(&self) -> bool;

    /// The failure recorded by the most recent `get_dev` attempt.
    fn error(&self) -> Option<&NbdMountError>;
}
