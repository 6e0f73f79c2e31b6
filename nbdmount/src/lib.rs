//! Attach disk images to the host as network block devices.
//!
//! The kernel nbd driver exposes a fixed set of device slots
//! (`/dev/nbd0`, `/dev/nbd1`, ...). This crate leases one slot at a time
//! from a shared free pool, connects a disk image to it with `qemu-nbd`,
//! waits for the kernel to report the device as backed, and returns the
//! slot to the pool on release. The surrounding disk-mount machinery
//! drives everything through the [`Mount`] contract.
//!
//! ```no_run
//! use nbdmount::{Mount, NbdMount, NbdOptions};
//!
//! let options = NbdOptions::default();
//! let mut mount = NbdMount::new("/var/lib/images/guest.qcow2", &options);
//! if mount.get_dev() {
//!     // The image is now readable at mount.device() as a block device.
//!     mount.unget_dev();
//! }
//! ```
//!
//! Device pools are local to one process. Two processes each running their
//! own pool can race for the same slot; hosts with multiple consumers must
//! route them through a single shared pool instance.

pub mod constants;
pub mod devices;
pub mod errors;
pub mod mount;
pub mod options;

pub use devices::{DeviceName, DevicePool, detect_devices};
pub use errors::{NbdMountError, NbdMountResult};
pub use mount::{Mount, NbdMount, NbdTool, QemuNbd};
pub use options::NbdOptions;
