//! qemu-nbd attachment session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::constants::nbd;
use crate::devices::{DeviceName, DevicePool};
use crate::errors::NbdMountError;
use crate::mount::tool::{NbdTool, QemuNbd};
use crate::mount::Mount;
use crate::options::NbdOptions;

/// One disk-image attachment session over an nbd device.
///
/// Holds at most one leased slot at a time. Whatever happens during
/// attachment, a slot is only retained once the device is confirmed up;
/// every failure path hands it straight back to the pool.
pub struct NbdMount {
    image: PathBuf,
    pool: Arc<DevicePool>,
    tool: Box<dyn NbdTool>,
    timeout_secs: u64,
    device: Option<DeviceName>,
    linked: bool,
    error: Option<NbdMountError>,
}

impl NbdMount {
    /// Session over the process-wide shared pool, driving the real
    /// qemu-nbd binary.
    pub fn new(image: impl Into<PathBuf>, options: &NbdOptions) -> Self {
        let pool = DevicePool::shared(options);
        let tool = Box::new(QemuNbd::new(options.run_as_root));
        Self::with_pool(image, pool, tool, options.timeout_secs)
    }

    /// Session over an explicit pool and tool.
    pub fn with_pool(
        image: impl Into<PathBuf>,
        pool: Arc<DevicePool>,
        tool: Box<dyn NbdTool>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            image: image.into(),
            pool,
            tool,
            timeout_secs,
            device: None,
            linked: false,
            error: None,
        }
    }

    /// Wait for the kernel to report the device as backed.
    ///
    /// qemu-nbd forks into the background without signaling readiness,
    /// so the liveness marker is re-checked once per second until the
    /// timeout runs out.
    fn wait_for_device(&self, device: &DeviceName) -> bool {
        for _ in 0..self.timeout_secs {
            if self.pool.is_attached(device) {
                return true;
            }
            thread::sleep(Duration::from_secs(nbd::POLL_INTERVAL_SECS));
        }
        self.pool.is_attached(device)
    }
}

impl Mount for NbdMount {
    fn get_dev(&mut self) -> bool {
        self.error = None;

        let device = match self.pool.allocate() {
            Ok(device) => device,
            Err(e) => {
                self.error = Some(e);
                return false;
            }
        };

        let node = self.pool.node_path(&device);
        tracing::debug!(
            device = %node.display(),
            image = %self.image.display(),
            "Get nbd device for image"
        );

        if let Err(e) = self.tool.attach(&node, &self.image) {
            // An attach that never succeeded must not hold the slot
            self.error = Some(e);
            self.pool.release(device);
            return false;
        }

        if !self.wait_for_device(&device) {
            self.error = Some(NbdMountError::DeviceTimeout(device.as_str().to_owned()));
            self.pool.release(device);
            return false;
        }

        self.device = Some(device);
        self.linked = true;
        true
    }

    fn unget_dev(&mut self) {
        if !self.linked {
            return;
        }

        if let Some(device) = self.device.take() {
            let node = self.pool.node_path(&device);
            tracing::debug!(device = %node.display(), "Release nbd device");
            if let Err(e) = self.tool.detach(&node) {
                // Swallowed so the slot always returns to the pool;
                // pool hygiene beats surfacing a best-effort cleanup error.
                tracing::warn!(
                    device = %node.display(),
                    error = %e,
                    "qemu-nbd disconnect failed"
                );
            }
            self.pool.release(device);
        }
        self.linked = false;
    }

    fn image(&self) -> &Path {
        &self.image
    }

    fn device(&self) -> Option<PathBuf> {
        self.device
            .as_ref()
            .map(|device| self.pool.node_path(device))
    }

    fn linked(&self) -> bool {
        self.linked
    }

    fn error(&self) -> Option<&NbdMountError> {
        self.error.as_ref()
    }
}
