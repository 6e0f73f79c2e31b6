//! External qemu-nbd invocation.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::constants::tool;
use crate::errors::{NbdMountError, NbdMountResult};

/// The two privileged invocations an attachment session needs.
///
/// Production uses [`QemuNbd`]; tests substitute their own
/// implementation to simulate tool failures and device readiness.
pub trait NbdTool: Send + Sync {
    /// Connect `image` to `device`.
    ///
    /// The tool forks into the background on success, so returning Ok
    /// only means the connect was accepted; the device comes up later.
    fn attach(&self, device: &Path, image: &Path) -> NbdMountResult<()>;

    /// Disconnect `device`. Best-effort; callers tolerate failure.
    fn detach(&self, device: &Path) -> NbdMountResult<()>;
}

/// Drives the real qemu-nbd binary.
#[derive(Debug, Clone)]
pub struct QemuNbd {
    binary: PathBuf,
    run_as_root: bool,
}

impl QemuNbd {
    pub fn new(run_as_root: bool) -> Self {
        Self::with_binary(tool::QEMU_NBD, run_as_root)
    }

    /// Use a specific qemu-nbd binary instead of resolving via PATH.
    pub fn with_binary(binary: impl Into<PathBuf>, run_as_root: bool) -> Self {
        Self {
            binary: binary.into(),
            run_as_root,
        }
    }

    fn command(&self) -> Command {
        if self.run_as_root {
            let mut command = Command::new(tool::SUDO);
            command.arg("-n").arg(&self.binary);
            command
        } else {
            Command::new(&self.binary)
        }
    }
}

impl NbdTool for QemuNbd {
    fn attach(&self, device: &Path, image: &Path) -> NbdMountResult<()> {
        let output = self
            .command()
            .arg("-c")
            .arg(device)
            .arg(image)
            .output()
            .map_err(|e| NbdMountError::AttachTool(format!("failed to run qemu-nbd: {}", e)))?;

        // qemu-nbd signals connect problems on stderr even when it still
        // exits zero after forking, so any stderr output counts as failure.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !output.status.success() || !stderr.is_empty() {
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr.to_owned()
            };
            return Err(NbdMountError::AttachTool(message));
        }
        Ok(())
    }

    fn detach(&self, device: &Path) -> NbdMountResult<()> {
        let output = self
            .command()
            .arg("-d")
            .arg(device)
            .output()
            .map_err(|e| NbdMountError::AttachTool(format!("failed to run qemu-nbd: {}", e)))?;

        // Exit status is observed for diagnostics only; disconnect is
        // best-effort and the device goes back to the pool regardless.
        tracing::debug!(
            device = %device.display(),
            status = %output.status,
            "qemu-nbd disconnect finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_missing_binary_reports_tool_error() {
        let tool = QemuNbd::with_binary("/nonexistent/qemu-nbd", false);
        let err = tool
            .attach(Path::new("/dev/nbd0"), Path::new("/tmp/image.qcow2"))
            .unwrap_err();
        match err {
            NbdMountError::AttachTool(message) => {
                assert!(message.contains("failed to run qemu-nbd"));
            }
            other => panic!("expected AttachTool, got {:?}", other),
        }
    }

    #[test]
    fn test_detach_missing_binary_reports_tool_error() {
        let tool = QemuNbd::with_binary("/nonexistent/qemu-nbd", false);
        assert!(tool.detach(Path::new("/dev/nbd0")).is_err());
    }
}
