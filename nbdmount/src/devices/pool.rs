//! Shared free pool of nbd device slots.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::devices::inventory::{DeviceName, detect_devices};
use crate::errors::{NbdMountError, NbdMountResult};
use crate::options::NbdOptions;

/// Process-wide pool, detected once on first use.
static SHARED_POOL: OnceLock<Arc<DevicePool>> = OnceLock::new();

/// The free set of nbd device slots, shared by every mount in a process.
///
/// A slot is absent from the free list exactly while one mount holds it;
/// every pop and push happens under one mutex, and `allocate` holds that
/// mutex across its whole pop-and-check loop, so two mounts in the same
/// process can never lease the same slot.
///
/// The liveness check only observes slots attached by *any* process on
/// the host; it does not serialize against a second, independent pool in
/// another process racing for the same slot. Callers sharing a host must
/// share one pool instance.
pub struct DevicePool {
    sys_block_dir: PathBuf,
    dev_dir: PathBuf,
    free: Mutex<Vec<DeviceName>>,
}

impl DevicePool {
    /// Discover the host's nbd slots and build a pool over them.
    pub fn detect(options: &NbdOptions) -> Self {
        let devices = detect_devices(&options.sys_block_dir);
        Self::with_devices(devices, options)
    }

    /// Build a pool over an explicit slot list.
    ///
    /// The list is used as a stack: the last entry is allocated first.
    pub fn with_devices(devices: Vec<DeviceName>, options: &NbdOptions) -> Self {
        Self {
            sys_block_dir: options.sys_block_dir.clone(),
            dev_dir: options.dev_dir.clone(),
            free: Mutex::new(devices),
        }
    }

    /// The process-wide pool, running discovery on first call.
    ///
    /// Discovery must not rerun once slots have been leased (a rescan
    /// would reintroduce leased slots as free), so the first caller's
    /// options win and every later call returns the same pool.
    pub fn shared(options: &NbdOptions) -> Arc<Self> {
        SHARED_POOL
            .get_or_init(|| Arc::new(Self::detect(options)))
            .clone()
    }

    /// Lease the most recently released free slot.
    ///
    /// Slots whose liveness marker is present were attached behind our
    /// back by some other process; those are dropped from the pool and
    /// the next candidate is tried. They re-enter the pool only if the
    /// holder releases them through [`DevicePool::release`].
    pub fn allocate(&self) -> NbdMountResult<DeviceName> {
        if !self.module_loaded() {
            return Err(NbdMountError::ModuleUnavailable);
        }

        let mut free = self.free.lock();
        while let Some(device) = free.pop() {
            if self.is_attached(&device) {
                tracing::debug!(%device, "Skipping nbd device already in use");
                continue;
            }
            return Ok(device);
        }
        Err(NbdMountError::NoFreeDevices)
    }

    /// Return a slot to the free set.
    ///
    /// The slot may already be present when teardown runs a second time
    /// (e.g. crash recovery right after a restart); it is never added
    /// twice.
    pub fn release(&self, device: DeviceName) {
        let mut free = self.free.lock();
        if !free.contains(&device) {
            free.push(device);
        }
    }

    /// Whether the slot currently has a backing process.
    pub fn is_attached(&self, device: &DeviceName) -> bool {
        device.pid_path(&self.sys_block_dir).exists()
    }

    /// Device node for a slot (e.g. "/dev/nbd3").
    pub fn node_path(&self, device: &DeviceName) -> PathBuf {
        device.node_path(&self.dev_dir)
    }

    /// Number of slots currently free.
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Snapshot of the free set, in stack order.
    pub fn free_devices(&self) -> Vec<DeviceName> {
        self.free.lock().clone()
    }

    fn module_loaded(&self) -> bool {
        self.sys_block_dir
            .join(crate::constants::nbd::PROBE_DEVICE)
            .exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn fixture(slots: &[&str]) -> (TempDir, NbdOptions) {
        let tmp = TempDir::new().unwrap();
        for slot in slots {
            std::fs::create_dir(tmp.path().join(slot)).unwrap();
        }
        let options = NbdOptions {
            sys_block_dir: tmp.path().to_path_buf(),
            ..NbdOptions::default()
        };
        (tmp, options)
    }

    fn names(devices: &[&str]) -> Vec<DeviceName> {
        devices
            .iter()
            .map(|name| DeviceName::parse(name).unwrap())
            .collect()
    }

    #[test]
    fn test_allocate_is_lifo() {
        let (_tmp, options) = fixture(&["nbd0", "nbd1"]);
        let pool = DevicePool::with_devices(names(&["nbd0", "nbd1"]), &options);

        assert_eq!(pool.allocate().unwrap().as_str(), "nbd1");
        assert_eq!(pool.allocate().unwrap().as_str(), "nbd0");
        assert!(matches!(
            pool.allocate(),
            Err(NbdMountError::NoFreeDevices)
        ));
    }

    #[test]
    fn test_allocate_empty_pool_leaves_state_unchanged() {
        let (_tmp, options) = fixture(&["nbd0"]);
        let pool = DevicePool::with_devices(Vec::new(), &options);

        assert!(matches!(
            pool.allocate(),
            Err(NbdMountError::NoFreeDevices)
        ));
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_allocate_without_module() {
        // No nbd0 entry in sysfs means no kernel support
        let (_tmp, options) = fixture(&[]);
        let pool = DevicePool::with_devices(names(&["nbd0", "nbd1"]), &options);

        assert!(matches!(
            pool.allocate(),
            Err(NbdMountError::ModuleUnavailable)
        ));
        // Nothing was consumed
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_allocate_skips_attached_slot() {
        let (tmp, options) = fixture(&["nbd0", "nbd1"]);
        std::fs::write(tmp.path().join("nbd1/pid"), "4242").unwrap();
        let pool = DevicePool::with_devices(names(&["nbd0", "nbd1"]), &options);

        // nbd1 is in use elsewhere, so nbd0 is handed out and nbd1 dropped
        assert_eq!(pool.allocate().unwrap().as_str(), "nbd0");
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_allocate_all_slots_attached() {
        let (tmp, options) = fixture(&["nbd0", "nbd1"]);
        std::fs::write(tmp.path().join("nbd0/pid"), "1").unwrap();
        std::fs::write(tmp.path().join("nbd1/pid"), "2").unwrap();
        let pool = DevicePool::with_devices(names(&["nbd0", "nbd1"]), &options);

        assert!(matches!(
            pool.allocate(),
            Err(NbdMountError::NoFreeDevices)
        ));
    }

    #[test]
    fn test_release_never_duplicates() {
        let (_tmp, options) = fixture(&["nbd0", "nbd1"]);
        let pool = DevicePool::with_devices(names(&["nbd0", "nbd1"]), &options);

        // Releasing a slot the pool has never seen appends it once
        let stray = DeviceName::parse("nbd7").unwrap();
        pool.release(stray.clone());
        pool.release(stray);

        let free: Vec<String> = pool
            .free_devices()
            .iter()
            .map(|d| d.as_str().to_owned())
            .collect();
        assert_eq!(free, ["nbd0", "nbd1", "nbd7"]);
    }

    #[test]
    fn test_release_makes_slot_allocatable_again() {
        let (_tmp, options) = fixture(&["nbd0"]);
        let pool = DevicePool::with_devices(names(&["nbd0"]), &options);

        let device = pool.allocate().unwrap();
        assert_eq!(pool.free_count(), 0);

        pool.release(device);
        assert_eq!(pool.allocate().unwrap().as_str(), "nbd0");
    }

    #[test]
    fn test_shared_pool_is_a_singleton() {
        let (_tmp, options) = fixture(&["nbd0", "nbd1"]);
        let first = DevicePool::shared(&options);

        // A second call with different options still returns the first pool
        let (_tmp2, other_options) = fixture(&["nbd0"]);
        let second = DevicePool::shared(&other_options);
        assert!(Arc::ptr_eq(&first, &second));
    }

    proptest! {
        /// For any allocate/release sequence, free + leased is always a
        /// partition of the original inventory: nothing lost, nothing
        /// duplicated, never more leases than slots.
        #[test]
        fn prop_pool_conserves_devices(ops in prop::collection::vec(any::<bool>(), 1..64)) {
            let (_tmp, options) = fixture(&["nbd0", "nbd1", "nbd2", "nbd3"]);
            let inventory = names(&["nbd0", "nbd1", "nbd2", "nbd3"]);
            let pool = DevicePool::with_devices(inventory.clone(), &options);
            let mut leased: Vec<DeviceName> = Vec::new();

            for allocate in ops {
                if allocate {
                    match pool.allocate() {
                        Ok(device) => {
                            prop_assert!(!leased.contains(&device));
                            leased.push(device);
                        }
                        Err(NbdMountError::NoFreeDevices) => {
                            prop_assert_eq!(leased.len(), inventory.len());
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {}", e),
                    }
                } else if let Some(device) = leased.pop() {
                    pool.release(device);
                }

                prop_assert!(leased.len() <= inventory.len());
                let free = pool.free_devices();
                prop_assert_eq!(free.len() + leased.len(), inventory.len());
                let mut all: Vec<DeviceName> = free;
                all.extend(leased.iter().cloned());
                all.sort_by_key(|d| d.index());
                prop_assert_eq!(&all, &inventory);
            }
        }
    }
}
