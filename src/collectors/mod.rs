//! Probe adapters and the system snapshot that fans out across them.
//!
//! Each adapter wraps one external tool or kernel tree, parses its output
//! into typed records, and writes through the shared cache at the tier
//! matching the data's volatility. A missing tool yields empty data, never
//! an error.

pub mod diskby;
pub mod dm;
pub mod hba;
pub mod lsblk;
pub mod lsscsi;
pub mod lvm;
pub mod mdraid;
pub mod sas3ircu;
pub mod smart;
pub mod storcli;
pub mod sysfs;
pub mod udev;
pub mod zfs;

use std::collections::HashMap;
use std::thread;

use crate::cache::Cache;
use crate::config::Config;

/// One consistent view of the system, assembled by running every probe on
/// its own worker. Immutable for the life of one engine operation; rebuilt
/// from cache hits on the next.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Kernel name -> sysfs record
    pub sysfs: HashMap<String, sysfs::SysfsDevice>,
    /// Kernel name -> udev record
    pub udev: HashMap<String, udev::UdevDevice>,
    /// Device path -> lsblk record
    pub lsblk: HashMap<String, lsblk::LsblkDevice>,
    pub scsi: lsscsi::ScsiRoster,
    pub links: diskby::DiskByLinks,
    pub zfs: zfs::ZfsTopology,
    pub lvm: lvm::LvmState,
    pub md: Vec<mdraid::MdArray>,
    pub dm: Vec<dm::DmDevice>,
    pub hba: hba::HbaInventory,
}

/// Run all probes concurrently and merge. One slow adapter does not block
/// another; a failed adapter contributes empty data and the snapshot is
/// still built.
pub fn collect_system(cache: &Cache) -> SystemSnapshot {
    thread::scope(|s| {
        let h_sysfs = s.spawn(|| sysfs::collect_devices(cache));
        let h_udev = s.spawn(|| udev::collect(cache));
        let h_lsblk = s.spawn(|| lsblk::collect(cache));
        let h_scsi = s.spawn(|| lsscsi::collect(cache));
        let h_links = s.spawn(|| diskby::collect(cache));
        let h_zfs = s.spawn(|| zfs::collect(cache));
        let h_lvm = s.spawn(|| lvm::collect(cache));
        let h_md = s.spawn(|| mdraid::collect(cache));
        let h_dm = s.spawn(|| dm::collect(cache));
        let h_hba = s.spawn(|| hba::collect(cache));

        SystemSnapshot {
            sysfs: h_sysfs.join().unwrap_or_default(),
            udev: h_udev.join().unwrap_or_default(),
            lsblk: h_lsblk.join().unwrap_or_default(),
            scsi: h_scsi.join().unwrap_or_default(),
            links: h_links.join().unwrap_or_default(),
            zfs: h_zfs.join().unwrap_or_default(),
            lvm: h_lvm.join().unwrap_or_default(),
            md: h_md.join().unwrap_or_default(),
            dm: h_dm.join().unwrap_or_default(),
            hba: h_hba.join().unwrap_or_default(),
        }
    })
}

impl SystemSnapshot {
    /// sysfs record for a device path.
    pub fn sysfs_for(&self, device_path: &str) -> Option<&sysfs::SysfsDevice> {
        self.sysfs.get(device_path.trim_start_matches("/dev/"))
    }

    /// All physical disk device paths present in the snapshot.
    pub fn disk_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> =
            self.sysfs.values().map(|d| d.path.clone()).collect();
        for (path, dev) in &self.lsblk {
            if dev.dev_type == "disk" && !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths.sort();
        paths
    }
}

/// Discover the drive roster live when the config declares none: lsscsi
/// disk rows first, lsblk as fallback, exclude patterns applied.
pub fn discover_drives(cache: &Cache, config: &Config) -> Vec<(String, String)> {
    let roster = lsscsi::collect(cache);
    let mut drives: Vec<(String, String)> = roster
        .all
        .iter()
        .filter(|d| d.kind == "disk")
        .filter_map(|d| d.device.clone())
        .filter(|path| !config.is_excluded(path.trim_start_matches("/dev/")))
        .map(|path| {
            let name = path.trim_start_matches("/dev/").to_string();
            (path, name)
        })
        .collect();

    if drives.is_empty() {
        drives = lsblk::collect(cache)
            .into_iter()
            .filter(|(_, d)| d.dev_type == "disk")
            .filter(|(_, d)| !config.is_excluded(&d.name))
            .map(|(path, d)| (path, d.name))
            .collect();
    }

    drives.sort();
    drives
}
