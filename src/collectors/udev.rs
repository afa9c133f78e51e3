//! Identity data from the udev database at /run/udev/data. Reads files
//! only; never spawns udevadm and never touches the drive. Falls back to
//! parsing /dev/disk/by-* symlink names when the database is unreadable.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::cache::{Cache, Tier};

#[derive(Debug, Clone, Default)]
pub struct UdevDevice {
    /// /dev/sda
    pub dev_name: String,
    pub id_vendor: Option<String>,
    pub id_model: Option<String>,
    pub id_revision: Option<String>,
    /// Full serial, e.g. 35000c500a6e7b82b
    pub id_serial: Option<String>,
    pub id_serial_short: Option<String>,
    /// 0x prefix stripped
    pub id_wwn: Option<String>,
    pub id_wwn_ext: Option<String>,
    pub id_scsi_serial: Option<String>,
    /// scsi, ata, usb
    pub id_bus: Option<String>,
    /// pci-0000:0d:00.0-sas-exp0x...-phy0-lun-0
    pub id_path: Option<String>,
    pub dev_links: Vec<String>,
}

pub fn collect(cache: &Cache) -> HashMap<String, UdevDevice> {
    cache.get_or_insert_with("udev:devices", Tier::Slow, || {
        collect_from(Path::new("/sys/block"), Path::new("/run/udev/data"), Path::new("/dev/disk"))
    })
}

pub fn collect_from(
    block_root: &Path,
    udev_root: &Path,
    disk_by_root: &Path,
) -> HashMap<String, UdevDevice> {
    let mut devices = HashMap::new();
    let entries = match fs::read_dir(block_root) {
        Ok(e) => e,
        Err(_) => return devices,
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("sd") {
            continue;
        }

        let maj_min = match fs::read_to_string(block_root.join(&name).join("dev")) {
            Ok(s) => s.trim().to_string(),
            Err(_) => continue,
        };

        let db_file = udev_root.join(format!("b{}", maj_min));
        let dev = match fs::read_to_string(&db_file) {
            Ok(text) => parse_udev_data(&name, &text),
            Err(_) => from_symlinks(&name, disk_by_root),
        };
        devices.insert(name, dev);
    }
    devices
}

/// Parse the E: property lines of one udev database file.
pub fn parse_udev_data(name: &str, text: &str) -> UdevDevice {
    let mut dev = UdevDevice { dev_name: format!("/dev/{}", name), ..Default::default() };

    for line in text.lines() {
        let Some(rest) = line.strip_prefix("E:") else { continue };
        let Some((key, value)) = rest.split_once('=') else { continue };
        if value.is_empty() {
            continue;
        }
        match key {
            "ID_VENDOR" => dev.id_vendor = Some(value.to_string()),
            "ID_MODEL" => dev.id_model = Some(value.to_string()),
            "ID_REVISION" => dev.id_revision = Some(value.to_string()),
            "ID_SERIAL" => dev.id_serial = Some(value.to_string()),
            "ID_SERIAL_SHORT" => dev.id_serial_short = Some(value.to_string()),
            "ID_WWN" => dev.id_wwn = Some(value.trim_start_matches("0x").to_string()),
            "ID_WWN_WITH_EXTENSION" => {
                dev.id_wwn_ext = Some(value.trim_start_matches("0x").to_string())
            }
            "ID_SCSI_SERIAL" => dev.id_scsi_serial = Some(value.to_string()),
            "ID_BUS" => dev.id_bus = Some(value.to_string()),
            "ID_PATH" => dev.id_path = Some(value.to_string()),
            "DEVLINKS" => {
                dev.dev_links = value.split_whitespace().map(String::from).collect()
            }
            _ => {}
        }
    }
    dev
}

/// Fallback when the udev db is unreadable: recover what the by-id and
/// by-path symlink names encode.
fn from_symlinks(name: &str, disk_by_root: &Path) -> UdevDevice {
    let dev_path = format!("/dev/{}", name);
    let mut dev = UdevDevice { dev_name: dev_path.clone(), ..Default::default() };

    if let Ok(entries) = fs::read_dir(disk_by_root.join("by-id")) {
        for entry in entries.flatten() {
            let link = entry.path();
            let Ok(target) = fs::canonicalize(&link) else { continue };
            if target.to_string_lossy() != dev_path {
                continue;
            }
            dev.dev_links.push(link.to_string_lossy().to_string());
            let link_name = entry.file_name().to_string_lossy().to_string();
            apply_by_id_name(&link_name, &mut dev);
        }
    }

    if let Ok(entries) = fs::read_dir(disk_by_root.join("by-path")) {
        for entry in entries.flatten() {
            let link = entry.path();
            let Ok(target) = fs::canonicalize(&link) else { continue };
            if target.to_string_lossy() == dev_path {
                dev.id_path = Some(entry.file_name().to_string_lossy().to_string());
                dev.dev_links.push(link.to_string_lossy().to_string());
                break;
            }
        }
    }

    dev
}

/// Pull identity out of a by-id symlink name.
pub fn apply_by_id_name(link_name: &str, dev: &mut UdevDevice) {
    if let Some(wwn) = link_name.strip_prefix("wwn-") {
        dev.id_wwn = Some(wwn.trim_start_matches("0x").to_string());
    } else if let Some(serial) = link_name.strip_prefix("scsi-") {
        dev.id_serial = Some(serial.to_string());
    } else if let Some(rest) = link_name.strip_prefix("ata-") {
        // ata-ST8000NM0075_ZA1DKJT70000C907B6FF
        match rest.split_once('_') {
            Some((model, serial)) => {
                dev.id_model = Some(model.to_string());
                dev.id_scsi_serial = Some(serial.to_string());
            }
            None => dev.id_model = Some(rest.to_string()),
        }
    }
}
