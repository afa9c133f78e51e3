//! Device and enclosure data read straight from sysfs. No process is
//! spawned and no command reaches the drive, so this source can never wake
//! a sleeping disk. Preferred identity source.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{Cache, Tier};

#[derive(Debug, Clone, Default)]
pub struct SysfsDevice {
    /// Kernel name: sda, sdb, ...
    pub name: String,
    /// /dev/sda
    pub path: String,
    /// From vpd_pg80 (bytes 4.., ASCII-filtered)
    pub serial: Option<String>,
    /// From wwid, naa./t10. prefix stripped
    pub wwn: Option<String>,
    /// From sas_address, 0x prefix stripped
    pub sas_address: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub firmware: Option<String>,
    /// 512-byte sectors
    pub size_sectors: Option<u64>,
    /// running, offline, blocked, ...
    pub state: Option<String>,
    pub hctl: Option<String>,
    /// maj:min from the block device
    pub maj_min: Option<String>,
    /// Slot number from the enclosure_device:Slot<N> symlink
    pub slot: Option<u32>,
    /// Enclosure H:C:T:L extracted from the enclosure symlink target
    pub enclosure_hctl: Option<String>,
}

impl SysfsDevice {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size_sectors.map(|s| s * 512)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SysfsSlot {
    pub number: u32,
    /// OK, not installed, ...
    pub status: Option<String>,
    pub locate: bool,
    pub fault: bool,
    pub active: bool,
    /// H:C:T:L of the device in this slot, if populated
    pub device_hctl: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SysfsEnclosure {
    /// Enclosure device H:C:T:L (the /sys/class/enclosure entry name)
    pub hctl: String,
    /// Enclosure id file contents (SAS address on SES enclosures)
    pub id: Option<String>,
    pub components: Option<u32>,
    pub slots: Vec<SysfsSlot>,
}

pub fn collect_devices(cache: &Cache) -> HashMap<String, SysfsDevice> {
    cache.get_or_insert_with("sysfs:devices", Tier::Fast, || {
        collect_devices_from(Path::new("/sys/block"))
    })
}

pub fn collect_devices_from(block_root: &Path) -> HashMap<String, SysfsDevice> {
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
        if let Some(dev) = read_device(&block_root.join(&name), &name) {
            devices.insert(name, dev);
        }
    }
    devices
}

fn read_device(block_path: &Path, name: &str) -> Option<SysfsDevice> {
    let device_path = block_path.join("device");
    if !device_path.exists() {
        return None;
    }

    let mut dev = SysfsDevice {
        name: name.to_string(),
        path: format!("/dev/{}", name),
        ..Default::default()
    };

    dev.model = read_trimmed(&device_path.join("model"));
    dev.vendor = read_trimmed(&device_path.join("vendor"));
    dev.firmware = read_trimmed(&device_path.join("rev"));
    dev.state = read_trimmed(&device_path.join("state"));
    dev.maj_min = read_trimmed(&block_path.join("dev"));

    if let Some(wwid) = read_trimmed(&device_path.join("wwid")) {
        let wwid = wwid.trim_start_matches("naa.").trim_start_matches("t10.");
        if !wwid.is_empty() {
            dev.wwn = Some(wwid.to_string());
        }
    }

    if let Some(sas) = read_trimmed(&device_path.join("sas_address")) {
        let sas = sas.trim_start_matches("0x");
        if !sas.is_empty() {
            dev.sas_address = Some(sas.to_string());
        }
    }

    if let Ok(raw) = fs::read(device_path.join("vpd_pg80")) {
        dev.serial = vpd_pg80_serial(&raw);
    }

    dev.size_sectors =
        read_trimmed(&block_path.join("size")).and_then(|s| s.parse::<u64>().ok());

    // H:C:T:L is the single entry name under scsi_device/
    if let Ok(mut entries) = fs::read_dir(device_path.join("scsi_device")) {
        if let Some(Ok(e)) = entries.next() {
            dev.hctl = Some(e.file_name().to_string_lossy().to_string());
        }
    }

    read_enclosure_link(&device_path, &mut dev);

    Some(dev)
}

/// The enclosure_device:Slot<N> symlink carries both the slot number and,
/// through its target path, the enclosure the drive sits in.
fn read_enclosure_link(device_path: &Path, dev: &mut SysfsDevice) {
    let entries = match fs::read_dir(device_path) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let fname = entry.file_name().to_string_lossy().to_string();
        let Some(slot_part) = fname.strip_prefix("enclosure_device:") else {
            continue;
        };
        if let Ok(n) = slot_part.trim_start_matches("Slot").trim().parse::<u32>() {
            dev.slot = Some(n);
        }

        if let Ok(target) = fs::read_link(entry.path()) {
            dev.enclosure_hctl = enclosure_hctl_from_target(&target);
        }
        break;
    }
}

/// Target looks like ../../../10:0:12:0/enclosure/10:0:12:0/Slot04; the
/// component after "enclosure" is the enclosure device H:C:T:L.
fn enclosure_hctl_from_target(target: &Path) -> Option<String> {
    let parts: Vec<String> =
        target.iter().map(|c| c.to_string_lossy().to_string()).collect();
    parts
        .iter()
        .position(|p| p == "enclosure")
        .and_then(|i| parts.get(i + 1))
        .cloned()
}

/// VPD page 0x80: 4-byte header, serial follows. Drop non-printable bytes.
pub fn vpd_pg80_serial(raw: &[u8]) -> Option<String> {
    if raw.len() <= 4 {
        return None;
    }
    let serial: String = raw[4..]
        .iter()
        .filter(|b| (32..127).contains(*b))
        .map(|b| *b as char)
        .collect();
    let serial = serial.trim().to_string();
    if serial.is_empty() {
        None
    } else {
        Some(serial)
    }
}

// ── Enclosures ───────────────────────────────────────────────────────

pub fn collect_enclosures(cache: &Cache) -> HashMap<String, SysfsEnclosure> {
    cache.get_or_insert_with("sysfs:enclosures", Tier::Slow, || {
        collect_enclosures_from(Path::new("/sys/class/enclosure"))
    })
}

pub fn collect_enclosures_from(root: &Path) -> HashMap<String, SysfsEnclosure> {
    let mut enclosures = HashMap::new();
    let entries = match fs::read_dir(root) {
        Ok(e) => e,
        Err(_) => return enclosures,
    };

    for entry in entries.flatten() {
        let hctl = entry.file_name().to_string_lossy().to_string();
        let enc_path = entry.path();

        let mut enc = SysfsEnclosure { hctl: hctl.clone(), ..Default::default() };
        enc.id = read_trimmed(&enc_path.join("id"));
        enc.components =
            read_trimmed(&enc_path.join("components")).and_then(|s| s.parse().ok());

        if let Ok(slot_entries) = fs::read_dir(&enc_path) {
            for slot_entry in slot_entries.flatten() {
                let slot_name = slot_entry.file_name().to_string_lossy().to_string();
                let Some(num) = slot_name.strip_prefix("Slot") else { continue };
                let Ok(number) = num.trim().parse::<u32>() else { continue };
                enc.slots.push(read_slot(&slot_entry.path(), number));
            }
        }
        enc.slots.sort_by_key(|s| s.number);

        enclosures.insert(hctl, enc);
    }
    enclosures
}

fn read_slot(slot_path: &Path, number: u32) -> SysfsSlot {
    let mut slot = SysfsSlot { number, ..Default::default() };
    slot.status = read_trimmed(&slot_path.join("status"));
    slot.locate = read_trimmed(&slot_path.join("locate")).as_deref() == Some("1");
    slot.fault = read_trimmed(&slot_path.join("fault")).as_deref() == Some("1");
    slot.active = read_trimmed(&slot_path.join("active")).as_deref() == Some("1");

    if let Ok(target) = fs::read_link(slot_path.join("device")) {
        slot.device_hctl = target
            .iter()
            .map(|c| c.to_string_lossy().to_string())
            .find(|p| p.matches(':').count() == 3);
    }
    slot
}

fn read_trimmed(path: &PathBuf) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::symlink;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn vpd_serial_skips_header_and_binary() {
        let mut raw = vec![0x00, 0x80, 0x00, 0x14];
        raw.extend_from_slice(b"  ZA1DKJT7\x00\x00");
        assert_eq!(vpd_pg80_serial(&raw), Some("ZA1DKJT7".to_string()));
        assert_eq!(vpd_pg80_serial(&[0, 1, 2]), None);
    }

    #[test]
    fn collects_device_fields_from_fake_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let block = tmp.path();
        let dev = block.join("sda/device");

        write(&dev.join("model"), "ST8000NM0075    \n");
        write(&dev.join("vendor"), "SEAGATE \n");
        write(&dev.join("state"), "running\n");
        write(&dev.join("wwid"), "naa.5000c500a6e7b82b\n");
        write(&dev.join("sas_address"), "0x5000c500a6e7b829\n");
        write(&block.join("sda/size"), "15628053168\n");
        write(&block.join("sda/dev"), "8:0\n");
        fs::create_dir_all(dev.join("scsi_device/10:0:3:0")).unwrap();

        let mut raw = vec![0u8; 4];
        raw.extend_from_slice(b"ZA1DKJT7");
        fs::write(dev.join("vpd_pg80"), &raw).unwrap();

        // Enclosure slot symlink: target path carries the enclosure HCTL
        let enc_target = block.join("enc/10:0:12:0/enclosure/10:0:12:0/Slot04");
        fs::create_dir_all(&enc_target).unwrap();
        symlink(&enc_target, dev.join("enclosure_device:Slot04")).unwrap();

        // Devices other than sd* are skipped
        fs::create_dir_all(block.join("loop0/device")).unwrap();

        let devices = collect_devices_from(block);
        assert_eq!(devices.len(), 1);
        let d = &devices["sda"];
        assert_eq!(d.path, "/dev/sda");
        assert_eq!(d.model.as_deref(), Some("ST8000NM0075"));
        assert_eq!(d.vendor.as_deref(), Some("SEAGATE"));
        assert_eq!(d.state.as_deref(), Some("running"));
        assert_eq!(d.wwn.as_deref(), Some("5000c500a6e7b82b"));
        assert_eq!(d.sas_address.as_deref(), Some("5000c500a6e7b829"));
        assert_eq!(d.serial.as_deref(), Some("ZA1DKJT7"));
        assert_eq!(d.size_bytes(), Some(15628053168 * 512));
        assert_eq!(d.hctl.as_deref(), Some("10:0:3:0"));
        assert_eq!(d.maj_min.as_deref(), Some("8:0"));
        assert_eq!(d.slot, Some(4));
        assert_eq!(d.enclosure_hctl.as_deref(), Some("10:0:12:0"));
    }

    #[test]
    fn collects_enclosure_slots() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let enc = root.join("10:0:12:0");

        write(&enc.join("id"), "5003048020b3fe7f\n");
        write(&enc.join("components"), "12\n");
        write(&enc.join("Slot00/status"), "OK\n");
        write(&enc.join("Slot00/locate"), "0\n");
        write(&enc.join("Slot00/fault"), "0\n");
        write(&enc.join("Slot01/status"), "not installed\n");
        write(&enc.join("Slot01/locate"), "1\n");

        let encs = collect_enclosures_from(root);
        assert_eq!(encs.len(), 1);
        let e = &encs["10:0:12:0"];
        assert_eq!(e.id.as_deref(), Some("5003048020b3fe7f"));
        assert_eq!(e.components, Some(12));
        assert_eq!(e.slots.len(), 2);
        assert_eq!(e.slots[0].number, 0);
        assert!(!e.slots[0].locate);
        assert!(e.slots[1].locate);
        assert_eq!(e.slots[1].status.as_deref(), Some("not installed"));
    }

    #[test]
    fn missing_root_yields_empty() {
        assert!(collect_devices_from(Path::new("/nonexistent/sys/block")).is_empty());
        assert!(collect_enclosures_from(Path::new("/nonexistent/enclosure")).is_empty());
    }
}
