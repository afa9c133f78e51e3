//! Drive fusion: composes one DriveRecord per device from the snapshot
//! layers, in fixed priority order, honouring the state gate. For each
//! field the first non-empty source wins, with three exceptions: the gate
//! is authoritative for `state`, SMART metrics come only from the gated
//! attribute read, and the HBA wins enclosure/slot over the sysfs hint.

use std::thread;

use crate::cache::Cache;
use crate::collectors::{smart, zfs, SystemSnapshot};
use crate::gate;
use crate::inventory::Store;
use crate::models::drive::{DriveRecord, DriveState, Protocol};

/// Fuse a single drive, running the state gate and (when permitted) the
/// SMART attribute read.
pub fn fuse_drive(
    cache: &Cache,
    snap: &SystemSnapshot,
    device_path: &str,
    store: Option<&Store>,
) -> DriveRecord {
    let mut record = assemble(snap, device_path);

    let sysfs_state = snap
        .sysfs_for(device_path)
        .and_then(|d| d.state.as_deref().map(str::to_string));
    record.state = gate::drive_state(cache, sysfs_state.as_deref(), device_path);

    // Standby-safe identity backfill: works even for a sleeping drive
    if record.state.is_present() && record.serial.is_none() {
        apply_identity(&mut record, &smart::identity(cache, device_path));
    }

    if gate::allows_attribute_read(record.state) {
        if let Some(attrs) = smart::read_attributes(cache, device_path) {
            apply_smart(&mut record, &attrs);
        }
    }

    if record.state == DriveState::Missing {
        backfill_missing(&mut record, store);
    }
    record.clear_live_fields_if_not_live();
    record
}

/// Fuse all devices, one worker each, against the shared snapshot.
pub fn fuse_all(
    cache: &Cache,
    snap: &SystemSnapshot,
    devices: &[String],
    store: Option<&Store>,
) -> Vec<DriveRecord> {
    thread::scope(|s| {
        let handles: Vec<_> = devices
            .iter()
            .map(|dev| s.spawn(move || fuse_drive(cache, snap, dev, store)))
            .collect();
        handles
            .into_iter()
            .zip(devices)
            .map(|(h, dev)| h.join().unwrap_or_else(|_| DriveRecord::new(dev)))
            .collect()
    })
}

/// Steps 1-5, 8-9: everything that does not depend on the gate verdict.
pub fn assemble(snap: &SystemSnapshot, device_path: &str) -> DriveRecord {
    let mut r = DriveRecord::new(device_path);

    // 1. sysfs: preferred identity source, never wakes a drive
    if let Some(d) = snap.sysfs_for(device_path) {
        r.serial = d.serial.clone();
        r.wwn = d.wwn.clone();
        r.sas_address = d.sas_address.clone();
        r.model = d.model.clone();
        r.vendor = d.vendor.clone();
        r.firmware = d.firmware.clone();
        r.size_bytes = d.size_bytes();
        r.scsi_hctl = d.hctl.clone();
        // Location hint; the HBA overrides this when it knows better
        r.slot = d.slot;
    }

    // 2. udev database
    if let Some(d) = snap.udev.get(&r.kernel_name) {
        prefer(&mut r.serial, d.id_serial_short.clone());
        prefer(&mut r.wwn, d.id_wwn.clone());
        prefer(&mut r.model, d.id_model.clone());
        prefer(&mut r.vendor, d.id_vendor.clone());
        prefer(&mut r.firmware, d.id_revision.clone());
        if r.protocol.is_none() {
            r.protocol = d.id_bus.as_deref().map(Protocol::from_transport);
        }
    }

    // 3. block-layout probe
    if let Some(d) = snap.lsblk.get(device_path) {
        prefer(&mut r.serial, d.serial.clone());
        prefer(&mut r.wwn, d.wwn.clone());
        prefer(&mut r.model, d.model.clone());
        prefer(&mut r.vendor, d.vendor.clone());
        prefer(&mut r.firmware, d.rev.clone());
        prefer(&mut r.scsi_hctl, d.hctl.clone());
        if r.size_bytes.is_none() {
            r.size_bytes = d.size;
        }
        if r.protocol.is_none() {
            r.protocol = d.tran.as_deref().map(Protocol::from_transport);
        }
        prefer(&mut r.fs_type, d.fs_type.clone());
        prefer(&mut r.fs_uuid, d.fs_uuid.clone());
        prefer(&mut r.fs_label, d.fs_label.clone());
        prefer(&mut r.part_uuid, d.part_uuid.clone());
        prefer(&mut r.part_label, d.part_label.clone());
    }

    // 4. scsi-generic roster: hctl confirmation plus name backfill
    if let Some(d) = snap.scsi.by_device.get(device_path) {
        prefer(&mut r.scsi_hctl, Some(d.hctl.clone()));
        prefer(&mut r.vendor, d.vendor.clone());
        prefer(&mut r.model, d.model.clone());
        prefer(&mut r.firmware, d.rev.clone());
    }

    // 5. by-* symlink walker
    if let Some(ids) = snap.links.by_id.get(device_path) {
        r.by_id_paths = ids.clone();
    }
    if let Some(paths) = snap.links.by_path.get(device_path) {
        r.by_path_paths = paths.clone();
    }

    // 8. storage-stack correlation
    if let Some(link) = snap.zfs.links.iter().find(|l| l.device_path == device_path) {
        r.zpool = Some(link.pool.clone());
        r.vdev_type = Some(link.vdev_type.clone());
        r.vdev_guid = link.vdev_guid.clone();
        r.zfs_errors = Some(link.errors);
    }
    if let Some(pv) = snap
        .lvm
        .pvs
        .iter()
        .find(|pv| zfs::normalize_device_path(&pv.name) == device_path)
    {
        r.lvm_pv = Some(pv.name.clone());
        r.lvm_vg = pv.vg_name.clone();
    }

    // 9. HBA roster by serial: authoritative for physical location
    if let Some(serial) = r.serial.clone() {
        if let Some(h) = snap.hba.device_by_serial(&serial) {
            r.controller_id = Some(h.controller_id.clone());
            r.enclosure_id = Some(h.enclosure_id);
            r.slot = Some(h.slot);
            prefer(&mut r.sas_address, h.sas_address.clone());
            prefer(&mut r.serial_vpd, h.serial_vpd.clone());
            prefer(&mut r.wwn, h.wwn.clone());
            prefer(&mut r.model, h.model.clone());
            prefer(&mut r.vendor, h.vendor.clone());
            prefer(&mut r.firmware, h.firmware.clone());
            prefer(&mut r.link_speed, h.link_speed.clone());
            if r.size_bytes.is_none() {
                r.size_bytes = h.size_bytes;
            }
            r.sector_size = h.sector_size;
            r.media_type = h.media_type;
            r.media_errors = h.media_errors;
            if r.protocol.is_none() {
                r.protocol = h.protocol;
            }
        }
    }

    r
}

fn apply_identity(r: &mut DriveRecord, id: &smart::SmartIdentity) {
    prefer(&mut r.serial, id.serial.clone());
    prefer(&mut r.wwn, id.wwn.clone());
    prefer(&mut r.luid, id.luid.clone());
    prefer(&mut r.model, id.model.clone());
    prefer(&mut r.vendor, id.vendor.clone());
    prefer(&mut r.firmware, id.firmware.clone());
    if r.size_bytes.is_none() {
        r.size_bytes = id.size_bytes;
    }
}

/// Step 7: attribute data, only ever called after the gate said active.
/// A standby indicator in the output means the drive fell asleep between
/// the gate and the read; downgrade instead of keeping stale data.
pub fn apply_smart(r: &mut DriveRecord, attrs: &smart::SmartAttributes) {
    if attrs.standby_indicator {
        tracing::debug!(device = %r.device_path, "standby race after gate, downgrading");
        r.state = DriveState::Standby;
        return;
    }
    r.smart_health = attrs.health;
    r.temperature_c = attrs.temperature_c;
    r.power_on_hours = attrs.power_on_hours;
    r.reallocated = attrs.reallocated;
    r.pending_sectors = attrs.pending_sectors;
}

/// Missing drives carry identity and location only from the inventory
/// store, looked up by last-known device path.
fn backfill_missing(r: &mut DriveRecord, store: Option<&Store>) {
    let Some(store) = store else { return };
    let row = store
        .drive_by_device_path(&r.device_path)
        .or_else(|| r.serial.as_deref().and_then(|s| store.drive_by_serial(s)));
    let Some(row) = row else { return };

    prefer(&mut r.serial, Some(row.serial.clone()));
    prefer(&mut r.serial_vpd, row.serial_vpd.clone());
    prefer(&mut r.model, row.model.clone());
    if r.enclosure_id.is_none() {
        r.enclosure_id = row.enclosure_id;
    }
    if r.slot.is_none() {
        r.slot = row.slot;
    }
}

impl DriveRecord {
    fn clear_live_fields_if_not_live(&mut self) {
        if !matches!(self.state, DriveState::Active) {
            self.clear_live_fields();
        }
    }
}

fn prefer(dst: &mut Option<String>, src: Option<String>) {
    if dst.is_none() {
        *dst = src.filter(|s| !s.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::lsblk::LsblkDevice;
    use crate::collectors::sysfs::SysfsDevice;
    use crate::collectors::zfs::VdevLink;
    use crate::inventory::DriveRow;
    use crate::models::drive::{SmartHealth, ZfsErrors};
    use crate::models::hba::HbaDrive;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn snapshot() -> SystemSnapshot {
        let mut snap = SystemSnapshot::default();

        snap.sysfs.insert(
            "sda".to_string(),
            SysfsDevice {
                name: "sda".to_string(),
                path: "/dev/sda".to_string(),
                serial: Some("ZA1DKJT7".to_string()),
                wwn: Some("5000c500a6e7b82b".to_string()),
                model: Some("ST8000NM0075".to_string()),
                state: Some("running".to_string()),
                hctl: Some("10:0:3:0".to_string()),
                slot: Some(9),
                ..Default::default()
            },
        );

        snap.lsblk.insert(
            "/dev/sda".to_string(),
            LsblkDevice {
                name: "sda".to_string(),
                path: "/dev/sda".to_string(),
                dev_type: "disk".to_string(),
                serial: Some("DIFFERENT".to_string()),
                size: Some(8_001_563_222_016),
                tran: Some("sas".to_string()),
                fs_type: Some("zfs_member".to_string()),
                fs_label: Some("tank".to_string()),
                ..Default::default()
            },
        );

        snap.zfs.links.push(VdevLink {
            pool: "tank".to_string(),
            pool_state: "ONLINE".to_string(),
            device_path: "/dev/sda".to_string(),
            raw_path: "/dev/sda1".to_string(),
            vdev_type: "raidz2".to_string(),
            vdev_guid: Some("9413058431145097813".to_string()),
            errors: ZfsErrors { read: 0, write: 0, cksum: 2 },
        });

        let mut hba_drive = HbaDrive::new("c0", 2, 5);
        hba_drive.serial = "ZA1DKJT7".to_string();
        hba_drive.serial_vpd = Some("ZA1DKJT70000C907B6FF".to_string());
        hba_drive.sector_size = Some(512);
        hba_drive.link_speed = Some("12.0Gb/s".to_string());
        snap.hba.drives.insert("ZA1DKJT7".to_string(), hba_drive);

        snap
    }

    #[test]
    fn sysfs_wins_over_lsblk_and_hba_wins_location() {
        let snap = snapshot();
        let r = assemble(&snap, "/dev/sda");

        // sysfs serial beats the conflicting lsblk serial
        assert_eq!(r.serial.as_deref(), Some("ZA1DKJT7"));
        // size only available from lsblk
        assert_eq!(r.size_bytes, Some(8_001_563_222_016));
        assert_eq!(r.protocol, Some(Protocol::Sas));
        // HBA location overrides the sysfs slot hint (9)
        assert_eq!(r.enclosure_id, Some(2));
        assert_eq!(r.slot, Some(5));
        assert_eq!(r.controller_id.as_deref(), Some("c0"));
        assert_eq!(r.serial_vpd.as_deref(), Some("ZA1DKJT70000C907B6FF"));
        // ZFS correlation
        assert_eq!(r.zpool.as_deref(), Some("tank"));
        assert_eq!(r.vdev_type.as_deref(), Some("raidz2"));
        assert_eq!(r.zfs_errors.unwrap().cksum, 2);
        assert_eq!(r.fs_label.as_deref(), Some("tank"));
    }

    #[test]
    fn smart_apply_fills_metrics() {
        let snap = snapshot();
        let mut r = assemble(&snap, "/dev/sda");
        r.state = DriveState::Active;

        apply_smart(
            &mut r,
            &smart::SmartAttributes {
                health: SmartHealth::Passed,
                temperature_c: Some(38),
                power_on_hours: Some(34817),
                reallocated: None,
                pending_sectors: None,
                standby_indicator: false,
            },
        );
        assert_eq!(r.temperature_c, Some(38));
        assert_eq!(r.smart_health, SmartHealth::Passed);
        assert_eq!(r.power_on_hours, Some(34817));
    }

    #[test]
    fn standby_race_downgrades_without_attributes() {
        let snap = snapshot();
        let mut r = assemble(&snap, "/dev/sda");
        r.state = DriveState::Active;

        apply_smart(
            &mut r,
            &smart::SmartAttributes { standby_indicator: true, ..Default::default() },
        );
        assert_eq!(r.state, DriveState::Standby);
        assert_eq!(r.temperature_c, None);
        assert_eq!(r.smart_health, SmartHealth::Unknown);
    }

    #[test]
    fn missing_drive_backfills_from_store_only() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Store::open(tmp.path()).unwrap();
        store.upsert_drive(DriveRow {
            serial: "WCK5NWKQ".to_string(),
            serial_vpd: None,
            model: Some("ST8000NM0075".to_string()),
            vendor: None,
            firmware: None,
            size_bytes: None,
            protocol: None,
            media_type: None,
            controller_id: Some("c0".to_string()),
            enclosure_id: Some(2),
            slot: Some(5),
            sas_address: None,
            device_path: Some("/dev/sdq".to_string()),
            wwn: None,
            zpool: None,
            vdev_type: None,
            vdev_guid: None,
            state: DriveState::Active,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        });

        let snap = SystemSnapshot::default();
        let mut r = assemble(&snap, "/dev/sdq");
        r.state = DriveState::Missing;
        r.temperature_c = Some(40);
        backfill_missing(&mut r, Some(&store));
        r.clear_live_fields_if_not_live();

        assert_eq!(r.serial.as_deref(), Some("WCK5NWKQ"));
        assert_eq!(r.enclosure_id, Some(2));
        assert_eq!(r.slot, Some(5));
        // Missing drives carry no live data
        assert_eq!(r.temperature_c, None);
        assert_eq!(r.smart_health, SmartHealth::Unknown);
        assert_eq!(r.power_on_hours, None);
        assert_eq!(r.zfs_errors, None);
    }
}
