//! Universal identifier index: reverse maps from every known identifier
//! kind to an entity key, plus an entity table keyed by device path (or a
//! synthetic key for pools, datasets and volume groups).
//!
//! Resolution order matters: unique identifiers (serials, WWNs, GUIDs)
//! resolve before broader names and labels, so a pool named "tank" is
//! never shadowed by a filesystem label "tank".

pub mod entity;

pub use entity::{DeviceEntity, EntityKind, IdentifierKind};

use std::collections::HashMap;
use std::path::Path;

use crate::collectors::{zfs, SystemSnapshot};
use crate::error::EngineError;

/// Reverse-map resolution order, most specific first. Symlinks and direct
/// device paths are tried before any of these.
pub const LOOKUP_ORDER: &[IdentifierKind] = &[
    IdentifierKind::KernelName,
    IdentifierKind::Serial,
    IdentifierKind::SerialVpd,
    IdentifierKind::Wwn,
    IdentifierKind::Luid,
    IdentifierKind::Nguid,
    IdentifierKind::Eui64,
    IdentifierKind::ScsiHctl,
    IdentifierKind::MajMin,
    IdentifierKind::PartUuid,
    IdentifierKind::FsUuid,
    IdentifierKind::ZfsPoolGuid,
    IdentifierKind::ZfsDatasetGuid,
    IdentifierKind::ZfsVdevGuid,
    IdentifierKind::LvmPvUuid,
    IdentifierKind::LvmVgUuid,
    IdentifierKind::LvmLvUuid,
    IdentifierKind::MdArrayUuid,
    IdentifierKind::DmUuid,
    IdentifierKind::ById,
    IdentifierKind::ByPath,
    IdentifierKind::ZfsPoolName,
    IdentifierKind::ZfsDatasetName,
    IdentifierKind::LvmVgName,
    IdentifierKind::LvmLvName,
    IdentifierKind::LvmLvPath,
    IdentifierKind::MdName,
    IdentifierKind::DmName,
    IdentifierKind::PartLabel,
    IdentifierKind::FsLabel,
];

#[derive(Debug, Default)]
pub struct DeviceIndex {
    /// Entity key -> entity. Keys are device paths for block devices and
    /// "zfs:pool:<name>"-style synthetic keys otherwise.
    pub entities: HashMap<String, DeviceEntity>,
    maps: HashMap<IdentifierKind, HashMap<String, String>>,
    symlink_map: HashMap<String, String>,
}

impl DeviceIndex {
    /// Build the index from one system snapshot.
    pub fn build(snap: &SystemSnapshot) -> DeviceIndex {
        let mut idx = DeviceIndex::default();
        idx.add_disks(snap);
        idx.add_zfs(snap);
        idx.add_lvm(snap);
        idx.add_md(snap);
        idx.add_dm(snap);
        idx.symlink_map = snap.links.symlink_to_device.clone();
        idx.build_reverse_maps();
        idx
    }

    /// Resolve a query to an entity and the identifier kind that matched.
    pub fn lookup(&self, query: &str) -> Result<(&DeviceEntity, IdentifierKind), EngineError> {
        // 1. Direct hit on a device path or synthetic entity key
        if let Some(e) = self.entities.get(query) {
            return Ok((e, IdentifierKind::DevicePath));
        }

        // 2. Known symlink, then live symlink resolution
        if let Some(target) = self.symlink_map.get(query) {
            if let Some(e) = self.entities.get(target) {
                return Ok((e, IdentifierKind::Symlink));
            }
        }
        if query.starts_with('/') {
            if let Ok(resolved) = std::fs::canonicalize(Path::new(query)) {
                let resolved = resolved.to_string_lossy().to_string();
                if resolved != query {
                    if let Some(e) = self.entities.get(&resolved) {
                        return Ok((e, IdentifierKind::Symlink));
                    }
                }
            }
        }

        // 3. Reverse maps in specificity order
        for kind in LOOKUP_ORDER {
            if let Some(key) = self.maps.get(kind).and_then(|m| m.get(query)) {
                if let Some(e) = self.entities.get(key) {
                    return Ok((e, *kind));
                }
            }
        }

        Err(EngineError::NotFound(query.to_string()))
    }

    pub fn entity(&self, key: &str) -> Option<&DeviceEntity> {
        self.entities.get(key)
    }

    fn insert(&mut self, kind: IdentifierKind, value: &str, key: &str) {
        if value.is_empty() {
            return;
        }
        self.maps
            .entry(kind)
            .or_default()
            .entry(value.to_string())
            .or_insert_with(|| key.to_string());
    }

    // ── Entity construction ──────────────────────────────────────────

    fn add_disks(&mut self, snap: &SystemSnapshot) {
        for path in snap.disk_paths() {
            let mut e = DeviceEntity::new(EntityKind::Disk);
            e.device_path = Some(path.clone());
            e.kernel_name = Some(path.trim_start_matches("/dev/").to_string());

            if let Some(d) = snap.sysfs_for(&path) {
                e.serial = d.serial.clone();
                e.wwn = d.wwn.clone();
                e.model = d.model.clone();
                e.vendor = d.vendor.clone();
                e.scsi_hctl = d.hctl.clone();
                e.maj_min = d.maj_min.clone();
                e.size_bytes = d.size_bytes();
            }
            if let Some(d) = snap.udev.get(e.kernel_name.as_deref().unwrap_or_default()) {
                fill(&mut e.serial, d.id_serial_short.clone());
                fill(&mut e.wwn, d.id_wwn.clone());
                fill(&mut e.luid, d.id_serial.clone());
                fill(&mut e.model, d.id_model.clone());
                fill(&mut e.vendor, d.id_vendor.clone());
                fill(&mut e.transport, d.id_bus.clone());
            }
            if let Some(d) = snap.lsblk.get(&path) {
                fill(&mut e.serial, d.serial.clone());
                fill(&mut e.wwn, d.wwn.clone());
                fill(&mut e.model, d.model.clone());
                fill(&mut e.vendor, d.vendor.clone());
                fill(&mut e.scsi_hctl, d.hctl.clone());
                fill(&mut e.maj_min, d.maj_min.clone());
                fill(&mut e.transport, d.tran.clone());
                if e.size_bytes.is_none() {
                    e.size_bytes = d.size;
                }
                e.fs_type = d.fs_type.clone();
                e.fs_uuid = d.fs_uuid.clone();
                e.fs_label = d.fs_label.clone();
                e.part_uuid = d.part_uuid.clone();
                e.part_label = d.part_label.clone();
            }
            if let Some(d) = snap.scsi.by_device.get(&path) {
                fill(&mut e.scsi_hctl, Some(d.hctl.clone()));
            }

            if let Some(ids) = snap.links.by_id.get(&path) {
                e.by_id = ids.clone();
                for link in ids {
                    apply_link_identity(link, &mut e);
                }
            }
            if let Some(paths) = snap.links.by_path.get(&path) {
                e.by_path = paths.clone();
            }

            if let Some(serial) = e.serial.clone() {
                if let Some(h) = snap.hba.device_by_serial(&serial) {
                    fill(&mut e.serial_vpd, h.serial_vpd.clone());
                    fill(&mut e.wwn, h.wwn.clone());
                }
            }

            if let Some(link) = snap.zfs.links.iter().find(|l| l.device_path == path) {
                e.zfs_pool_name = Some(link.pool.clone());
                e.zfs_pool_guid = snap.zfs.pool_guids.get(&link.pool).cloned();
                e.zfs_vdev_guid = link.vdev_guid.clone();
            }
            if let Some(pv) = snap
                .lvm
                .pvs
                .iter()
                .find(|pv| zfs::normalize_device_path(&pv.name) == path)
            {
                e.lvm_pv_uuid = pv.uuid.clone();
                e.lvm_vg_name = pv.vg_name.clone();
            }

            self.entities.insert(path, e);
        }

        // Filesystem identifiers living on partitions resolve to the base
        // disk entity
        for (uuid, dev) in &snap.links.by_uuid {
            let base = zfs::normalize_device_path(dev);
            if let Some(e) = self.entities.get_mut(&base) {
                fill(&mut e.fs_uuid, Some(uuid.clone()));
            }
        }
        for (label, dev) in &snap.links.by_label {
            let base = zfs::normalize_device_path(dev);
            if let Some(e) = self.entities.get_mut(&base) {
                fill(&mut e.fs_label, Some(label.clone()));
            }
        }
        for (uuid, dev) in &snap.links.by_partuuid {
            let base = zfs::normalize_device_path(dev);
            if let Some(e) = self.entities.get_mut(&base) {
                fill(&mut e.part_uuid, Some(uuid.clone()));
            }
        }
        for (label, dev) in &snap.links.by_partlabel {
            let base = zfs::normalize_device_path(dev);
            if let Some(e) = self.entities.get_mut(&base) {
                fill(&mut e.part_label, Some(label.clone()));
            }
        }
    }

    fn add_zfs(&mut self, snap: &SystemSnapshot) {
        for pool in &snap.zfs.pools {
            let mut e = DeviceEntity::new(EntityKind::ZfsPool);
            e.zfs_pool_name = Some(pool.name.clone());
            e.zfs_pool_guid = snap.zfs.pool_guids.get(&pool.name).cloned();
            self.entities.insert(format!("zfs:pool:{}", pool.name), e);
        }
        for (name, guid) in &snap.zfs.datasets {
            let mut e = DeviceEntity::new(EntityKind::ZfsDataset);
            e.zfs_dataset_name = Some(name.clone());
            e.zfs_dataset_guid = Some(guid.clone());
            let pool = name.split('/').next().unwrap_or(name);
            e.zfs_pool_name = Some(pool.to_string());
            e.zfs_pool_guid = snap.zfs.pool_guids.get(pool).cloned();
            self.entities.insert(format!("zfs:dataset:{}", name), e);
        }
    }

    fn add_lvm(&mut self, snap: &SystemSnapshot) {
        for vg in &snap.lvm.vgs {
            let mut e = DeviceEntity::new(EntityKind::LvmVg);
            e.lvm_vg_name = Some(vg.name.clone());
            e.lvm_vg_uuid = vg.uuid.clone();
            self.entities.insert(format!("lvm:vg:{}", vg.name), e);
        }
        for lv in &snap.lvm.lvs {
            let mut e = DeviceEntity::new(EntityKind::LvmLv);
            e.lvm_lv_name = Some(lv.name.clone());
            e.lvm_lv_uuid = lv.uuid.clone();
            e.lvm_lv_path = lv.path.clone();
            e.lvm_vg_name = lv.vg_name.clone();
            e.device_path = lv.path.clone();
            let key = lv
                .path
                .clone()
                .unwrap_or_else(|| format!("lvm:lv:{}", lv.name));
            self.entities.insert(key, e);
        }
    }

    fn add_md(&mut self, snap: &SystemSnapshot) {
        for arr in &snap.md {
            let mut e = DeviceEntity::new(EntityKind::MdArray);
            e.device_path = Some(arr.device.clone());
            e.kernel_name = Some(arr.kernel_name.clone());
            e.md_name = arr.name.clone();
            e.md_array_uuid = arr.uuid.clone();
            self.entities.insert(arr.device.clone(), e);
        }
    }

    fn add_dm(&mut self, snap: &SystemSnapshot) {
        for dm in &snap.dm {
            let mut e = DeviceEntity::new(EntityKind::DmDevice);
            e.device_path = Some(dm.device_path.clone());
            e.dm_name = Some(dm.name.clone());
            e.dm_uuid = dm.uuid.clone();
            e.maj_min = dm.maj_min.clone();
            self.entities.insert(dm.device_path.clone(), e);
        }
    }

    fn build_reverse_maps(&mut self) {
        let entries: Vec<(String, DeviceEntity)> =
            self.entities.iter().map(|(k, e)| (k.clone(), e.clone())).collect();

        for (key, e) in &entries {
            let ins = |idx: &mut Self, kind, value: &Option<String>| {
                if let Some(v) = value {
                    idx.insert(kind, v, key);
                }
            };

            if let Some(name) = &e.kernel_name {
                self.insert(IdentifierKind::KernelName, name, key);
            }
            ins(self, IdentifierKind::Serial, &e.serial);
            ins(self, IdentifierKind::SerialVpd, &e.serial_vpd);
            ins(self, IdentifierKind::Wwn, &e.wwn);
            ins(self, IdentifierKind::Luid, &e.luid);
            ins(self, IdentifierKind::Nguid, &e.nguid);
            ins(self, IdentifierKind::Eui64, &e.eui64);
            ins(self, IdentifierKind::ScsiHctl, &e.scsi_hctl);
            ins(self, IdentifierKind::MajMin, &e.maj_min);
            ins(self, IdentifierKind::FsUuid, &e.fs_uuid);
            ins(self, IdentifierKind::FsLabel, &e.fs_label);
            ins(self, IdentifierKind::PartUuid, &e.part_uuid);
            ins(self, IdentifierKind::PartLabel, &e.part_label);

            for link in &e.by_id {
                self.insert(IdentifierKind::ById, link, key);
                if let Some(name) = link.rsplit('/').next() {
                    self.insert(IdentifierKind::ById, name, key);
                }
            }
            for link in &e.by_path {
                self.insert(IdentifierKind::ByPath, link, key);
                if let Some(name) = link.rsplit('/').next() {
                    self.insert(IdentifierKind::ByPath, name, key);
                }
            }

            // Pool and dataset names/GUIDs belong to their own entities;
            // a member disk must not capture the pool's identifiers
            match e.kind {
                EntityKind::ZfsPool => {
                    ins(self, IdentifierKind::ZfsPoolName, &e.zfs_pool_name);
                    ins(self, IdentifierKind::ZfsPoolGuid, &e.zfs_pool_guid);
                }
                EntityKind::ZfsDataset => {
                    ins(self, IdentifierKind::ZfsDatasetName, &e.zfs_dataset_name);
                    ins(self, IdentifierKind::ZfsDatasetGuid, &e.zfs_dataset_guid);
                }
                EntityKind::LvmVg => {
                    ins(self, IdentifierKind::LvmVgName, &e.lvm_vg_name);
                    ins(self, IdentifierKind::LvmVgUuid, &e.lvm_vg_uuid);
                }
                EntityKind::LvmLv => {
                    ins(self, IdentifierKind::LvmLvName, &e.lvm_lv_name);
                    ins(self, IdentifierKind::LvmLvUuid, &e.lvm_lv_uuid);
                    ins(self, IdentifierKind::LvmLvPath, &e.lvm_lv_path);
                }
                _ => {
                    ins(self, IdentifierKind::ZfsVdevGuid, &e.zfs_vdev_guid);
                    ins(self, IdentifierKind::LvmPvUuid, &e.lvm_pv_uuid);
                }
            }

            ins(self, IdentifierKind::MdArrayUuid, &e.md_array_uuid);
            ins(self, IdentifierKind::MdName, &e.md_name);
            ins(self, IdentifierKind::DmName, &e.dm_name);
            ins(self, IdentifierKind::DmUuid, &e.dm_uuid);
        }
    }
}

/// by-id link names encode identity for devices udev did not cover:
/// nvme-eui.<hex>, wwn-0x<hex>.
fn apply_link_identity(link: &str, e: &mut DeviceEntity) {
    let Some(name) = link.rsplit('/').next() else { return };
    if let Some(eui) = name.strip_prefix("nvme-eui.") {
        fill(&mut e.eui64, Some(eui.to_string()));
    } else if let Some(wwn) = name.strip_prefix("wwn-0x") {
        fill(&mut e.wwn, Some(wwn.to_string()));
    }
}

fn fill(dst: &mut Option<String>, src: Option<String>) {
    if dst.is_none() {
        *dst = src.filter(|s| !s.is_empty());
    }
}
