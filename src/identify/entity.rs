use serde::Serialize;

/// What kind of storage entity a lookup resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Disk,
    Partition,
    ZfsPool,
    ZfsDataset,
    LvmVg,
    LvmLv,
    MdArray,
    DmDevice,
}

/// Which identifier kind matched a lookup query. The enum order is not the
/// resolution order; see `LOOKUP_ORDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    DevicePath,
    KernelName,
    Serial,
    SerialVpd,
    Wwn,
    Luid,
    Nguid,
    Eui64,
    ScsiHctl,
    MajMin,
    ById,
    ByPath,
    FsUuid,
    FsLabel,
    PartUuid,
    PartLabel,
    ZfsPoolGuid,
    ZfsPoolName,
    ZfsDatasetGuid,
    ZfsDatasetName,
    ZfsVdevGuid,
    LvmPvUuid,
    LvmVgUuid,
    LvmVgName,
    LvmLvUuid,
    LvmLvName,
    LvmLvPath,
    MdArrayUuid,
    MdName,
    DmName,
    DmUuid,
    Symlink,
    /// Resolved from the inventory store after live lookup failed.
    DatabaseSerial,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::DevicePath => "device_path",
            IdentifierKind::KernelName => "kernel_name",
            IdentifierKind::Serial => "serial",
            IdentifierKind::SerialVpd => "serial_vpd",
            IdentifierKind::Wwn => "wwn",
            IdentifierKind::Luid => "luid",
            IdentifierKind::Nguid => "nguid",
            IdentifierKind::Eui64 => "eui64",
            IdentifierKind::ScsiHctl => "scsi_hctl",
            IdentifierKind::MajMin => "maj_min",
            IdentifierKind::ById => "by_id",
            IdentifierKind::ByPath => "by_path",
            IdentifierKind::FsUuid => "fs_uuid",
            IdentifierKind::FsLabel => "fs_label",
            IdentifierKind::PartUuid => "part_uuid",
            IdentifierKind::PartLabel => "part_label",
            IdentifierKind::ZfsPoolGuid => "zfs_pool_guid",
            IdentifierKind::ZfsPoolName => "zfs_pool_name",
            IdentifierKind::ZfsDatasetGuid => "zfs_dataset_guid",
            IdentifierKind::ZfsDatasetName => "zfs_dataset_name",
            IdentifierKind::ZfsVdevGuid => "zfs_vdev_guid",
            IdentifierKind::LvmPvUuid => "lvm_pv_uuid",
            IdentifierKind::LvmVgUuid => "lvm_vg_uuid",
            IdentifierKind::LvmVgName => "lvm_vg_name",
            IdentifierKind::LvmLvUuid => "lvm_lv_uuid",
            IdentifierKind::LvmLvName => "lvm_lv_name",
            IdentifierKind::LvmLvPath => "lvm_lv_path",
            IdentifierKind::MdArrayUuid => "md_array_uuid",
            IdentifierKind::MdName => "md_name",
            IdentifierKind::DmName => "dm_name",
            IdentifierKind::DmUuid => "dm_uuid",
            IdentifierKind::Symlink => "symlink",
            IdentifierKind::DatabaseSerial => "database_serial",
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One identifiable storage entity with every identifier known for it.
/// Reverse maps hold entity keys (device paths or synthetic keys), never
/// references.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceEntity {
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_vpd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wwn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub luid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nguid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eui64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maj_min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scsi_hctl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_label: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub by_id: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub by_path: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zfs_pool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zfs_pool_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zfs_dataset_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zfs_dataset_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zfs_vdev_guid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_pv_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_vg_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_vg_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_lv_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_lv_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_lv_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub md_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md_array_uuid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_uuid: Option<String>,
}

impl DeviceEntity {
    pub fn new(kind: EntityKind) -> Self {
        DeviceEntity {
            kind,
            device_path: None,
            kernel_name: None,
            serial: None,
            serial_vpd: None,
            wwn: None,
            luid: None,
            nguid: None,
            eui64: None,
            model: None,
            vendor: None,
            maj_min: None,
            size_bytes: None,
            scsi_hctl: None,
            transport: None,
            fs_uuid: None,
            fs_label: None,
            fs_type: None,
            part_uuid: None,
            part_label: None,
            by_id: Vec::new(),
            by_path: Vec::new(),
            zfs_pool_name: None,
            zfs_pool_guid: None,
            zfs_dataset_name: None,
            zfs_dataset_guid: None,
            zfs_vdev_guid: None,
            lvm_pv_uuid: None,
            lvm_vg_name: None,
            lvm_vg_uuid: None,
            lvm_lv_name: None,
            lvm_lv_uuid: None,
            lvm_lv_path: None,
            md_name: None,
            md_array_uuid: None,
            dm_name: None,
            dm_uuid: None,
        }
    }
}
