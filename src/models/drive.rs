use serde::{Deserialize, Serialize};

/// Power/availability state of a physical drive as decided by the state
/// gate. `Standby` drives must never receive a SMART attribute read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriveState {
    Active,
    Standby,
    Missing,
    Failed,
    #[default]
    Unknown,
}

impl DriveState {
    pub fn label(&self) -> &'static str {
        match self {
            DriveState::Active => "ACTIVE",
            DriveState::Standby => "STANDBY",
            DriveState::Missing => "MISSING",
            DriveState::Failed => "FAILED",
            DriveState::Unknown => "UNKNOWN",
        }
    }

    /// True when the drive is physically present and answering.
    pub fn is_present(&self) -> bool {
        matches!(self, DriveState::Active | DriveState::Standby)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Sas,
    Sata,
    Other,
}

impl Protocol {
    /// Map a transport string from lsblk/udev/HBA output ("sas", "sata",
    /// "ata", "SAS"...).
    pub fn from_transport(tran: &str) -> Protocol {
        match tran.to_ascii_lowercase().as_str() {
            "sas" => Protocol::Sas,
            "sata" | "ata" => Protocol::Sata,
            _ => Protocol::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Sas => "SAS",
            Protocol::Sata => "SATA",
            Protocol::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Hdd,
    Ssd,
    Unknown,
}

impl MediaType {
    pub fn parse(s: &str) -> MediaType {
        let s = s.to_ascii_uppercase();
        if s.contains("SSD") {
            MediaType::Ssd
        } else if s.contains("HDD") || s.contains("HARD") {
            MediaType::Hdd
        } else {
            MediaType::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmartHealth {
    Passed,
    Failed,
    #[default]
    Unknown,
}

/// Per-device ZFS error counters from the pool status config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ZfsErrors {
    pub read: u64,
    pub write: u64,
    pub cksum: u64,
}

impl ZfsErrors {
    pub fn total(&self) -> u64 {
        self.read + self.write + self.cksum
    }
}

/// Fused identity and live state of one physical drive, assembled from the
/// system snapshot by the fusion pipeline.
///
/// Invariants:
/// - `state == Missing`: no temperature, SMART metrics, or live ZFS error
///   counts; serial/enclosure/slot may come only from the inventory store.
/// - `state == Standby`: no temperature or SMART metrics.
/// - `serial` is the only identifier stable across re-enumeration.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DriveRecord {
    // Identifiers
    pub device_path: String,
    pub kernel_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_vpd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wwn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub luid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scsi_hctl: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub by_id_paths: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub by_path_paths: Vec<String>,

    // Hardware
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_speed: Option<String>,

    // Location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosure_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sg_device: Option<String>,

    // State
    pub state: DriveState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<i32>,
    pub smart_health: SmartHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_on_hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reallocated: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_sectors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_errors: Option<u64>,

    // Storage stack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zpool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vdev_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vdev_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zfs_errors: Option<ZfsErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_pv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvm_vg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_label: Option<String>,
}

impl DriveRecord {
    pub fn new(device_path: &str) -> Self {
        DriveRecord {
            device_path: device_path.to_string(),
            kernel_name: device_path.trim_start_matches("/dev/").to_string(),
            ..Default::default()
        }
    }

    /// Strip temperature and SMART attributes after a state downgrade,
    /// enforcing the missing/standby invariants. `media_errors` comes from
    /// the HBA roster, not SMART, so like `zfs_errors` it survives standby
    /// and is dropped only for a missing drive.
    pub fn clear_live_fields(&mut self) {
        self.temperature_c = None;
        self.smart_health = SmartHealth::Unknown;
        self.power_on_hours = None;
        self.reallocated = None;
        self.pending_sectors = None;
        if self.state == DriveState::Missing {
            self.media_errors = None;
            self.zfs_errors = None;
        }
    }

    /// "enc:slot" if both are known.
    pub fn bay(&self) -> Option<String> {
        match (self.enclosure_id, self.slot) {
            (Some(e), Some(s)) => Some(format!("{}:{}", e, s)),
            _ => None,
        }
    }
}

/// Aggregate drive counts and temperature spread for status output.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Summary {
    pub active: usize,
    pub standby: usize,
    pub missing: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_min: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_max: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_avg: Option<i32>,
}

impl Summary {
    pub fn build(drives: &[DriveRecord]) -> Summary {
        let mut s = Summary::default();
        let mut temps: Vec<i32> = Vec::new();

        for d in drives {
            match d.state {
                DriveState::Active => {
                    s.active += 1;
                    if let Some(t) = d.temperature_c {
                        temps.push(t);
                    }
                }
                DriveState::Standby => s.standby += 1,
                DriveState::Missing => s.missing += 1,
                // Unknown counts as failed for operator attention
                DriveState::Failed | DriveState::Unknown => s.failed += 1,
            }
        }

        if !temps.is_empty() {
            s.temp_min = temps.iter().min().copied();
            s.temp_max = temps.iter().max().copied();
            s.temp_avg = Some(temps.iter().sum::<i32>() / temps.len() as i32);
        }
        s
    }
}
