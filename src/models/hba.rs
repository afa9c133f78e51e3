use serde::Serialize;

use crate::models::drive::{MediaType, Protocol};

/// Which vendor tool reported a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HbaFamily {
    Storcli,
    Sas3ircu,
    Generic,
}

/// One host bus adapter as reported by storcli/sas3ircu.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerRecord {
    /// "c0", "c1", ...
    pub id: String,
    pub family: HbaFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pci_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phy_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_drives: Option<u32>,
    /// "SAS, SATA" style capability string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_drives: Option<String>,
    /// Die (ROC) temperature, DYNAMIC-tier data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<i32>,
}

impl ControllerRecord {
    pub fn new(id: &str, family: HbaFamily) -> Self {
        ControllerRecord {
            id: id.to_string(),
            family,
            model: None,
            serial: None,
            sas_address: None,
            firmware_version: None,
            bios_version: None,
            driver_name: None,
            driver_version: None,
            pci_address: None,
            phy_count: None,
            physical_drives: None,
            supported_drives: None,
            temperature_c: None,
        }
    }
}

/// One JBOD enclosure as reported by an HBA tool.
#[derive(Debug, Clone, Serialize)]
pub struct EnclosureRecord {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_slots: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_slot: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl EnclosureRecord {
    pub fn new(id: u32) -> Self {
        EnclosureRecord {
            id,
            logical_id: None,
            sas_address: None,
            num_slots: None,
            start_slot: None,
            vendor: None,
            model: None,
            firmware: None,
            serial: None,
        }
    }
}

/// One physical drive as seen from the HBA side, keyed by serial in the
/// snapshot. Location (enclosure, slot) here is authoritative over sysfs
/// hints.
#[derive(Debug, Clone, Serialize)]
pub struct HbaDrive {
    pub controller_id: String,
    pub enclosure_id: u32,
    pub slot: u32,
    pub serial: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_vpd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wwn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_errors: Option<u64>,
    /// Raw state string from the tool ("Ready (RDY)", "Online", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl HbaDrive {
    pub fn new(controller_id: &str, enclosure_id: u32, slot: u32) -> Self {
        HbaDrive {
            controller_id: controller_id.to_string(),
            enclosure_id,
            slot,
            serial: String::new(),
            serial_vpd: None,
            sas_address: None,
            guid: None,
            wwn: None,
            model: None,
            vendor: None,
            firmware: None,
            protocol: None,
            media_type: None,
            size_bytes: None,
            sector_size: None,
            link_speed: None,
            media_errors: None,
            state: None,
        }
    }
}
