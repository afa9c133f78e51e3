//! SCSI enclosure services: enclosure discovery, identify/fault LED
//! control and the bay locator.

pub mod discovery;
pub mod led;
pub mod locate;

use serde::Serialize;

/// An SES-capable enclosure with its /dev/sg control node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnclosureSes {
    /// Matches the HBA enclosure id once mapped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosure_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_address: Option<String>,
    pub sg_device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

/// Result of resolving a locate query to a physical bay.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocateInfo {
    pub query: String,
    /// Identifier kind that matched ("serial", "enclosure_slot",
    /// "database_serial", ...)
    pub matched_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub enclosure_id: u32,
    pub slot: u32,
    pub sg_device: String,
    /// Both reported addresses are kept so a suffix-match ambiguity on
    /// multi-enclosure hosts is visible in output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hba_sas_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ses_sas_address: Option<String>,
}

/// How a timed locate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocateOutcome {
    /// Full duration elapsed, LED cleared
    Timeout,
    /// Interrupted early, LED cleared
    Interrupted,
}
