//! SMART probe, split into two invocations with very different safety:
//!
//! - the state probe (`smartctl -i -n standby`) classifies a drive without
//!   issuing attribute commands, so a standby drive stays asleep;
//! - the attribute read (`smartctl -i -A -H`) WILL wake a standby drive and
//!   must only run after the state gate has proven the drive active.
//!
//! Every attribute read is counted so the engine can report how many
//! wake-capable commands an operation issued.

use regex::Regex;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::{Cache, Tier};
use crate::models::drive::{DriveState, SmartHealth};

static ATTR_READS: AtomicU64 = AtomicU64::new(0);

/// Number of SMART attribute reads issued by this process.
pub fn attribute_read_count() -> u64 {
    ATTR_READS.load(Ordering::Relaxed)
}

// ── State probe (standby-safe) ───────────────────────────────────────

/// Drive state via the standby-safe probe, cached FAST.
pub fn probe_state(cache: &Cache, device: &str) -> DriveState {
    cache.get_or_insert_with(&format!("smart:state:{}", device), Tier::Fast, || {
        probe_state_fresh(device)
    })
}

/// Uncached state probe, for polling loops that need second-granularity.
pub fn probe_state_fresh(device: &str) -> DriveState {
    let out = match Command::new("smartctl").args(["-i", "-n", "standby", device]).output() {
        Ok(o) => o,
        Err(_) => {
            tracing::debug!("smartctl not available");
            return DriveState::Unknown;
        }
    };
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    classify_state_output(&text, out.status.success())
}

/// Map state-probe output to a drive state. Standby is checked first:
/// smartctl exits non-zero for a standby drive, which is not an error.
pub fn classify_state_output(output: &str, exit_ok: bool) -> DriveState {
    if output.contains("STANDBY") || output.contains("NOT READY") {
        return DriveState::Standby;
    }
    if exit_ok {
        return DriveState::Active;
    }
    if output.contains("No such device") || output.contains("No such file") {
        return DriveState::Missing;
    }
    // I/O error or any other non-zero exit without a standby indicator
    DriveState::Failed
}

// ── Identity (from the state-safe probe output) ──────────────────────

#[derive(Debug, Clone, Default)]
pub struct SmartIdentity {
    pub serial: Option<String>,
    pub wwn: Option<String>,
    pub luid: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub firmware: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Identity fields for a device, read via the standby-safe invocation and
/// cached STATIC.
pub fn identity(cache: &Cache, device: &str) -> SmartIdentity {
    cache.get_or_insert_with(&format!("smart:identity:{}", device), Tier::Static, || {
        let out = match Command::new("smartctl").args(["-i", "-n", "standby", device]).output() {
            Ok(o) => o,
            Err(_) => return SmartIdentity::default(),
        };
        parse_identity(&String::from_utf8_lossy(&out.stdout))
    })
}

pub fn parse_identity(output: &str) -> SmartIdentity {
    let mut id = SmartIdentity::default();

    let capture = |pattern: &str| -> Option<String> {
        Regex::new(pattern)
            .unwrap()
            .captures(output)
            .map(|c| c[1].trim().to_string())
    };

    id.serial = capture(r"Serial [Nn]umber:\s+(\S+)");
    id.luid = capture(r"Logical Unit id:\s+(\S+)");
    id.wwn = capture(r"LU WWN Device Id:\s+(\S[^\n]*)")
        .map(|w| w.replace(' ', ""))
        .or_else(|| id.luid.as_ref().map(|l| l.trim_start_matches("0x").to_string()));
    id.model = capture(r"(?:Device Model|Product):\s+(.+)");
    id.vendor = capture(r"Vendor:\s+(\S+)");
    id.firmware = capture(r"(?:Firmware Version|Revision):\s+(\S+)");
    id.size_bytes = capture(r"User Capacity:\s+([\d,]+)\s+bytes")
        .and_then(|v| v.replace(',', "").parse().ok());
    id
}

// ── Attribute read (wakes standby drives) ────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SmartAttributes {
    pub health: SmartHealth,
    pub temperature_c: Option<i32>,
    pub power_on_hours: Option<u64>,
    pub reallocated: Option<u64>,
    pub pending_sectors: Option<u64>,
    /// The drive reported a standby indicator after the gate said active.
    /// The caller downgrades the record instead of trusting stale data.
    pub standby_indicator: bool,
}

/// Full attribute read. The caller must have gated on `DriveState::Active`.
pub fn read_attributes(cache: &Cache, device: &str) -> Option<SmartAttributes> {
    cache.get_or_insert_with(&format!("smart:attrs:{}", device), Tier::Dynamic, || {
        ATTR_READS.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(device, "smartctl attribute read");
        let out = Command::new("smartctl").args(["-i", "-A", "-H", device]).output().ok()?;
        let text = String::from_utf8_lossy(&out.stdout);
        Some(parse_attributes(&text))
    })
}

pub fn parse_attributes(output: &str) -> SmartAttributes {
    let mut attrs = SmartAttributes::default();

    if output.contains("STANDBY") || output.contains("NOT READY") {
        attrs.standby_indicator = true;
        return attrs;
    }

    if output.contains("SMART overall-health self-assessment test result: PASSED")
        || output.contains("SMART Health Status: OK")
    {
        attrs.health = SmartHealth::Passed;
    } else if output.contains("SMART overall-health self-assessment test result: FAILED")
        || output.contains("SMART Health Status: FAILED")
    {
        attrs.health = SmartHealth::Failed;
    }

    attrs.temperature_c = parse_temperature(output);
    attrs.power_on_hours = ata_attribute_raw(output, "Power_On_Hours")
        .or_else(|| capture_u64(output, r"Accumulated power on time[^:]*:\s+(\d+)"));
    attrs.reallocated = ata_attribute_raw(output, "Reallocated_Sector_Ct")
        .or_else(|| capture_u64(output, r"Elements in grown defect list:\s+(\d+)"))
        .filter(|n| *n > 0);
    attrs.pending_sectors =
        ata_attribute_raw(output, "Current_Pending_Sector").filter(|n| *n > 0);
    attrs
}

/// First numeric match among the three documented temperature formats wins;
/// conflicting later matches are ignored.
pub fn parse_temperature(output: &str) -> Option<i32> {
    const PATTERNS: [&str; 3] = [
        r"Current Drive Temperature:\s+(\d+)",
        r"Temperature_Celsius\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+\S+\s+(\d+)",
        r"Temperature:\s+(\d+)\s+Celsius",
    ];
    for pattern in PATTERNS {
        if let Some(cap) = Regex::new(pattern).unwrap().captures(output) {
            if let Ok(t) = cap[1].parse() {
                return Some(t);
            }
        }
    }
    None
}

/// Raw value of one ATA attribute row. Columns: ID NAME FLAG VALUE WORST
/// THRESH TYPE UPDATED WHEN_FAILED RAW_VALUE; the raw value may carry a
/// trailing annotation like "45 (Min/Max 20/52)".
fn ata_attribute_raw(output: &str, name: &str) -> Option<u64> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || fields[1] != name {
            continue;
        }
        return fields[9].parse().ok();
    }
    None
}

fn capture_u64(output: &str, pattern: &str) -> Option<u64> {
    Regex::new(pattern)
        .unwrap()
        .captures(output)
        .and_then(|c| c[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn standby_wins_over_exit_code() {
        let out = "Device is in STANDBY mode, exit(2)\n";
        assert_eq!(classify_state_output(out, false), DriveState::Standby);
        assert_eq!(classify_state_output("NOT READY\n", false), DriveState::Standby);
    }

    #[test]
    fn missing_and_failed_are_distinguished() {
        assert_eq!(
            classify_state_output("Smartctl open device: /dev/sdq failed: No such device\n", false),
            DriveState::Missing
        );
        assert_eq!(
            classify_state_output("Read Device Identity failed: I/O error\n", false),
            DriveState::Failed
        );
        assert_eq!(classify_state_output("scsi error badly formed\n", false), DriveState::Failed);
    }

    #[test]
    fn clean_exit_is_active() {
        assert_eq!(classify_state_output("Device Model: ST8000\n", true), DriveState::Active);
    }

    const SCSI_INFO: &str = "\
Vendor:               SEAGATE
Product:              ST8000NM0075
Revision:             E002
User Capacity:        8,001,563,222,016 bytes [8.00 TB]
Logical Unit id:      0x5000c500a6e7b82b
Serial number:        ZA1DKJT7
";

    const ATA_INFO: &str = "\
Device Model:     Samsung SSD 860 EVO 1TB
Serial Number:    S3Z9NB0K123456T
LU WWN Device Id: 5 002538 e40a1b2c3
Firmware Version: RVT02B6Q
User Capacity:    1,000,204,886,016 bytes [1.00 TB]
";

    #[test]
    fn parses_scsi_identity() {
        let id = parse_identity(SCSI_INFO);
        assert_eq!(id.serial.as_deref(), Some("ZA1DKJT7"));
        assert_eq!(id.luid.as_deref(), Some("0x5000c500a6e7b82b"));
        assert_eq!(id.wwn.as_deref(), Some("5000c500a6e7b82b"));
        assert_eq!(id.model.as_deref(), Some("ST8000NM0075"));
        assert_eq!(id.vendor.as_deref(), Some("SEAGATE"));
        assert_eq!(id.firmware.as_deref(), Some("E002"));
        assert_eq!(id.size_bytes, Some(8_001_563_222_016));
    }

    #[test]
    fn parses_ata_identity() {
        let id = parse_identity(ATA_INFO);
        assert_eq!(id.serial.as_deref(), Some("S3Z9NB0K123456T"));
        assert_eq!(id.wwn.as_deref(), Some("5002538e40a1b2c3"));
        assert_eq!(id.model.as_deref(), Some("Samsung SSD 860 EVO 1TB"));
    }

    const SCSI_ATTRS: &str = "\
SMART Health Status: OK
Current Drive Temperature:     38 C
Drive Trip Temperature:        60 C
Accumulated power on time, hours:minutes 34817:12
Elements in grown defect list: 0
";

    const ATA_ATTRS: &str = "\
SMART overall-health self-assessment test result: PASSED
ID# ATTRIBUTE_NAME          FLAG     VALUE WORST THRESH TYPE      UPDATED  WHEN_FAILED RAW_VALUE
  5 Reallocated_Sector_Ct   0x0033   100   100   010    Pre-fail  Always       -       8
  9 Power_On_Hours          0x0032   091   091   000    Old_age   Always       -       41219
190 Airflow_Temperature_Cel 0x0032   059   046   040    Old_age   Always       -       41
194 Temperature_Celsius     0x0022   059   046   000    Old_age   Always       -       41
197 Current_Pending_Sector  0x0012   100   100   000    Old_age   Always       -       16
";

    #[test]
    fn parses_scsi_attributes() {
        let attrs = parse_attributes(SCSI_ATTRS);
        assert_eq!(attrs.health, SmartHealth::Passed);
        assert_eq!(attrs.temperature_c, Some(38));
        assert_eq!(attrs.power_on_hours, Some(34817));
        // Zero-count defect list is not worth reporting
        assert_eq!(attrs.reallocated, None);
        assert!(!attrs.standby_indicator);
    }

    #[test]
    fn parses_ata_attributes() {
        let attrs = parse_attributes(ATA_ATTRS);
        assert_eq!(attrs.health, SmartHealth::Passed);
        assert_eq!(attrs.temperature_c, Some(41));
        assert_eq!(attrs.power_on_hours, Some(41219));
        assert_eq!(attrs.reallocated, Some(8));
        assert_eq!(attrs.pending_sectors, Some(16));
    }

    #[test]
    fn failed_health_is_reported() {
        let attrs = parse_attributes("SMART Health Status: FAILED!\n");
        assert_eq!(attrs.health, SmartHealth::Failed);
    }

    #[test]
    fn post_gate_standby_sets_indicator_only() {
        let attrs = parse_attributes("Device is in STANDBY mode, exit(2)\n");
        assert!(attrs.standby_indicator);
        assert_eq!(attrs.temperature_c, None);
        assert_eq!(attrs.health, SmartHealth::Unknown);
    }

    #[test]
    fn first_temperature_pattern_wins() {
        let both = "Current Drive Temperature:     38 C\nTemperature: 99 Celsius\n";
        assert_eq!(parse_temperature(both), Some(38));
    }
}
