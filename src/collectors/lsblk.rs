//! Block-layout probe: `lsblk --json` full-column device enumeration.
//! Reads kernel state only; never wakes a drive.

use serde_json::Value;
use std::collections::HashMap;
use std::process::Command;

use crate::cache::{Cache, Tier};

const COLUMNS: &str =
    "NAME,PATH,SIZE,SERIAL,WWN,MODEL,VENDOR,REV,HCTL,TRAN,TYPE,MAJ:MIN,FSTYPE,UUID,LABEL,PARTUUID,PARTLABEL";

#[derive(Debug, Clone, Default)]
pub struct LsblkDevice {
    pub name: String,
    pub path: String,
    pub dev_type: String,
    pub size: Option<u64>,
    pub serial: Option<String>,
    pub wwn: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub rev: Option<String>,
    pub hctl: Option<String>,
    pub tran: Option<String>,
    pub maj_min: Option<String>,
    pub fs_type: Option<String>,
    pub fs_uuid: Option<String>,
    pub fs_label: Option<String>,
    pub part_uuid: Option<String>,
    pub part_label: Option<String>,
}

/// Disks keyed by device path. Tool absent or unparseable output yields an
/// empty map.
pub fn collect(cache: &Cache) -> HashMap<String, LsblkDevice> {
    cache.get_or_insert_with("lsblk:devices", Tier::Fast, || {
        let out = match Command::new("lsblk")
            .args(["-d", "-b", "-J", "-o", COLUMNS])
            .output()
        {
            Ok(o) => o,
            Err(_) => {
                tracing::debug!("lsblk not available");
                return HashMap::new();
            }
        };
        match parse(&String::from_utf8_lossy(&out.stdout)) {
            Some(devices) => devices,
            None => {
                // Recoverable per probe: empty data plus a diagnostic
                let err = crate::error::EngineError::ParseUnexpected {
                    tool: "lsblk",
                    detail: "no blockdevices array in JSON output".to_string(),
                };
                tracing::warn!(error = %err, "probe degraded to empty data");
                HashMap::new()
            }
        }
    })
}

pub fn parse(text: &str) -> Option<HashMap<String, LsblkDevice>> {
    let v: Value = serde_json::from_str(text).ok()?;
    let blockdevices = v["blockdevices"].as_array()?;

    let mut devices = HashMap::new();
    for bd in blockdevices {
        let name = bd["name"].as_str().unwrap_or("").to_string();
        if name.is_empty() {
            continue;
        }
        let path = match bd["path"].as_str() {
            Some(p) => p.to_string(),
            None => format!("/dev/{}", name),
        };

        let dev = LsblkDevice {
            name,
            path: path.clone(),
            dev_type: bd["type"].as_str().unwrap_or("").to_string(),
            size: num_or_str_u64(&bd["size"]),
            serial: str_opt(&bd["serial"]),
            wwn: str_opt(&bd["wwn"]).map(|w| w.trim_start_matches("0x").to_string()),
            model: str_opt(&bd["model"]),
            vendor: str_opt(&bd["vendor"]),
            rev: str_opt(&bd["rev"]),
            hctl: str_opt(&bd["hctl"]),
            tran: str_opt(&bd["tran"]),
            maj_min: str_opt(&bd["maj:min"]),
            fs_type: str_opt(&bd["fstype"]),
            fs_uuid: str_opt(&bd["uuid"]),
            fs_label: str_opt(&bd["label"]),
            part_uuid: str_opt(&bd["partuuid"]),
            part_label: str_opt(&bd["partlabel"]),
        };
        devices.insert(path, dev);
    }
    Some(devices)
}

/// lsblk emits SIZE as a number on current versions and as a string on old
/// ones; accept both.
fn num_or_str_u64(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn str_opt(v: &Value) -> Option<String> {
    v.as_str().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "blockdevices": [
            {"name":"sda","path":"/dev/sda","size":8001563222016,"serial":"ZA1DKJT7",
             "wwn":"0x5000c500a6e7b82b","model":"ST8000NM0075","vendor":"SEAGATE ","rev":"E002",
             "hctl":"10:0:3:0","tran":"sas","type":"disk","maj:min":"8:0",
             "fstype":"zfs_member","uuid":"14707061191158689053","label":"tank",
             "partuuid":null,"partlabel":null},
            {"name":"sdb","path":"/dev/sdb","size":"8001563222016","serial":"ZA1DKJT8",
             "wwn":null,"model":null,"vendor":null,"rev":null,
             "hctl":"10:0:4:0","tran":"sas","type":"disk","maj:min":"8:16",
             "fstype":null,"uuid":null,"label":null,"partuuid":null,"partlabel":null}
        ]
    }"#;

    #[test]
    fn parses_devices_keyed_by_path() {
        let devices = parse(SAMPLE).unwrap();
        assert_eq!(devices.len(), 2);

        let sda = &devices["/dev/sda"];
        assert_eq!(sda.name, "sda");
        assert_eq!(sda.serial.as_deref(), Some("ZA1DKJT7"));
        assert_eq!(sda.wwn.as_deref(), Some("5000c500a6e7b82b"));
        assert_eq!(sda.vendor.as_deref(), Some("SEAGATE"));
        assert_eq!(sda.size, Some(8001563222016));
        assert_eq!(sda.fs_type.as_deref(), Some("zfs_member"));
        assert_eq!(sda.fs_label.as_deref(), Some("tank"));

        // String-typed size from older lsblk
        assert_eq!(devices["/dev/sdb"].size, Some(8001563222016));
        assert_eq!(devices["/dev/sdb"].model, None);
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse("not json").is_none());
        assert!(parse("{}").is_none());
    }
}
