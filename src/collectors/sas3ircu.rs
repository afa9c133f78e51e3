//! sas3ircu probe: LSI SAS3 IT-mode HBA enumeration. Carries the enclosure
//! topology (logical id, slot counts) and the VPD serial that storcli does
//! not report.

use regex::Regex;
use std::collections::HashMap;
use std::process::Command;

use crate::cache::{Cache, Tier};
use crate::models::drive::{MediaType, Protocol};
use crate::models::hba::{ControllerRecord, EnclosureRecord, HbaDrive, HbaFamily};

pub fn tool_present() -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|d| d.join("sas3ircu").is_file()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default)]
pub struct Sas3ircuData {
    pub controllers: Vec<ControllerRecord>,
    pub enclosures: Vec<EnclosureRecord>,
    /// Keyed by upper-cased serial
    pub drives: HashMap<String, HbaDrive>,
}

pub fn collect(cache: &Cache) -> Sas3ircuData {
    cache.get_or_insert_with("sas3ircu:all", Tier::Slow, || {
        if !tool_present() {
            return Sas3ircuData::default();
        }
        let list_out = run(&["list"]).unwrap_or_default();
        let mut data = Sas3ircuData::default();

        for index in parse_controller_indices(&list_out) {
            let Some(display) = run(&[&index.to_string(), "display"]) else { continue };
            let id = format!("c{}", index);
            let (ctrl, encs, drives) = parse_display(&id, &display);
            data.controllers.push(ctrl);
            data.enclosures.extend(encs);
            data.drives.extend(drives);
        }
        data
    })
}

fn run(args: &[&str]) -> Option<String> {
    let out = Command::new("sas3ircu").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).to_string())
}

/// `sas3ircu list` adapter table rows begin with the controller index.
pub fn parse_controller_indices(output: &str) -> Vec<u32> {
    let re = Regex::new(r"^(\d+)\s+SAS\d+").unwrap();
    output
        .lines()
        .filter_map(|l| re.captures(l.trim()))
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Parse `sas3ircu N display`: controller section, per-device blocks, then
/// the enclosure list.
pub fn parse_display(
    controller_id: &str,
    output: &str,
) -> (ControllerRecord, Vec<EnclosureRecord>, HashMap<String, HbaDrive>) {
    let mut ctrl = ControllerRecord::new(controller_id, HbaFamily::Sas3ircu);
    let mut enclosures: Vec<EnclosureRecord> = Vec::new();
    let mut drives = HashMap::new();

    #[derive(PartialEq)]
    enum Section {
        Controller,
        Devices,
        Enclosures,
    }
    let mut section = Section::Controller;
    let mut current: Option<HbaDrive> = None;
    let mut skip_block = false;

    let mut flush = |dev: &mut Option<HbaDrive>, drives: &mut HashMap<String, HbaDrive>| {
        if let Some(d) = dev.take() {
            if !d.serial.is_empty() {
                drives.insert(d.serial.to_uppercase(), d);
            }
        }
    };

    for line in output.lines() {
        let line = line.trim();

        if line.starts_with("Physical device information") {
            section = Section::Devices;
            continue;
        }
        if line.starts_with("Enclosure information") {
            flush(&mut current, &mut drives);
            section = Section::Enclosures;
            continue;
        }

        if line.starts_with("Device is a") {
            flush(&mut current, &mut drives);
            skip_block = !line.contains("Hard disk");
            if !skip_block {
                current = Some(HbaDrive::new(controller_id, 0, 0));
            }
            continue;
        }

        let Some((key, val)) = line.split_once(':').map(|(k, v)| (k.trim(), v.trim())) else {
            continue;
        };
        if val.is_empty() {
            continue;
        }

        match section {
            Section::Controller => parse_controller_field(&mut ctrl, key, val),
            Section::Devices => {
                if skip_block {
                    continue;
                }
                if let Some(dev) = current.as_mut() {
                    parse_device_field(dev, key, val);
                }
            }
            Section::Enclosures => parse_enclosure_field(&mut enclosures, key, val),
        }
    }
    flush(&mut current, &mut drives);

    (ctrl, enclosures, drives)
}

fn parse_controller_field(ctrl: &mut ControllerRecord, key: &str, val: &str) {
    match key {
        "Controller type" => ctrl.model = Some(val.to_string()),
        "Firmware version" => ctrl.firmware_version = Some(val.to_string()),
        "BIOS version" => ctrl.bios_version = Some(val.to_string()),
        "Maximum physical devices" => ctrl.physical_drives = val.parse().ok(),
        "Number of phys" => ctrl.phy_count = val.parse().ok(),
        _ => {}
    }
}

fn parse_device_field(dev: &mut HbaDrive, key: &str, val: &str) {
    match key {
        "Enclosure #" => dev.enclosure_id = val.parse().unwrap_or(0),
        "Slot #" => dev.slot = val.parse().unwrap_or(0),
        "SAS Address" => dev.sas_address = Some(val.replace('-', "").to_lowercase()),
        "State" => dev.state = Some(val.to_string()),
        "Serial No" => dev.serial = val.to_string(),
        "Unit Serial No(VPD)" => dev.serial_vpd = Some(val.to_string()),
        "GUID" => {
            if val != "N/A" {
                dev.guid = Some(val.to_lowercase());
            }
        }
        "Model Number" => dev.model = Some(val.to_string()),
        "Manufacturer" => dev.vendor = Some(val.to_string()),
        "Firmware Revision" => dev.firmware = Some(val.to_string()),
        "Protocol" => dev.protocol = Some(Protocol::from_transport(val)),
        "Drive Type" => dev.media_type = Some(MediaType::parse(val)),
        "Size (in MB)/(in sectors)" => {
            // Sector count is exact; 512-byte sectors
            if let Some(sectors) = val.split('/').nth(1).and_then(|s| s.trim().parse::<u64>().ok())
            {
                dev.size_bytes = Some((sectors + 1) * 512);
            }
        }
        _ => {}
    }
}

/// Enclosure list rows repeat per enclosure: Enclosure#, Logical ID,
/// Numslots, StartSlot. A new Enclosure# starts a new record.
fn parse_enclosure_field(enclosures: &mut Vec<EnclosureRecord>, key: &str, val: &str) {
    match key {
        "Enclosure#" => {
            if let Ok(id) = val.parse() {
                enclosures.push(EnclosureRecord::new(id));
            }
        }
        "Logical ID" => {
            if let Some(enc) = enclosures.last_mut() {
                let logical = val.replace(':', "").to_lowercase();
                enc.sas_address = Some(logical.clone());
                enc.logical_id = Some(logical);
            }
        }
        "Numslots" => {
            if let Some(enc) = enclosures.last_mut() {
                enc.num_slots = val.parse().ok();
            }
        }
        "StartSlot" => {
            if let Some(enc) = enclosures.last_mut() {
                enc.start_slot = val.parse().ok();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIST: &str = "\
         Adapter      Vendor  Device                       SubSys  SubSys
 Index    Type          ID      ID    Pci Address          Ven ID  Dev ID
   0     SAS3008     1000h    97h   00h:0dh:00h:00h      1028h   1f45h
SAS3IRCU: Utility Completed Successfully.
";

    const DISPLAY: &str = "\
Controller information
------------------------------------------------------------------------
  Controller type                         : SAS3008
  BIOS version                            : 8.37.00.00
  Firmware version                        : 16.00.01.00
  Channel description                     : 1 Serial Attached SCSI
  Maximum physical devices                : 543
  Number of phys                          : 8
------------------------------------------------------------------------
Physical device information
------------------------------------------------------------------------
Initiator at ID #0

Device is a Hard disk
  Enclosure #                             : 2
  Slot #                                  : 5
  SAS Address                             : 5000-c500-a6e7-b829
  State                                   : Ready (RDY)
  Size (in MB)/(in sectors)               : 7630885/15628053167
  Manufacturer                            : SEAGATE
  Model Number                            : ST8000NM0075
  Firmware Revision                       : E002
  Serial No                               : ZA1DKJT7
  Unit Serial No(VPD)                     : ZA1DKJT70000C907B6FF
  GUID                                    : 5000c500a6e7b82b
  Protocol                                : SAS
  Drive Type                              : SAS_HDD

Device is a Enclosure services device
  Enclosure #                             : 2
  Slot #                                  : 12
  SAS Address                             : 5003-0480-20b3-fe7f
  State                                   : Standby (SBY)
  Manufacturer                            : SMC
  Model Number                            : SC826-P
  Firmware Revision                       : 0001
  Serial No                               : 0123456789
------------------------------------------------------------------------
Enclosure information
------------------------------------------------------------------------
  Enclosure#                              : 1
  Logical ID                              : 50030480:1234fe7f
  Numslots                                : 8
  StartSlot                               : 0
  Enclosure#                              : 2
  Logical ID                              : 50030480:20b3fe7f
  Numslots                                : 12
  StartSlot                               : 0
------------------------------------------------------------------------
SAS3IRCU: Command DISPLAY Completed Successfully.
";

    #[test]
    fn lists_controller_indices() {
        assert_eq!(parse_controller_indices(LIST), vec![0]);
    }

    #[test]
    fn parses_controller_and_devices() {
        let (ctrl, _encs, drives) = parse_display("c0", DISPLAY);

        assert_eq!(ctrl.model.as_deref(), Some("SAS3008"));
        assert_eq!(ctrl.firmware_version.as_deref(), Some("16.00.01.00"));
        assert_eq!(ctrl.bios_version.as_deref(), Some("8.37.00.00"));
        assert_eq!(ctrl.phy_count, Some(8));

        // The enclosure services device block is not a drive
        assert_eq!(drives.len(), 1);
        let d = &drives["ZA1DKJT7"];
        assert_eq!(d.enclosure_id, 2);
        assert_eq!(d.slot, 5);
        assert_eq!(d.sas_address.as_deref(), Some("5000c500a6e7b829"));
        assert_eq!(d.serial_vpd.as_deref(), Some("ZA1DKJT70000C907B6FF"));
        assert_eq!(d.guid.as_deref(), Some("5000c500a6e7b82b"));
        assert_eq!(d.protocol, Some(Protocol::Sas));
        assert_eq!(d.media_type, Some(MediaType::Hdd));
        assert_eq!(d.size_bytes, Some(15628053168 * 512));
        assert_eq!(d.state.as_deref(), Some("Ready (RDY)"));
    }

    #[test]
    fn parses_enclosure_list() {
        let (_, encs, _) = parse_display("c0", DISPLAY);
        assert_eq!(encs.len(), 2);
        assert_eq!(encs[0].id, 1);
        assert_eq!(encs[1].id, 2);
        assert_eq!(encs[1].sas_address.as_deref(), Some("5003048020b3fe7f"));
        assert_eq!(encs[1].num_slots, Some(12));
        assert_eq!(encs[1].start_slot, Some(0));
    }
}
