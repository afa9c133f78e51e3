//! storcli probe: Broadcom/LSI MegaRAID-family controller, enclosure and
//! drive enumeration. Preferred over sas3ircu for identity fields when both
//! tools are present.

use regex::Regex;
use std::collections::HashMap;
use std::process::Command;

use crate::cache::{Cache, Tier};
use crate::models::drive::{MediaType, Protocol};
use crate::models::hba::{ControllerRecord, HbaDrive, HbaFamily};

pub fn tool_present() -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|d| d.join("storcli").is_file()))
        .unwrap_or(false)
}

/// Controllers and drives from storcli, cached SLOW. Empty when the tool is
/// absent or fails.
pub fn collect(cache: &Cache) -> (Vec<ControllerRecord>, HashMap<String, HbaDrive>) {
    cache.get_or_insert_with("storcli:all", Tier::Slow, || {
        if !tool_present() {
            return (Vec::new(), HashMap::new());
        }
        let list_out = run(&["show"]).unwrap_or_default();
        let ids = parse_controller_ids(&list_out);

        let mut controllers = Vec::new();
        let mut drives = HashMap::new();
        for id in ids {
            let show = run(&[&format!("/{}", id), "show", "all"]).unwrap_or_default();
            let mut ctrl = parse_controller(&id, &show);
            ctrl.temperature_c = temperature(cache, &id);
            controllers.push(ctrl);

            let drives_out =
                run(&[&format!("/{}/eall/sall", id), "show", "all"]).unwrap_or_default();
            for (serial, drive) in parse_drives(&id, &drives_out) {
                drives.insert(serial, drive);
            }
        }
        (controllers, drives)
    })
}

/// Controller die temperature, cached on its own DYNAMIC key.
pub fn temperature(cache: &Cache, controller_id: &str) -> Option<i32> {
    cache.get_or_insert_with(&format!("storcli:temp:{}", controller_id), Tier::Dynamic, || {
        let out = run(&[&format!("/{}", controller_id), "show", "temperature"])?;
        parse_temperature(&out)
    })
}

fn run(args: &[&str]) -> Option<String> {
    let out = Command::new("storcli").args(args).output().ok()?;
    Some(String::from_utf8_lossy(&out.stdout).to_string())
}

/// Controller index rows in `storcli show`:
///   0 HBA330Adp  16 12 ...
pub fn parse_controller_ids(output: &str) -> Vec<String> {
    let re = Regex::new(r"^(\d+)\s+\S+").unwrap();
    let mut ids: Vec<String> = output
        .lines()
        .filter_map(|l| re.captures(l.trim()))
        .map(|c| format!("c{}", &c[1]))
        .collect();
    ids.dedup();
    ids
}

pub fn parse_controller(id: &str, output: &str) -> ControllerRecord {
    let mut ctrl = ControllerRecord::new(id, HbaFamily::Storcli);

    let fields: [(&str, fn(&mut ControllerRecord, String)); 8] = [
        (r"Product Name = (.+)", |c, v| c.model = Some(v)),
        (r"Serial Number = (.+)", |c, v| c.serial = Some(v)),
        (r"SAS Address = (\S+)", |c, v| c.sas_address = Some(v.to_lowercase())),
        (r"FW Version = (\S+)", |c, v| c.firmware_version = Some(v)),
        (r"BIOS Version = (\S+)", |c, v| c.bios_version = Some(v)),
        (r"Driver Name = (\S+)", |c, v| c.driver_name = Some(v)),
        (r"Driver Version = (\S+)", |c, v| c.driver_version = Some(v)),
        (r"PCI Address = (\S+)", |c, v| c.pci_address = Some(v)),
    ];
    for (pattern, set) in fields {
        if let Some(cap) = Regex::new(pattern).unwrap().captures(output) {
            set(&mut ctrl, cap[1].trim().to_string());
        }
    }

    if let Some(cap) = Regex::new(r"Physical Drives = (\d+)").unwrap().captures(output) {
        ctrl.physical_drives = cap[1].parse().ok();
    }
    if let Some(cap) = Regex::new(r"Supported Drives = (.+)").unwrap().captures(output) {
        ctrl.supported_drives = Some(cap[1].trim().to_string());
    }
    ctrl
}

pub fn parse_temperature(output: &str) -> Option<i32> {
    Regex::new(r"ROC temperature\(Degree Celsius\)\s*=?\s*(\d+)")
        .unwrap()
        .captures(output)
        .or_else(|| {
            Regex::new(r"Chip temperature\(Degree Celsius\)\s*=?\s*(\d+)")
                .unwrap()
                .captures(output)
        })
        .and_then(|c| c[1].parse().ok())
}

/// `/cN/eall/sall show all` prints one section per drive headed
/// `Drive /cN/e<enc>/s<slot>`. Returns drives keyed by upper-cased serial.
pub fn parse_drives(controller_id: &str, output: &str) -> HashMap<String, HbaDrive> {
    let mut drives = HashMap::new();
    let header = format!("Drive /{}/e", controller_id);

    for section in output.split(&header).skip(1) {
        if let Some(drive) = parse_drive_section(controller_id, section) {
            drives.insert(drive.serial.to_uppercase(), drive);
        }
    }
    drives
}

fn parse_drive_section(controller_id: &str, section: &str) -> Option<HbaDrive> {
    // Section starts with "<enc>/s<slot> ..."
    let loc = Regex::new(r"^(\d+)/s(\d+)").unwrap().captures(section)?;
    let enclosure: u32 = loc[1].parse().ok()?;
    let slot: u32 = loc[2].parse().ok()?;

    let mut dev = HbaDrive::new(controller_id, enclosure, slot);

    if let Some(cap) = Regex::new(r"SN = (\S+)").unwrap().captures(section) {
        dev.serial = cap[1].to_string();
    }
    if dev.serial.is_empty() {
        return None;
    }

    if let Some(cap) = Regex::new(r"WWN = (\S+)").unwrap().captures(section) {
        dev.wwn = Some(cap[1].to_lowercase());
    }
    if let Some(cap) = Regex::new(r"Model Number = (.+)").unwrap().captures(section) {
        dev.model = Some(cap[1].trim().to_string());
    }
    if let Some(cap) = Regex::new(r"Manufacturer Id = (.+)").unwrap().captures(section) {
        dev.vendor = Some(cap[1].trim().to_string());
    }
    if let Some(cap) = Regex::new(r"Firmware Revision = (\S+)").unwrap().captures(section) {
        dev.firmware = Some(cap[1].to_string());
    }
    if let Some(cap) =
        Regex::new(r"Raw size = ([\d.]+) (TB|GB) \[0x([0-9a-fA-F]+) Sectors\]")
            .unwrap()
            .captures(section)
    {
        // Sector count is exact; the TB figure is rounded
        if let Ok(sectors) = u64::from_str_radix(&cap[3], 16) {
            dev.size_bytes = Some(sectors * 512);
        }
    }
    if let Some(cap) = Regex::new(r"Sector Size =\s*(\d+)").unwrap().captures(section) {
        dev.sector_size = cap[1].parse().ok();
    }
    if let Some(cap) = Regex::new(r"Link Speed = (\S+)").unwrap().captures(section) {
        dev.link_speed = Some(cap[1].to_string());
    }
    if let Some(cap) = Regex::new(r"Media Error Count = (\d+)").unwrap().captures(section) {
        let n: u64 = cap[1].parse().unwrap_or(0);
        if n > 0 {
            dev.media_errors = Some(n);
        }
    }

    // Summary row: EID:Slt DID State DG Size Intf Med ...
    if let Some(cap) = Regex::new(r"\d+:\d+\s+\d+\s+(\S+)\s+\S+\s+[\d.]+\s+\S+\s+(SAS|SATA)\s+(HDD|SSD)")
        .unwrap()
        .captures(section)
    {
        dev.state = Some(cap[1].to_string());
        dev.protocol = Some(Protocol::from_transport(&cap[2]));
        dev.media_type = Some(MediaType::parse(&cap[3]));
    }

    // Port row carries the device SAS address
    if let Some(cap) = Regex::new(r"\d+\s+Active\s+[\d.]+Gb/s\s+0x([0-9a-fA-F]+)")
        .unwrap()
        .captures(section)
    {
        dev.sas_address = Some(cap[1].to_lowercase());
    }

    Some(dev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHOW: &str = "\
CLI Version = 007.1408.0000.0000
Status = Success

System Overview :
===============
Ctl Model        Ports PDs DGs DNOpt VDs VNOpt BBU sPR DS EHS ASOs Hlth
  0 HBA330Adp       16  12   0     0   0     0 N/A On  -  N    0  Opt
";

    const SHOW_ALL: &str = "\
Product Name = HBA330 Adapter
Serial Number = 76E01NB
SAS Address =  5d0946600e7b8100
FW Version = 16.17.01.00
BIOS Version = 8.37.00.00_18.00.00.00
Driver Name = mpt3sas
Driver Version = 43.100.00.00
PCI Address = 00:0d:00:00
Physical Drives = 12
Supported Drives = SAS, SATA
";

    const DRIVES: &str = "\
Drive /c0/e12/s5 :
===============
EID:Slt DID State DG     Size Intf Med SED PI SeSz Model            Sp
12:5     13 Onln   0 7.276 TB SAS  HDD N   N  512B ST8000NM0075     U

Drive /c0/e12/s5 Device attributes :
====================================
SN = ZA1DKJT7
Manufacturer Id = SEAGATE
Model Number = ST8000NM0075
WWN = 5000C500A6E7B82B
Firmware Revision = E002
Raw size = 7.276 TB [0x3a3812ab0 Sectors]
Sector Size =  512
Link Speed = 12.0Gb/s

Drive /c0/e12/s5 State :
========================
Media Error Count = 3
Other Error Count = 0
Predictive Failure Count = 0

Port Information :
==================
Port status Linkspeed SAS address
   0 Active  12.0Gb/s  0x5000c500a6e7b829

Drive /c0/e12/s6 :
===============
EID:Slt DID State DG     Size Intf Med SED PI SeSz Model            Sp
12:6     14 Onln   0 7.276 TB SAS  HDD N   N  512B ST8000NM0075     U

Drive /c0/e12/s6 Device attributes :
====================================
SN = ZA1DKJT8
Model Number = ST8000NM0075
Raw size = 7.276 TB [0x3a3812ab0 Sectors]
";

    #[test]
    fn finds_controller_ids() {
        assert_eq!(parse_controller_ids(SHOW), vec!["c0"]);
        assert!(parse_controller_ids("Status = Failure\n").is_empty());
    }

    #[test]
    fn parses_controller_identity() {
        let ctrl = parse_controller("c0", SHOW_ALL);
        assert_eq!(ctrl.model.as_deref(), Some("HBA330 Adapter"));
        assert_eq!(ctrl.serial.as_deref(), Some("76E01NB"));
        assert_eq!(ctrl.sas_address.as_deref(), Some("5d0946600e7b8100"));
        assert_eq!(ctrl.firmware_version.as_deref(), Some("16.17.01.00"));
        assert_eq!(ctrl.driver_name.as_deref(), Some("mpt3sas"));
        assert_eq!(ctrl.physical_drives, Some(12));
        assert_eq!(ctrl.supported_drives.as_deref(), Some("SAS, SATA"));
    }

    #[test]
    fn parses_drive_sections() {
        let drives = parse_drives("c0", DRIVES);
        assert_eq!(drives.len(), 2);

        let d = &drives["ZA1DKJT7"];
        assert_eq!(d.enclosure_id, 12);
        assert_eq!(d.slot, 5);
        assert_eq!(d.serial, "ZA1DKJT7");
        assert_eq!(d.wwn.as_deref(), Some("5000c500a6e7b82b"));
        assert_eq!(d.model.as_deref(), Some("ST8000NM0075"));
        assert_eq!(d.vendor.as_deref(), Some("SEAGATE"));
        assert_eq!(d.firmware.as_deref(), Some("E002"));
        assert_eq!(d.size_bytes, Some(0x3a3812ab0 * 512));
        assert_eq!(d.sector_size, Some(512));
        assert_eq!(d.link_speed.as_deref(), Some("12.0Gb/s"));
        assert_eq!(d.media_errors, Some(3));
        assert_eq!(d.protocol, Some(Protocol::Sas));
        assert_eq!(d.media_type, Some(MediaType::Hdd));
        assert_eq!(d.sas_address.as_deref(), Some("5000c500a6e7b829"));
        assert_eq!(d.state.as_deref(), Some("Onln"));

        let d6 = &drives["ZA1DKJT8"];
        assert_eq!(d6.slot, 6);
        assert_eq!(d6.media_errors, None);
    }

    #[test]
    fn parses_roc_temperature() {
        assert_eq!(
            parse_temperature("Controller Properties :\nROC temperature(Degree Celsius) = 58\n"),
            Some(58)
        );
        assert_eq!(parse_temperature("nothing here"), None);
    }
}
