//! SCSI generic enumeration via `lsscsi -g`: maps every disk and enclosure
//! device to its H:C:T:L address and /dev/sg* control node.

use std::collections::HashMap;
use std::process::Command;

use crate::cache::{Cache, Tier};

#[derive(Debug, Clone, Default)]
pub struct ScsiDevice {
    pub hctl: String,
    /// disk, enclosu, cd/dvd, ...
    pub kind: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub rev: Option<String>,
    /// Block node, absent for enclosures
    pub device: Option<String>,
    /// /dev/sg<N>
    pub sg_device: Option<String>,
}

impl ScsiDevice {
    pub fn is_enclosure(&self) -> bool {
        self.kind.to_ascii_lowercase().starts_with("enclosu")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScsiRoster {
    pub all: Vec<ScsiDevice>,
    /// Block-device path -> entry, for disks
    pub by_device: HashMap<String, ScsiDevice>,
}

pub fn collect(cache: &Cache) -> ScsiRoster {
    cache.get_or_insert_with("lsscsi:roster", Tier::Fast, || {
        let out = match Command::new("lsscsi").arg("-g").output() {
            Ok(o) => o,
            Err(_) => {
                tracing::debug!("lsscsi not available");
                return ScsiRoster::default();
            }
        };
        parse(&String::from_utf8_lossy(&out.stdout))
    })
}

/// Parse lsscsi -g lines, e.g.
/// `[10:0:3:0]   disk    SEAGATE  ST8000NM0075     E002  /dev/sda   /dev/sg3`
/// `[10:0:12:0]  enclosu SMC      SC826-P          0001  -          /dev/sg12`
pub fn parse(text: &str) -> ScsiRoster {
    let mut roster = ScsiRoster::default();

    for line in text.lines() {
        let Some(dev) = parse_line(line) else { continue };
        if let Some(path) = &dev.device {
            roster.by_device.insert(path.clone(), dev.clone());
        }
        roster.all.push(dev);
    }
    roster
}

fn parse_line(line: &str) -> Option<ScsiDevice> {
    let rest = line.trim();
    if !rest.starts_with('[') {
        return None;
    }
    let close = rest.find(']')?;
    let hctl = rest[1..close].to_string();
    let fields: Vec<&str> = rest[close + 1..].split_whitespace().collect();
    if fields.len() < 2 {
        return None;
    }

    let kind = fields[0].to_string();

    // The last one or two fields are device nodes (or "-" placeholders);
    // vendor/model/rev sit between the type and those.
    let mut device = None;
    let mut sg_device = None;
    let mut name_end = fields.len();
    for f in fields.iter().rev() {
        if f.starts_with("/dev/") || *f == "-" {
            name_end -= 1;
            if f.starts_with("/dev/sg") {
                sg_device = Some(f.to_string());
            } else if f.starts_with("/dev/") {
                device = Some(f.to_string());
            }
        } else {
            break;
        }
    }

    let names: Vec<&str> = fields[1..name_end].to_vec();
    let (vendor, model, rev) = match names.len() {
        0 => (None, None, None),
        1 => (Some(names[0].to_string()), None, None),
        2 => (Some(names[0].to_string()), Some(names[1].to_string()), None),
        _ => (
            Some(names[0].to_string()),
            Some(names[1..names.len() - 1].join(" ")),
            Some(names[names.len() - 1].to_string()),
        ),
    };

    Some(ScsiDevice { hctl, kind, vendor, model, rev, device, sg_device })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
[0:0:0:0]    disk    ATA      Samsung SSD 860  2B6Q  /dev/sdc   /dev/sg0
[10:0:3:0]   disk    SEAGATE  ST8000NM0075     E002  /dev/sda   /dev/sg3
[10:0:12:0]  enclosu SMC      SC826-P          0001  -          /dev/sg12
";

    #[test]
    fn parses_disks_and_enclosures() {
        let roster = parse(SAMPLE);
        assert_eq!(roster.all.len(), 3);

        let sda = &roster.by_device["/dev/sda"];
        assert_eq!(sda.hctl, "10:0:3:0");
        assert_eq!(sda.kind, "disk");
        assert_eq!(sda.vendor.as_deref(), Some("SEAGATE"));
        assert_eq!(sda.model.as_deref(), Some("ST8000NM0075"));
        assert_eq!(sda.rev.as_deref(), Some("E002"));
        assert_eq!(sda.sg_device.as_deref(), Some("/dev/sg3"));

        let enc = roster.all.iter().find(|d| d.is_enclosure()).unwrap();
        assert_eq!(enc.hctl, "10:0:12:0");
        assert_eq!(enc.device, None);
        assert_eq!(enc.sg_device.as_deref(), Some("/dev/sg12"));
        assert_eq!(enc.model.as_deref(), Some("SC826-P"));
    }

    #[test]
    fn model_with_spaces_survives() {
        let roster = parse(SAMPLE);
        let sdc = &roster.by_device["/dev/sdc"];
        assert_eq!(sdc.model.as_deref(), Some("Samsung SSD 860"));
        assert_eq!(sdc.rev.as_deref(), Some("2B6Q"));
    }

    #[test]
    fn junk_lines_are_skipped() {
        let roster = parse("no brackets here\n\n");
        assert!(roster.all.is_empty());
    }
}
