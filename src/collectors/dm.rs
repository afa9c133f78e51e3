//! Device-mapper probe: `dmsetup info -c` name/uuid enumeration.

use std::process::Command;

use crate::cache::{Cache, Tier};

#[derive(Debug, Clone, Default)]
pub struct DmDevice {
    pub name: String,
    pub uuid: Option<String>,
    pub maj_min: Option<String>,
    /// /dev/mapper/<name>
    pub device_path: String,
}

pub fn collect(cache: &Cache) -> Vec<DmDevice> {
    cache.get_or_insert_with("dm:devices", Tier::Medium, || {
        let out = match Command::new("dmsetup")
            .args(["info", "-c", "--noheadings", "-o", "name,uuid,major,minor", "--separator", ":"])
            .output()
        {
            Ok(o) => o,
            Err(_) => return Vec::new(),
        };
        if !out.status.success() {
            return Vec::new();
        }
        parse(&String::from_utf8_lossy(&out.stdout))
    })
}

/// Lines are name:uuid:major:minor. A dm uuid may itself contain '-' but
/// never ':'.
pub fn parse(text: &str) -> Vec<DmDevice> {
    let mut devices = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == "No devices found" {
            continue;
        }
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 4 {
            continue;
        }

        let name = fields[0].to_string();
        let uuid = if fields[1].is_empty() { None } else { Some(fields[1].to_string()) };
        let maj_min = if fields[2].is_empty() || fields[3].is_empty() {
            None
        } else {
            Some(format!("{}:{}", fields[2], fields[3]))
        };

        devices.push(DmDevice {
            device_path: format!("/dev/mapper/{}", name),
            name,
            uuid,
            maj_min,
        });
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_colon_rows() {
        let devices = parse("crypt0:CRYPT-LUKS2-abc123-crypt0:253:0\nvg0-data::253:1\n");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "crypt0");
        assert_eq!(devices[0].uuid.as_deref(), Some("CRYPT-LUKS2-abc123-crypt0"));
        assert_eq!(devices[0].maj_min.as_deref(), Some("253:0"));
        assert_eq!(devices[0].device_path, "/dev/mapper/crypt0");
        assert_eq!(devices[1].uuid, None);
    }

    #[test]
    fn no_devices_message_is_empty() {
        assert!(parse("No devices found\n").is_empty());
    }
}
