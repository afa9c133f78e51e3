//! MD RAID probe: array identity from `mdadm --detail --scan`, live member
//! and degradation state from /proc/mdstat.

use std::collections::HashMap;
use std::fs;
use std::process::Command;

use crate::cache::{Cache, Tier};

#[derive(Debug, Clone, Default)]
pub struct MdArray {
    /// /dev/md0 or /dev/md/array1
    pub device: String,
    /// Kernel name: md0
    pub kernel_name: String,
    pub name: Option<String>,
    pub uuid: Option<String>,
    /// raid1, raid5, ...
    pub level: Option<String>,
    pub members: Vec<String>,
    pub degraded: bool,
}

pub fn collect(cache: &Cache) -> Vec<MdArray> {
    cache.get_or_insert_with("md:arrays", Tier::Medium, || {
        let scan = Command::new("mdadm")
            .args(["--detail", "--scan"])
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
            .unwrap_or_default();
        let mdstat = fs::read_to_string("/proc/mdstat").unwrap_or_default();
        merge(parse_scan(&scan), parse_mdstat(&mdstat))
    })
}

/// Parse `mdadm --detail --scan` lines:
/// ARRAY /dev/md/array1 metadata=1.2 UUID=1234:abcd:... name=host:array1
pub fn parse_scan(text: &str) -> Vec<MdArray> {
    let mut arrays = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("ARRAY") else { continue };
        let mut fields = rest.split_whitespace();
        let Some(device) = fields.next() else { continue };

        let mut arr = MdArray {
            device: device.to_string(),
            kernel_name: device.rsplit('/').next().unwrap_or(device).to_string(),
            ..Default::default()
        };

        for field in fields {
            if let Some(uuid) = field.strip_prefix("UUID=") {
                arr.uuid = Some(uuid.to_string());
            } else if let Some(name) = field.strip_prefix("name=") {
                // name=hostname:array1
                let short = name.split(':').next_back().unwrap_or(name);
                arr.name = Some(short.to_string());
            }
        }
        arrays.push(arr);
    }
    arrays
}

/// Parse /proc/mdstat for level, members and degradation:
/// md0 : active raid1 sda1[0] sdb1[1](F)
///       976630464 blocks super 1.2 [2/1] [U_]
pub fn parse_mdstat(text: &str) -> HashMap<String, MdArray> {
    let mut arrays = HashMap::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        if !line.starts_with("md") || !line.contains(" : ") {
            continue;
        }
        let Some((name, rest)) = line.split_once(" : ") else { continue };
        let kernel_name = name.trim().to_string();
        let tokens: Vec<&str> = rest.split_whitespace().collect();

        let level = tokens
            .iter()
            .find(|t| t.starts_with("raid") || **t == "linear" || **t == "multipath")
            .map(|s| s.to_string());

        let members: Vec<String> = tokens
            .iter()
            .filter(|t| t.contains('['))
            .map(|t| {
                let end = t.find('[').unwrap_or(t.len());
                t[..end].to_string()
            })
            .collect();

        // Status line follows: "976630464 blocks ... [2/1] [U_]"
        let mut degraded = false;
        if let Some(next) = lines.peek() {
            if let Some(open) = next.rfind('[') {
                if let Some(close) = next[open..].find(']') {
                    degraded = next[open..open + close].contains('_');
                }
            }
        }

        arrays.insert(
            kernel_name.clone(),
            MdArray {
                device: format!("/dev/{}", kernel_name),
                kernel_name,
                name: None,
                uuid: None,
                level,
                members,
                degraded,
            },
        );
    }
    arrays
}

/// Identity from mdadm wins; live state from mdstat fills the rest.
pub fn merge(scan: Vec<MdArray>, mut mdstat: HashMap<String, MdArray>) -> Vec<MdArray> {
    let mut out = Vec::new();

    for mut arr in scan {
        if let Some(live) = mdstat.remove(&arr.kernel_name) {
            arr.level = arr.level.or(live.level);
            arr.members = live.members;
            arr.degraded = live.degraded;
        }
        out.push(arr);
    }
    // Arrays visible in mdstat but not in mdadm config
    let mut rest: Vec<MdArray> = mdstat.into_values().collect();
    rest.sort_by(|a, b| a.kernel_name.cmp(&b.kernel_name));
    out.extend(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCAN: &str = "\
ARRAY /dev/md/boot metadata=1.2 UUID=11111111:22222222:33333333:44444444 name=host:boot
ARRAY /dev/md127 metadata=1.2 UUID=aaaaaaaa:bbbbbbbb:cccccccc:dddddddd name=host:data
";

    const MDSTAT: &str = "\
Personalities : [raid1]
md127 : active raid1 sda1[0] sdb1[1](F)
      976630464 blocks super 1.2 [2/1] [U_]

unused devices: <none>
";

    #[test]
    fn parses_scan_identity() {
        let arrays = parse_scan(SCAN);
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].kernel_name, "boot");
        assert_eq!(arrays[0].name.as_deref(), Some("boot"));
        assert_eq!(
            arrays[0].uuid.as_deref(),
            Some("11111111:22222222:33333333:44444444")
        );
    }

    #[test]
    fn mdstat_reports_members_and_degradation() {
        let arrays = parse_mdstat(MDSTAT);
        let md = &arrays["md127"];
        assert_eq!(md.level.as_deref(), Some("raid1"));
        assert_eq!(md.members, vec!["sda1", "sdb1"]);
        assert!(md.degraded);
    }

    #[test]
    fn merge_combines_identity_and_state() {
        let merged = merge(parse_scan(SCAN), parse_mdstat(MDSTAT));
        let md127 = merged.iter().find(|a| a.kernel_name == "md127").unwrap();
        assert_eq!(md127.uuid.as_deref(), Some("aaaaaaaa:bbbbbbbb:cccccccc:dddddddd"));
        assert_eq!(md127.members.len(), 2);
        assert!(md127.degraded);
        // Array known to mdadm but not running
        assert!(merged.iter().any(|a| a.kernel_name == "boot"));
    }
}
