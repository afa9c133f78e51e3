//! Enclosure discovery and HBA-to-SES mapping. SES control devices come
//! from the SCSI-generic roster; their SAS address comes from the
//! enclosure descriptor page and is matched against the HBA-reported
//! address to find the right /dev/sg node for LED commands.

use regex::Regex;
use std::process::Command;

use crate::cache::{Cache, Tier};
use crate::collectors::lsscsi;
use crate::error::EngineError;
use crate::ses::EnclosureSes;

/// All SES enclosure control devices on the host, cached SLOW.
pub fn discover(cache: &Cache) -> Vec<EnclosureSes> {
    cache.get_or_insert_with("ses:devices", Tier::Slow, || {
        let roster = lsscsi::collect(cache);
        let mut enclosures = Vec::new();

        for dev in roster.all.iter().filter(|d| d.is_enclosure()) {
            let Some(sg) = dev.sg_device.clone() else { continue };
            let mut enc = EnclosureSes {
                sg_device: sg.clone(),
                vendor: dev.vendor.clone(),
                product: dev.model.clone(),
                ..Default::default()
            };
            enc.sas_address = read_sas_address(&sg);
            enclosures.push(enc);
        }
        enclosures
    })
}

/// SAS address from the enclosure descriptor page, with the additional
/// element status page as fallback.
fn read_sas_address(sg_device: &str) -> Option<String> {
    for page in ["ed", "aes"] {
        let out = Command::new("sg_ses")
            .args([&format!("--page={}", page), sg_device])
            .output()
            .ok()?;
        if let Some(addr) = parse_sas_address(&String::from_utf8_lossy(&out.stdout)) {
            return Some(addr);
        }
    }
    None
}

pub fn parse_sas_address(output: &str) -> Option<String> {
    const PATTERNS: [&str; 3] = [
        r"(?i)enclosure logical identifier[:\s]+0x([0-9a-fA-F]+)",
        r"(?i)sas\s+address[:\s]+0x([0-9a-fA-F]+)",
        r"(?i)attached\s+sas\s+address[:\s]+0x([0-9a-fA-F]+)",
    ];
    for pattern in PATTERNS {
        if let Some(cap) = Regex::new(pattern).unwrap().captures(output) {
            return Some(cap[1].to_lowercase());
        }
    }
    None
}

/// Strip 0x prefix and separators so addresses from different reporters
/// compare.
pub fn normalize_sas(addr: &str) -> String {
    addr.to_lowercase()
        .trim_start_matches("0x")
        .replace(['-', ':'], "")
}

/// Map an HBA enclosure to its SES control device. Suffix match tolerated:
/// reporting tools truncate or extend the address prefix differently. A
/// single SES device on the host is assumed to be the target even without
/// an address match.
pub fn map_enclosure(
    devices: &[EnclosureSes],
    enclosure_id: u32,
    logical_id: Option<&str>,
    hba_sas_address: Option<&str>,
) -> Result<EnclosureSes, EngineError> {
    if devices.is_empty() {
        return Err(EngineError::NotFound(format!(
            "no SES control devices on host (enclosure {}; is the sg module loaded?)",
            enclosure_id
        )));
    }

    let wanted = hba_sas_address.map(normalize_sas).filter(|a| !a.is_empty());
    if let Some(wanted) = &wanted {
        for enc in devices {
            let Some(addr) = &enc.sas_address else { continue };
            let have = normalize_sas(addr);
            if have == *wanted || wanted.ends_with(&have) || have.ends_with(wanted) {
                let mut found = enc.clone();
                found.enclosure_id = Some(enclosure_id);
                found.logical_id = logical_id.map(String::from);
                return Ok(found);
            }
        }
    }

    if devices.len() == 1 {
        let mut found = devices[0].clone();
        found.enclosure_id = Some(enclosure_id);
        found.logical_id = logical_id.map(String::from);
        return Ok(found);
    }

    Err(EngineError::NotFound(format!(
        "no SES device matches enclosure {} (sas address {:?})",
        enclosure_id, hba_sas_address
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ses(sg: &str, sas: Option<&str>) -> EnclosureSes {
        EnclosureSes {
            sg_device: sg.to_string(),
            sas_address: sas.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn parses_descriptor_page_address() {
        let out = "\
  Primary enclosure logical identifier (hex): 5003048020b3fe7f
  enclosure logical identifier: 0x5003048020b3fe7f
";
        assert_eq!(parse_sas_address(out), Some("5003048020b3fe7f".to_string()));
        assert_eq!(parse_sas_address("nothing"), None);
    }

    #[test]
    fn normalizes_reporter_formats() {
        assert_eq!(normalize_sas("0x5003048020B3FE7F"), "5003048020b3fe7f");
        assert_eq!(normalize_sas("5003-0480-20b3-fe7f"), "5003048020b3fe7f");
        assert_eq!(normalize_sas("50030480:20b3fe7f"), "5003048020b3fe7f");
    }

    #[test]
    fn exact_and_suffix_match() {
        let devices = vec![
            ses("/dev/sg12", Some("5003048020b3fe7f")),
            ses("/dev/sg13", Some("50030480aaaaffff")),
        ];

        let found =
            map_enclosure(&devices, 2, None, Some("0x5003048020b3fe7f")).unwrap();
        assert_eq!(found.sg_device, "/dev/sg12");
        assert_eq!(found.enclosure_id, Some(2));

        // HBA reports a truncated prefix
        let found = map_enclosure(&devices, 2, None, Some("20b3fe7f")).unwrap();
        assert_eq!(found.sg_device, "/dev/sg12");
    }

    #[test]
    fn singleton_fallback_without_address_match() {
        let devices = vec![ses("/dev/sg12", None)];
        let found = map_enclosure(&devices, 1, Some("logical"), Some("beef")).unwrap();
        assert_eq!(found.sg_device, "/dev/sg12");
        assert_eq!(found.logical_id.as_deref(), Some("logical"));
    }

    #[test]
    fn ambiguity_on_multiple_devices_is_not_guessed() {
        let devices = vec![ses("/dev/sg12", None), ses("/dev/sg13", None)];
        assert!(map_enclosure(&devices, 1, None, Some("beef")).is_err());
        assert!(map_enclosure(&[], 1, None, None).is_err());
    }
}
