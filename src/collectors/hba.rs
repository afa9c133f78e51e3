//! Merged HBA view across storcli and sas3ircu. storcli wins identity
//! fields; sas3ircu wins topology (enclosure list, VPD serial).

use std::collections::HashMap;

use crate::cache::Cache;
use crate::collectors::{sas3ircu, storcli};
use crate::models::hba::{ControllerRecord, EnclosureRecord, HbaDrive};

#[derive(Debug, Clone, Default)]
pub struct HbaInventory {
    pub controllers: Vec<ControllerRecord>,
    pub enclosures: Vec<EnclosureRecord>,
    /// Keyed by upper-cased short serial
    pub drives: HashMap<String, HbaDrive>,
}

pub fn collect(cache: &Cache) -> HbaInventory {
    let (storcli_ctrls, storcli_drives) = storcli::collect(cache);
    let ircu = sas3ircu::collect(cache);
    merge(storcli_ctrls, storcli_drives, ircu)
}

pub fn merge(
    storcli_ctrls: Vec<ControllerRecord>,
    storcli_drives: HashMap<String, HbaDrive>,
    ircu: sas3ircu::Sas3ircuData,
) -> HbaInventory {
    let mut inv = HbaInventory {
        enclosures: ircu.enclosures,
        ..Default::default()
    };

    // Controllers: storcli identity preferred, sas3ircu fills gaps by id
    let mut seen: HashMap<String, usize> = HashMap::new();
    for ctrl in storcli_ctrls {
        seen.insert(ctrl.id.clone(), inv.controllers.len());
        inv.controllers.push(ctrl);
    }
    for ctrl in ircu.controllers {
        match seen.get(&ctrl.id) {
            Some(&i) => {
                let dst = &mut inv.controllers[i];
                fill(&mut dst.model, ctrl.model);
                fill(&mut dst.firmware_version, ctrl.firmware_version);
                fill(&mut dst.bios_version, ctrl.bios_version);
                dst.phy_count = dst.phy_count.or(ctrl.phy_count);
            }
            None => inv.controllers.push(ctrl),
        }
    }

    // Drives: sas3ircu topology as base, storcli identity layered on top
    inv.drives = ircu.drives;
    for (serial, sc) in storcli_drives {
        match inv.drives.get_mut(&serial) {
            Some(base) => {
                fill(&mut base.wwn, sc.wwn);
                fill(&mut base.model, sc.model);
                fill(&mut base.vendor, sc.vendor);
                fill(&mut base.firmware, sc.firmware);
                fill(&mut base.link_speed, sc.link_speed);
                base.size_bytes = sc.size_bytes.or(base.size_bytes);
                base.sector_size = sc.sector_size.or(base.sector_size);
                base.media_errors = sc.media_errors.or(base.media_errors);
                base.protocol = sc.protocol.or(base.protocol);
                base.media_type = sc.media_type.or(base.media_type);
            }
            None => {
                inv.drives.insert(serial, sc);
            }
        }
    }

    // No enclosure list from sas3ircu: derive bare records from drive
    // locations so the locator still has ids to work with
    if inv.enclosures.is_empty() {
        let mut ids: Vec<u32> = inv.drives.values().map(|d| d.enclosure_id).collect();
        ids.sort_unstable();
        ids.dedup();
        inv.enclosures = ids.into_iter().map(EnclosureRecord::new).collect();
    }

    inv
}

fn fill(dst: &mut Option<String>, src: Option<String>) {
    if dst.is_none() {
        *dst = src;
    }
}

impl HbaInventory {
    /// Case-insensitive lookup by short serial, falling back to VPD serial.
    pub fn device_by_serial(&self, serial: &str) -> Option<&HbaDrive> {
        let upper = serial.to_uppercase();
        if let Some(d) = self.drives.get(&upper) {
            return Some(d);
        }
        self.drives
            .values()
            .find(|d| d.serial_vpd.as_deref().map(str::to_uppercase) == Some(upper.clone()))
    }

    pub fn device_by_slot(&self, enclosure: u32, slot: u32) -> Option<&HbaDrive> {
        self.drives
            .values()
            .find(|d| d.enclosure_id == enclosure && d.slot == slot)
    }

    pub fn enclosure_by_id(&self, id: u32) -> Option<&EnclosureRecord> {
        self.enclosures.iter().find(|e| e.id == id)
    }

    /// Serials (short and VPD, upper-cased) attached to one controller.
    pub fn serials_on_controller(&self, controller_id: &str) -> Vec<String> {
        let mut serials = Vec::new();
        for d in self.drives.values() {
            if d.controller_id != controller_id {
                continue;
            }
            serials.push(d.serial.to_uppercase());
            if let Some(vpd) = &d.serial_vpd {
                serials.push(vpd.to_uppercase());
            }
        }
        serials
    }
}

/// Controller die temperature from whichever tool answers.
pub fn controller_temperature(cache: &Cache, controller_id: &str) -> Option<i32> {
    storcli::temperature(cache, controller_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hba::HbaFamily;
    use pretty_assertions::assert_eq;

    fn ircu_data() -> sas3ircu::Sas3ircuData {
        let mut drives = HashMap::new();
        let mut d = HbaDrive::new("c0", 2, 5);
        d.serial = "ZA1DKJT7".to_string();
        d.serial_vpd = Some("ZA1DKJT70000C907B6FF".to_string());
        d.sas_address = Some("5000c500a6e7b829".to_string());
        drives.insert("ZA1DKJT7".to_string(), d);

        let mut enc = EnclosureRecord::new(2);
        enc.sas_address = Some("5003048020b3fe7f".to_string());

        sas3ircu::Sas3ircuData {
            controllers: vec![ControllerRecord::new("c0", HbaFamily::Sas3ircu)],
            enclosures: vec![enc],
            drives,
        }
    }

    fn storcli_data() -> (Vec<ControllerRecord>, HashMap<String, HbaDrive>) {
        let mut ctrl = ControllerRecord::new("c0", HbaFamily::Storcli);
        ctrl.model = Some("HBA330 Adapter".to_string());

        let mut d = HbaDrive::new("c0", 12, 5);
        d.serial = "ZA1DKJT7".to_string();
        d.model = Some("ST8000NM0075".to_string());
        d.media_errors = Some(3);
        let mut drives = HashMap::new();
        drives.insert("ZA1DKJT7".to_string(), d);

        (vec![ctrl], drives)
    }

    #[test]
    fn storcli_identity_layers_over_ircu_topology() {
        let (ctrls, drives) = storcli_data();
        let inv = merge(ctrls, drives, ircu_data());

        assert_eq!(inv.controllers.len(), 1);
        assert_eq!(inv.controllers[0].family, HbaFamily::Storcli);
        assert_eq!(inv.controllers[0].model.as_deref(), Some("HBA330 Adapter"));

        let d = inv.device_by_serial("za1dkjt7").unwrap();
        // Topology from sas3ircu is kept
        assert_eq!(d.enclosure_id, 2);
        assert_eq!(d.slot, 5);
        assert_eq!(d.serial_vpd.as_deref(), Some("ZA1DKJT70000C907B6FF"));
        // Identity from storcli is layered on
        assert_eq!(d.model.as_deref(), Some("ST8000NM0075"));
        assert_eq!(d.media_errors, Some(3));
    }

    #[test]
    fn lookup_falls_back_to_vpd_serial() {
        let inv = merge(Vec::new(), HashMap::new(), ircu_data());
        assert!(inv.device_by_serial("ZA1DKJT70000C907B6FF").is_some());
        assert!(inv.device_by_serial("NOPE").is_none());
    }

    #[test]
    fn enclosures_derived_from_drives_when_list_missing() {
        let mut data = ircu_data();
        data.enclosures.clear();
        let inv = merge(Vec::new(), HashMap::new(), data);
        assert_eq!(inv.enclosures.len(), 1);
        assert_eq!(inv.enclosures[0].id, 2);
    }

    #[test]
    fn device_by_slot_matches_location() {
        let inv = merge(Vec::new(), HashMap::new(), ircu_data());
        assert!(inv.device_by_slot(2, 5).is_some());
        assert!(inv.device_by_slot(2, 6).is_none());
    }
}
