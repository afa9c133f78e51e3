//! Locator resolver: turns any identifier into an (enclosure, slot,
//! sg-device) triple. Supports literal "enclosure:slot" queries for empty
//! bays and falls back to the inventory store for drives that have
//! vanished from the live system.

use crate::cache::Cache;
use crate::collectors::SystemSnapshot;
use crate::error::EngineError;
use crate::identify::DeviceIndex;
use crate::inventory::Store;
use crate::ses::{discovery, LocateInfo};

/// Parse an "enclosure:slot" literal like "2:5".
pub fn parse_enc_slot(query: &str) -> Option<(u32, u32)> {
    let (enc, slot) = query.split_once(':')?;
    if enc.is_empty() || slot.is_empty() {
        return None;
    }
    if !enc.bytes().all(|b| b.is_ascii_digit()) || !slot.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((enc.parse().ok()?, slot.parse().ok()?))
}

/// Resolve a locate query: E:S literal first, then the identifier index,
/// then the inventory store.
pub fn resolve(
    cache: &Cache,
    snap: &SystemSnapshot,
    store: Option<&Store>,
    query: &str,
) -> Result<LocateInfo, EngineError> {
    if let Some((enclosure, slot)) = parse_enc_slot(query) {
        return resolve_bay(cache, snap, query, enclosure, slot);
    }

    match resolve_live(cache, snap, query) {
        Ok(info) => Ok(info),
        Err(live_err) => match store {
            Some(store) => resolve_from_store(cache, snap, store, query).map_err(|db_err| {
                tracing::debug!(%query, %db_err, "inventory fallback also failed");
                live_err
            }),
            None => Err(live_err),
        },
    }
}

/// Literal bay: works whether or not a drive is present, so empty and
/// failed bays can be lit.
fn resolve_bay(
    cache: &Cache,
    snap: &SystemSnapshot,
    query: &str,
    enclosure: u32,
    slot: u32,
) -> Result<LocateInfo, EngineError> {
    let mut info = LocateInfo {
        query: query.to_string(),
        matched_kind: "enclosure_slot".to_string(),
        enclosure_id: enclosure,
        slot,
        ..Default::default()
    };

    if let Some(dev) = snap.hba.device_by_slot(enclosure, slot) {
        info.serial = Some(dev.serial.clone());
        info.model = dev.model.clone();
    }

    attach_sg_device(cache, snap, enclosure, &mut info)?;
    Ok(info)
}

fn resolve_live(
    cache: &Cache,
    snap: &SystemSnapshot,
    query: &str,
) -> Result<LocateInfo, EngineError> {
    let index = DeviceIndex::build(snap);
    let (entity, kind) = index.lookup(query)?;

    let mut info = LocateInfo {
        query: query.to_string(),
        matched_kind: kind.as_str().to_string(),
        device_path: entity.device_path.clone(),
        serial: entity.serial.clone(),
        model: entity.model.clone(),
        ..Default::default()
    };

    let Some(serial) = entity.serial.clone() else {
        return Err(EngineError::Precondition(format!(
            "'{}' resolved but has no serial for the enclosure lookup",
            query
        )));
    };

    let Some(hba_dev) = snap.hba.device_by_serial(&serial) else {
        return Err(EngineError::NotFound(format!(
            "drive {} (serial {}) is not in any JBOD enclosure",
            query, serial
        )));
    };
    info.enclosure_id = hba_dev.enclosure_id;
    info.slot = hba_dev.slot;

    attach_sg_device(cache, snap, hba_dev.enclosure_id, &mut info)?;
    Ok(info)
}

/// Last-known location from the inventory store, for drives absent from
/// the live snapshot.
fn resolve_from_store(
    cache: &Cache,
    snap: &SystemSnapshot,
    store: &Store,
    query: &str,
) -> Result<LocateInfo, EngineError> {
    let row = store
        .drive_by_serial(query)
        .ok_or_else(|| EngineError::NotFound(format!("'{}' not in inventory", query)))?;

    let (Some(enclosure), Some(slot)) = (row.enclosure_id, row.slot) else {
        return Err(EngineError::Precondition(format!(
            "inventory has no location for drive {}",
            row.serial
        )));
    };

    let mut info = LocateInfo {
        query: query.to_string(),
        matched_kind: "database_serial".to_string(),
        device_path: row.device_path.clone(),
        serial: Some(row.serial.clone()),
        model: row.model.clone(),
        enclosure_id: enclosure,
        slot,
        ..Default::default()
    };

    attach_sg_device(cache, snap, enclosure, &mut info)?;
    Ok(info)
}

/// Map the enclosure id to its SES control device and record both sides'
/// SAS addresses for diagnostics.
fn attach_sg_device(
    cache: &Cache,
    snap: &SystemSnapshot,
    enclosure_id: u32,
    info: &mut LocateInfo,
) -> Result<(), EngineError> {
    let hba_enc = snap.hba.enclosure_by_id(enclosure_id);
    info.hba_sas_address = hba_enc.and_then(|e| e.sas_address.clone());

    let devices = discovery::discover(cache);
    let ses = discovery::map_enclosure(
        &devices,
        enclosure_id,
        hba_enc.and_then(|e| e.logical_id.as_deref()),
        info.hba_sas_address.as_deref(),
    )?;

    info.ses_sas_address = ses.sas_address.clone();
    info.sg_device = ses.sg_device;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn enc_slot_literals() {
        assert_eq!(parse_enc_slot("2:5"), Some((2, 5)));
        assert_eq!(parse_enc_slot("0:12"), Some((0, 12)));
        assert_eq!(parse_enc_slot("10:0:3:0"), None);
        assert_eq!(parse_enc_slot("tank"), None);
        assert_eq!(parse_enc_slot(":5"), None);
        assert_eq!(parse_enc_slot("2:"), None);
        assert_eq!(parse_enc_slot("ZA1DKJT7"), None);
    }
}
