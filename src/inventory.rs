//! Inventory store: drives keyed by serial, append-only events and alerts,
//! and exported-pool records for spindown/spinup tracking.
//!
//! Backed by JSON files in one directory, written atomically (tmp file then
//! rename). The contract is narrow; callers never see the storage layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::drive::DriveState;
use crate::models::event::{AlertCategory, EventKind, ImportOutcome, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveRow {
    pub serial: String,
    #[serde(default)]
    pub serial_vpd: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub firmware: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,

    // Last-known location
    #[serde(default)]
    pub controller_id: Option<String>,
    #[serde(default)]
    pub enclosure_id: Option<u32>,
    #[serde(default)]
    pub slot: Option<u32>,
    #[serde(default)]
    pub sas_address: Option<String>,

    // Last-known OS view
    #[serde(default)]
    pub device_path: Option<String>,
    #[serde(default)]
    pub wwn: Option<String>,

    // ZFS membership, possibly stale for a failed drive
    #[serde(default)]
    pub zpool: Option<String>,
    #[serde(default)]
    pub vdev_type: Option<String>,
    #[serde(default)]
    pub vdev_guid: Option<String>,

    pub state: DriveState,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: u64,
    pub serial: String,
    pub kind: EventKind,
    #[serde(default)]
    pub old_state: Option<DriveState>,
    #[serde(default)]
    pub new_state: Option<DriveState>,
    #[serde(default)]
    pub device_path: Option<String>,
    #[serde(default)]
    pub enclosure_id: Option<u32>,
    #[serde(default)]
    pub slot: Option<u32>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: u64,
    pub severity: Severity,
    pub category: AlertCategory,
    pub message: String,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub acknowledged: bool,
    #[serde(default)]
    pub ack_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedPoolRow {
    pub id: u64,
    pub pool_name: String,
    pub exported_at: DateTime<Utc>,
    pub reason: String,
    pub member_serials: Vec<String>,
    #[serde(default)]
    pub imported_at: Option<DateTime<Utc>>,
    pub import_outcome: ImportOutcome,
}

impl ExportedPoolRow {
    pub fn is_pending(&self) -> bool {
        self.import_outcome == ImportOutcome::Pending
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DriveFile {
    drives: HashMap<String, DriveRow>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EventFile {
    next_id: u64,
    events: Vec<EventRow>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AlertFile {
    next_id: u64,
    alerts: Vec<AlertRow>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ExportFile {
    next_id: u64,
    pools: Vec<ExportedPoolRow>,
}

pub struct Store {
    dir: PathBuf,
    drives: DriveFile,
    events: EventFile,
    alerts: AlertFile,
    exports: ExportFile,
}

impl Store {
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join("jbodctl"))
    }

    pub fn open(dir: &Path) -> io::Result<Store> {
        fs::create_dir_all(dir)?;
        Ok(Store {
            dir: dir.to_path_buf(),
            drives: load(&dir.join("drives.json")),
            events: load(&dir.join("events.json")),
            alerts: load(&dir.join("alerts.json")),
            exports: load(&dir.join("exported_pools.json")),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ── Drives ───────────────────────────────────────────────────────

    /// Insert or update a drive by serial, recording lifecycle events for
    /// discovery, moves and state changes.
    pub fn upsert_drive(&mut self, mut row: DriveRow) {
        let key = row.serial.to_uppercase();
        let now = Utc::now();
        row.last_seen = now;

        match self.drives.drives.get(&key).cloned() {
            None => {
                row.first_seen = now;
                self.push_event(EventRow {
                    id: 0,
                    serial: row.serial.clone(),
                    kind: EventKind::Discovered,
                    old_state: None,
                    new_state: Some(row.state),
                    device_path: row.device_path.clone(),
                    enclosure_id: row.enclosure_id,
                    slot: row.slot,
                    details: serde_json::Value::Null,
                    timestamp: now,
                });
                self.drives.drives.insert(key, row);
            }
            Some(old) => {
                row.first_seen = old.first_seen;

                let moved = old.enclosure_id.is_some()
                    && row.enclosure_id.is_some()
                    && (old.enclosure_id != row.enclosure_id || old.slot != row.slot);
                if moved {
                    self.push_event(EventRow {
                        id: 0,
                        serial: row.serial.clone(),
                        kind: EventKind::Moved,
                        old_state: None,
                        new_state: None,
                        device_path: row.device_path.clone(),
                        enclosure_id: row.enclosure_id,
                        slot: row.slot,
                        details: serde_json::json!({
                            "from": format!("{}:{}", old.enclosure_id.unwrap_or(0), old.slot.unwrap_or(0)),
                        }),
                        timestamp: now,
                    });
                }

                if old.state != row.state {
                    self.push_event(EventRow {
                        id: 0,
                        serial: row.serial.clone(),
                        kind: state_change_kind(old.state, row.state),
                        old_state: Some(old.state),
                        new_state: Some(row.state),
                        device_path: row.device_path.clone(),
                        enclosure_id: row.enclosure_id,
                        slot: row.slot,
                        details: serde_json::Value::Null,
                        timestamp: now,
                    });
                }
                self.drives.drives.insert(key, row);
            }
        }

        self.save_drives();
        self.save_events();
    }

    pub fn drive_by_serial(&self, serial: &str) -> Option<&DriveRow> {
        self.drives.drives.get(&serial.to_uppercase())
    }

    pub fn drive_by_device_path(&self, path: &str) -> Option<&DriveRow> {
        self.drives.drives.values().find(|d| d.device_path.as_deref() == Some(path))
    }

    pub fn all_drives(&self) -> Vec<&DriveRow> {
        let mut rows: Vec<&DriveRow> = self.drives.drives.values().collect();
        rows.sort_by(|a, b| a.serial.cmp(&b.serial));
        rows
    }

    pub fn known_serials(&self) -> HashSet<String> {
        self.drives.drives.keys().cloned().collect()
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn record_event(&mut self, mut event: EventRow) {
        event.timestamp = Utc::now();
        self.push_event(event);
        self.save_events();
    }

    fn push_event(&mut self, mut event: EventRow) {
        self.events.next_id += 1;
        event.id = self.events.next_id;
        self.events.events.push(event);
    }

    pub fn recent_events(&self, limit: usize) -> Vec<&EventRow> {
        let events = &self.events.events;
        events.iter().rev().take(limit).collect()
    }

    pub fn events_for_serial(&self, serial: &str, limit: usize) -> Vec<&EventRow> {
        let upper = serial.to_uppercase();
        self.events
            .events
            .iter()
            .rev()
            .filter(|e| e.serial.to_uppercase() == upper)
            .take(limit)
            .collect()
    }

    // ── Alerts ───────────────────────────────────────────────────────

    pub fn append_alert(
        &mut self,
        severity: Severity,
        category: AlertCategory,
        message: &str,
        serial: Option<String>,
        pool: Option<String>,
        details: serde_json::Value,
    ) -> u64 {
        self.alerts.next_id += 1;
        let id = self.alerts.next_id;
        self.alerts.alerts.push(AlertRow {
            id,
            severity,
            category,
            message: message.to_string(),
            serial,
            pool,
            details,
            acknowledged: false,
            ack_at: None,
            timestamp: Utc::now(),
        });
        self.save_alerts();
        id
    }

    pub fn alerts(&self, unacked_only: bool) -> Vec<&AlertRow> {
        self.alerts
            .alerts
            .iter()
            .filter(|a| !unacked_only || !a.acknowledged)
            .collect()
    }

    pub fn acknowledge_alert(&mut self, id: u64) -> bool {
        let found = self.alerts.alerts.iter_mut().find(|a| a.id == id);
        match found {
            Some(a) if !a.acknowledged => {
                a.acknowledged = true;
                a.ack_at = Some(Utc::now());
                self.save_alerts();
                true
            }
            _ => false,
        }
    }

    pub fn acknowledge_all(&mut self) -> usize {
        let now = Utc::now();
        let mut n = 0;
        for a in self.alerts.alerts.iter_mut().filter(|a| !a.acknowledged) {
            a.acknowledged = true;
            a.ack_at = Some(now);
            n += 1;
        }
        if n > 0 {
            self.save_alerts();
        }
        n
    }

    // ── Exported pools ───────────────────────────────────────────────

    pub fn record_pool_export(&mut self, pool: &str, member_serials: &[String], reason: &str) {
        self.exports.next_id += 1;
        self.exports.pools.push(ExportedPoolRow {
            id: self.exports.next_id,
            pool_name: pool.to_string(),
            exported_at: Utc::now(),
            reason: reason.to_string(),
            member_serials: member_serials.to_vec(),
            imported_at: None,
            import_outcome: ImportOutcome::Pending,
        });
        self.save_exports();
    }

    /// Pending exports, oldest first.
    pub fn pending_imports(&self) -> Vec<&ExportedPoolRow> {
        let mut rows: Vec<&ExportedPoolRow> =
            self.exports.pools.iter().filter(|p| p.is_pending()).collect();
        rows.sort_by_key(|p| p.exported_at);
        rows
    }

    /// Pending exports whose member serials intersect `serials`, oldest
    /// first.
    pub fn pending_imports_for(&self, serials: &[String]) -> Vec<ExportedPoolRow> {
        let wanted: HashSet<String> = serials.iter().map(|s| s.to_uppercase()).collect();
        let mut rows: Vec<ExportedPoolRow> = self
            .exports
            .pools
            .iter()
            .filter(|p| p.is_pending())
            .filter(|p| p.member_serials.iter().any(|s| wanted.contains(&s.to_uppercase())))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.exported_at);
        rows
    }

    /// Mark the oldest pending record for `pool` with its import outcome.
    pub fn mark_imported(&mut self, pool: &str, outcome: ImportOutcome) {
        let row = self
            .exports
            .pools
            .iter_mut()
            .filter(|p| p.pool_name == pool && p.is_pending())
            .min_by_key(|p| p.exported_at);
        if let Some(row) = row {
            row.imported_at = Some(Utc::now());
            row.import_outcome = outcome;
            self.save_exports();
        }
    }

    pub fn exported_pools(&self) -> &[ExportedPoolRow] {
        &self.exports.pools
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn save_drives(&self) {
        save(&self.dir.join("drives.json"), &self.drives);
    }
    fn save_events(&self) {
        save(&self.dir.join("events.json"), &self.events);
    }
    fn save_alerts(&self) {
        save(&self.dir.join("alerts.json"), &self.alerts);
    }
    fn save_exports(&self) {
        save(&self.dir.join("exported_pools.json"), &self.exports);
    }
}

fn state_change_kind(old: DriveState, new: DriveState) -> EventKind {
    match (old, new) {
        (_, DriveState::Missing) => EventKind::Missing,
        (_, DriveState::Failed) => EventKind::Failed,
        (DriveState::Missing, DriveState::Active | DriveState::Standby) => EventKind::Online,
        _ => EventKind::StateChange,
    }
}

fn load<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
        Err(_) => T::default(),
    }
}

/// Atomic best-effort write: serialise to a sibling tmp file, then rename.
fn save<T: Serialize>(path: &Path, value: &T) {
    let Ok(json) = serde_json::to_string_pretty(value) else { return };
    let tmp = path.with_extension("json.tmp");
    if fs::write(&tmp, json).is_ok() {
        let _ = fs::rename(&tmp, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(serial: &str, state: DriveState) -> DriveRow {
        DriveRow {
            serial: serial.to_string(),
            serial_vpd: None,
            model: Some("ST8000NM0075".to_string()),
            vendor: None,
            firmware: None,
            size_bytes: None,
            protocol: None,
            media_type: None,
            controller_id: Some("c0".to_string()),
            enclosure_id: Some(2),
            slot: Some(5),
            sas_address: None,
            device_path: Some("/dev/sda".to_string()),
            wwn: None,
            zpool: None,
            vdev_type: None,
            vdev_guid: None,
            state,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn upsert_records_discovery_then_state_change() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Store::open(tmp.path()).unwrap();

        store.upsert_drive(row("ZA1DKJT7", DriveState::Active));
        store.upsert_drive(row("ZA1DKJT7", DriveState::Missing));

        let events = store.recent_events(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Missing);
        assert_eq!(events[0].old_state, Some(DriveState::Active));
        assert_eq!(events[1].kind, EventKind::Discovered);

        // Case-insensitive serial lookup
        assert!(store.drive_by_serial("za1dkjt7").is_some());
        assert!(store.drive_by_device_path("/dev/sda").is_some());
    }

    #[test]
    fn moved_drive_records_a_move_event() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Store::open(tmp.path()).unwrap();

        store.upsert_drive(row("WCK5NWKQ", DriveState::Active));
        let mut relocated = row("WCK5NWKQ", DriveState::Active);
        relocated.enclosure_id = Some(3);
        relocated.slot = Some(1);
        store.upsert_drive(relocated);

        let kinds: Vec<EventKind> = store.recent_events(10).iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::Moved));
    }

    #[test]
    fn store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut store = Store::open(tmp.path()).unwrap();
            store.upsert_drive(row("ZA1DKJT7", DriveState::Active));
            store.record_pool_export(
                "tank",
                &["ZA1DKJT7".to_string(), "ZA1DKJT8".to_string()],
                "spindown",
            );
        }
        let store = Store::open(tmp.path()).unwrap();
        assert!(store.drive_by_serial("ZA1DKJT7").is_some());
        assert_eq!(store.pending_imports().len(), 1);
        assert_eq!(store.pending_imports()[0].pool_name, "tank");
    }

    #[test]
    fn pending_imports_intersect_serials_oldest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Store::open(tmp.path()).unwrap();

        store.record_pool_export("tankA", &["AAA".to_string()], "spindown");
        store.record_pool_export("tankB", &["BBB".to_string()], "spindown");
        store.record_pool_export("tankC", &["CCC".to_string()], "spindown");

        let hits = store.pending_imports_for(&["bbb".to_string(), "CCC".to_string()]);
        let names: Vec<&str> = hits.iter().map(|p| p.pool_name.as_str()).collect();
        assert_eq!(names, vec!["tankB", "tankC"]);

        store.mark_imported("tankB", ImportOutcome::Success);
        let hits = store.pending_imports_for(&["BBB".to_string()]);
        assert!(hits.is_empty());

        let row = store.exported_pools().iter().find(|p| p.pool_name == "tankB").unwrap();
        assert_eq!(row.import_outcome, ImportOutcome::Success);
        assert!(row.imported_at.is_some());
    }

    #[test]
    fn alert_acknowledgement() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Store::open(tmp.path()).unwrap();

        let id = store.append_alert(
            Severity::Critical,
            AlertCategory::DriveMissing,
            "Drive /dev/sda is missing",
            Some("ZA1DKJT7".to_string()),
            None,
            serde_json::Value::Null,
        );
        store.append_alert(
            Severity::Warning,
            AlertCategory::Temperature,
            "Drive /dev/sdb at 57C",
            None,
            None,
            serde_json::Value::Null,
        );

        assert_eq!(store.alerts(true).len(), 2);
        assert!(store.acknowledge_alert(id));
        assert!(!store.acknowledge_alert(id));
        assert_eq!(store.alerts(true).len(), 1);
        assert_eq!(store.alerts(false).len(), 2);
        assert_eq!(store.acknowledge_all(), 1);
        assert_eq!(store.alerts(true).len(), 0);
    }
}
