//! ZFS-aware power control. Spindown walks Resolve → Analyse → Consent →
//! ExportLoop → StopLoop → Observe → Record; spinup walks Resolve →
//! StartLoop → Stabilise → ImportLoop → Record.
//!
//! Ordering guarantees: every approved pool is exported before any stop
//! command is issued, and drives are started and observed before any pool
//! import is attempted. Export failure aborts the whole operation; import
//! failure is recorded per pool and the rest continue.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::BufRead;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::cache::Cache;
use crate::collectors::{smart, zfs};
use crate::error::EngineError;
use crate::inventory::{EventRow, Store};
use crate::models::drive::{DriveRecord, DriveState};
use crate::models::event::{EventKind, ImportOutcome};

const OBSERVE_SECS: u32 = 30;
const STABILISE_SECS: u32 = 60;

/// One pool's stake in a spindown: its name and the target drives that
/// belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolMembers {
    pub pool: String,
    pub devices: Vec<String>,
    pub serials: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpindownOptions {
    /// Skip ZFS analysis entirely; stop every target drive.
    pub force: bool,
    /// Export every member pool without prompting.
    pub force_all: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpinupOptions {
    /// Do not re-import pools recorded at spindown.
    pub no_import: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpindownOutcome {
    pub targets: usize,
    /// Drives observed in standby at the end of the wait
    pub standby: usize,
    pub exported_pools: Vec<String>,
    pub skipped_pools: Vec<String>,
    pub skipped_devices: Vec<String>,
    pub command_failures: Vec<String>,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpinupOutcome {
    pub targets: usize,
    /// Drives observed active at the end of the wait
    pub active: usize,
    pub imported_pools: Vec<(String, ImportOutcome)>,
    pub command_failures: Vec<String>,
    pub interrupted: bool,
}

pub fn sdparm_present() -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|d| d.join("sdparm").is_file()))
        .unwrap_or(false)
}

// ── Spindown ─────────────────────────────────────────────────────────

/// Spin down the given (already fused) target drives. `consent` is asked
/// once per member pool unless an override applies.
pub fn spindown(
    cache: &Cache,
    store: &mut Option<Store>,
    targets: &[DriveRecord],
    opts: SpindownOptions,
    interrupt: &AtomicBool,
    mut consent: impl FnMut(&PoolMembers) -> bool,
) -> Result<SpindownOutcome, EngineError> {
    if targets.is_empty() {
        return Err(EngineError::Precondition(
            "no target drives; give devices, a controller, or --force-all".to_string(),
        ));
    }
    if !sdparm_present() {
        return Err(EngineError::ToolMissing { tool: "sdparm" });
    }

    let mut outcome = SpindownOutcome { targets: targets.len(), ..Default::default() };

    // Analyse + Consent. --force ignores pool membership entirely.
    let mut skip: HashSet<String> = HashSet::new();
    if !opts.force {
        let (pools, _non_zfs) = analyse_targets(targets);
        for pool in &pools {
            let approved = opts.force_all || consent(pool);
            if !approved {
                tracing::info!(pool = %pool.pool, "pool declined, skipping its drives");
                outcome.skipped_pools.push(pool.pool.clone());
                skip.extend(pool.devices.iter().cloned());
                continue;
            }

            // ExportLoop: sequential, fatal on failure. Already-exported
            // pools stay exported; no stop command has been issued yet.
            if let Err(e) = zfs::export_pool(&pool.pool) {
                record_pool_event(store, EventKind::PoolExport, &pool.pool, "failed");
                tracing::error!(pool = %pool.pool, error = %e, "export failed, aborting spindown");
                return Err(e);
            }
            if let Some(store) = store {
                store.record_pool_export(&pool.pool, &pool.serials, "spindown");
            }
            record_pool_event(store, EventKind::PoolExport, &pool.pool, "exported");
            outcome.exported_pools.push(pool.pool.clone());
        }
    }

    outcome.skipped_devices = skip.iter().cloned().collect();
    outcome.skipped_devices.sort();

    let stop_list: Vec<String> = targets
        .iter()
        .map(|d| d.device_path.clone())
        .filter(|d| !skip.contains(d))
        .collect();
    if stop_list.is_empty() {
        tracing::info!("no drives to spin down after pool handling");
        return Ok(outcome);
    }

    // StopLoop: parallel, per-drive failures logged but not fatal
    outcome.command_failures = power_command_fanout(&stop_list, "stop");

    // Observe: poll until every target reports standby or the window ends
    let (reached, interrupted) = observe(
        &stop_list,
        OBSERVE_SECS,
        interrupt,
        |state| state == DriveState::Standby,
    );
    outcome.standby = reached.len();
    outcome.interrupted = interrupted;

    cache.invalidate("zfs:topology");
    // Only drives actually observed in standby get a state event
    record_drive_events(store, targets, &reached, EventKind::StateChange, DriveState::Standby);
    Ok(outcome)
}

/// Group target drives by ZFS pool membership. Drives outside any pool are
/// returned separately.
pub fn analyse_targets(targets: &[DriveRecord]) -> (Vec<PoolMembers>, Vec<String>) {
    let mut pools: BTreeMap<String, PoolMembers> = BTreeMap::new();
    let mut non_zfs = Vec::new();

    for drive in targets {
        match &drive.zpool {
            Some(pool) => {
                let entry = pools.entry(pool.clone()).or_insert_with(|| PoolMembers {
                    pool: pool.clone(),
                    devices: Vec::new(),
                    serials: Vec::new(),
                });
                entry.devices.push(drive.device_path.clone());
                if let Some(serial) = &drive.serial {
                    entry.serials.push(serial.clone());
                }
            }
            None => non_zfs.push(drive.device_path.clone()),
        }
    }
    (pools.into_values().collect(), non_zfs)
}

/// Interactive consent prompt, the default `consent` for spindown.
pub fn prompt_pool_export(pool: &PoolMembers) -> bool {
    eprintln!("\nPool '{}' uses drives: {}", pool.pool, pool.devices.join(", "));
    eprint!("Export pool before spindown? [y/n]: ");

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

// ── Spinup ───────────────────────────────────────────────────────────

pub fn spinup(
    cache: &Cache,
    store: &mut Option<Store>,
    targets: &[DriveRecord],
    opts: SpinupOptions,
    interrupt: &AtomicBool,
) -> Result<SpinupOutcome, EngineError> {
    if targets.is_empty() {
        return Err(EngineError::Precondition(
            "no target drives; give devices or a controller".to_string(),
        ));
    }
    if !sdparm_present() {
        return Err(EngineError::ToolMissing { tool: "sdparm" });
    }

    let mut outcome = SpinupOutcome { targets: targets.len(), ..Default::default() };
    let devices: Vec<String> = targets.iter().map(|d| d.device_path.clone()).collect();

    // StartLoop then Stabilise; imports only run against spun-up drives
    outcome.command_failures = power_command_fanout(&devices, "start");
    let (reached, interrupted) = observe(
        &devices,
        STABILISE_SECS,
        interrupt,
        |state| state == DriveState::Active,
    );
    outcome.active = reached.len();
    outcome.interrupted = interrupted;
    record_drive_events(store, targets, &reached, EventKind::StateChange, DriveState::Active);

    if opts.no_import {
        return Ok(outcome);
    }

    // ImportLoop: oldest export first, sequential, per-pool outcomes.
    // Interrupts are honoured between pools, never mid-import.
    let serials: Vec<String> =
        targets.iter().filter_map(|d| d.serial.clone()).collect();
    let pending = match store.as_mut() {
        Some(s) => s.pending_imports_for(&serials),
        None => {
            tracing::warn!("no inventory store; cannot resolve pending pool imports");
            return Ok(outcome);
        }
    };

    for row in pending {
        if interrupt.load(Ordering::Relaxed) {
            outcome.interrupted = true;
            break;
        }
        let status = match zfs::import_pool(&row.pool_name) {
            Ok(()) => ImportOutcome::Success,
            Err(e) => {
                tracing::error!(pool = %row.pool_name, error = %e, "pool import failed");
                ImportOutcome::Failed
            }
        };
        if let Some(s) = store.as_mut() {
            s.mark_imported(&row.pool_name, status);
        }
        record_pool_event(
            store,
            EventKind::PoolImport,
            &row.pool_name,
            if status == ImportOutcome::Success { "imported" } else { "failed" },
        );
        outcome.imported_pools.push((row.pool_name.clone(), status));
    }

    cache.invalidate("zfs:topology");
    Ok(outcome)
}

// ── Shared machinery ─────────────────────────────────────────────────

/// Issue `sdparm --command=<stop|start>` to every device in parallel.
/// Returns per-device failure messages.
fn power_command_fanout(devices: &[String], command: &str) -> Vec<String> {
    let (tx, rx) = mpsc::channel();

    thread::scope(|s| {
        for device in devices {
            let tx = tx.clone();
            s.spawn(move || {
                let result = Command::new("sdparm")
                    .arg(format!("--command={}", command))
                    .arg(device)
                    .output();
                let failure = match result {
                    Ok(out) if out.status.success() => None,
                    Ok(out) => Some(format!(
                        "{}: {}",
                        device,
                        String::from_utf8_lossy(&out.stderr).trim()
                    )),
                    Err(e) => Some(format!("{}: {}", device, e)),
                };
                let _ = tx.send(failure);
            });
        }
    });
    drop(tx);

    let mut failures: Vec<String> = rx.into_iter().flatten().collect();
    failures.sort();
    for f in &failures {
        tracing::warn!(failure = %f, command, "power command failed");
    }
    failures
}

/// Poll drive state once per second for up to `window_secs`, collecting
/// the devices that satisfy `reached`. Terminates early when all do, or on
/// interrupt. The state probe is the standby-safe one; polling never wakes
/// a drive.
fn observe(
    devices: &[String],
    window_secs: u32,
    interrupt: &AtomicBool,
    reached: impl Fn(DriveState) -> bool,
) -> (Vec<String>, bool) {
    let mut done: Vec<String> = Vec::new();
    for _ in 0..window_secs {
        if interrupt.load(Ordering::Relaxed) {
            return (done, true);
        }
        thread::sleep(Duration::from_secs(1));

        done = devices
            .iter()
            .filter(|d| reached(smart::probe_state_fresh(d)))
            .cloned()
            .collect();
        eprint!("\r  {}/{} drives reached target state...", done.len(), devices.len());
        if done.len() == devices.len() {
            break;
        }
    }
    eprintln!();
    (done, false)
}

fn record_pool_event(store: &mut Option<Store>, kind: EventKind, pool: &str, detail: &str) {
    if let Some(store) = store {
        store.record_event(EventRow {
            id: 0,
            serial: String::new(),
            kind,
            old_state: None,
            new_state: None,
            device_path: None,
            enclosure_id: None,
            slot: None,
            details: serde_json::json!({ "pool": pool, "result": detail }),
            timestamp: chrono::Utc::now(),
        });
    }
}

fn record_drive_events(
    store: &mut Option<Store>,
    targets: &[DriveRecord],
    affected: &[String],
    kind: EventKind,
    new_state: DriveState,
) {
    let Some(store) = store else { return };
    for drive in targets.iter().filter(|d| affected.contains(&d.device_path)) {
        let Some(serial) = &drive.serial else { continue };
        store.record_event(EventRow {
            id: 0,
            serial: serial.clone(),
            kind,
            old_state: Some(drive.state),
            new_state: Some(new_state),
            device_path: Some(drive.device_path.clone()),
            enclosure_id: drive.enclosure_id,
            slot: drive.slot,
            details: serde_json::Value::Null,
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drive(path: &str, serial: &str, pool: Option<&str>) -> DriveRecord {
        DriveRecord {
            serial: Some(serial.to_string()),
            zpool: pool.map(String::from),
            state: DriveState::Active,
            ..DriveRecord::new(path)
        }
    }

    #[test]
    fn analyse_groups_by_pool_membership() {
        let targets = vec![
            drive("/dev/sda", "ZA1DKJT7", Some("tank")),
            drive("/dev/sdb", "ZA1DKJT8", Some("tank")),
            drive("/dev/sdc", "S3Z9NB0K", None),
            drive("/dev/sdd", "WCK5NWKQ", Some("scratch")),
        ];
        let (pools, non_zfs) = analyse_targets(&targets);

        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].pool, "scratch");
        assert_eq!(pools[1].pool, "tank");
        assert_eq!(pools[1].devices, vec!["/dev/sda", "/dev/sdb"]);
        assert_eq!(pools[1].serials, vec!["ZA1DKJT7", "ZA1DKJT8"]);
        assert_eq!(non_zfs, vec!["/dev/sdc"]);
    }

    #[test]
    fn empty_target_set_is_a_precondition_failure() {
        let cache = Cache::new();
        let mut store = None;
        let interrupt = AtomicBool::new(false);
        let err = spindown(
            &cache,
            &mut store,
            &[],
            SpindownOptions::default(),
            &interrupt,
            |_| true,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn spindown_without_sdparm_is_tool_missing() {
        if sdparm_present() {
            return;
        }
        let cache = Cache::new();
        let mut store = None;
        let interrupt = AtomicBool::new(false);
        let targets = vec![drive("/dev/sda", "ZA1DKJT7", None)];
        let err = spindown(
            &cache,
            &mut store,
            &targets,
            SpindownOptions::default(),
            &interrupt,
            |_| true,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ToolMissing { tool: "sdparm" }));
    }
}
