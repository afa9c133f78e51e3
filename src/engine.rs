//! Engine operation surface. Each operation builds (or reuses, via the
//! cache) one system snapshot, works against it, and returns typed
//! results; the CLI layer only renders them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::collectors::{self, hba, SystemSnapshot};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::fusion;
use crate::health::{self, HealthResult};
use crate::identify::{DeviceEntity, DeviceIndex, IdentifierKind};
use crate::inventory::{DriveRow, Store};
use crate::models::drive::{DriveRecord, DriveState, Summary};
use crate::output;
use crate::power::{self, SpindownOptions, SpindownOutcome, SpinupOptions, SpinupOutcome};
use crate::ses::{led, locate, LocateInfo, LocateOutcome};

/// Which drives a power operation targets.
#[derive(Debug, Clone)]
pub enum Selector {
    Devices(Vec<String>),
    Controller(String),
    All,
}

/// What the locate operation should do with the LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateMode {
    Timed(Duration),
    On,
    Off,
    /// Resolve only; do not touch the LED
    Info,
}

pub struct Engine {
    pub cache: Cache,
    pub config: Config,
    pub store: Option<Store>,
    pub interrupt: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: Config, store: Option<Store>, interrupt: Arc<AtomicBool>) -> Engine {
        Engine { cache: Cache::new(), config, store, interrupt }
    }

    /// Declared roster, or live discovery when the config declares none.
    pub fn roster(&self) -> Vec<(String, String)> {
        if !self.config.drives.declared.is_empty() {
            return self
                .config
                .drives
                .declared
                .iter()
                .map(|d| (d.device.clone(), d.name.clone()))
                .collect();
        }
        collectors::discover_drives(&self.cache, &self.config)
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        collectors::collect_system(&self.cache)
    }

    // ── Status / monitor ─────────────────────────────────────────────

    pub fn status(&mut self) -> (Vec<DriveRecord>, Summary) {
        let snap = self.snapshot();
        let devices: Vec<String> = self.roster().into_iter().map(|(d, _)| d).collect();
        let drives = fusion::fuse_all(&self.cache, &snap, &devices, self.store.as_ref());
        let summary = Summary::build(&drives);
        tracing::debug!(
            drives = drives.len(),
            attribute_reads = crate::collectors::smart::attribute_read_count(),
            "status snapshot fused"
        );
        (drives, summary)
    }

    /// Live monitor loop. Drive state refreshes every `interval`; the full
    /// fusion (temperatures, SMART) only every `temp_interval`. Runs until
    /// interrupted.
    pub fn monitor(&mut self, interval: u64, temp_interval: u64, controller: Option<&str>) {
        let interval = interval.max(1);
        let temp_every = (temp_interval / interval).max(1);
        let mut records: Vec<DriveRecord> = Vec::new();
        let mut tick: u64 = 0;

        while !self.interrupt.load(Ordering::Relaxed) {
            if tick % temp_every == 0 || records.is_empty() {
                let (drives, _) = self.status();
                records = drives;
            } else {
                // Light pass: state only, through the standby-safe gate
                let snap = self.snapshot();
                for r in &mut records {
                    let sysfs_state = snap
                        .sysfs_for(&r.device_path)
                        .and_then(|d| d.state.clone());
                    r.state = crate::gate::drive_state(
                        &self.cache,
                        sysfs_state.as_deref(),
                        &r.device_path,
                    );
                    if r.state != DriveState::Active {
                        r.clear_live_fields();
                    }
                }
            }

            let ctrl_temp =
                controller.and_then(|c| hba::controller_temperature(&self.cache, c));
            output::print_monitor_frame(&records, interval, temp_interval, controller, ctrl_temp);

            tick += 1;
            for _ in 0..interval {
                if self.interrupt.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(Duration::from_secs(1));
            }
        }
        println!();
    }

    // ── Identify / locate ────────────────────────────────────────────

    pub fn identify(&self, query: &str) -> Result<(DeviceEntity, IdentifierKind)> {
        let snap = self.snapshot();
        let index = DeviceIndex::build(&snap);
        let (entity, kind) = index.lookup(query)?;
        Ok((entity.clone(), kind))
    }

    pub fn locate(
        &self,
        query: &str,
        mode: LocateMode,
    ) -> Result<(LocateInfo, Option<LocateOutcome>)> {
        let snap = self.snapshot();
        let info = locate::resolve(&self.cache, &snap, self.store.as_ref(), query)?;

        let outcome = match mode {
            LocateMode::Info => None,
            LocateMode::On => {
                led::set_ident_led(&info.sg_device, info.slot, true)?;
                None
            }
            LocateMode::Off => {
                led::set_ident_led(&info.sg_device, info.slot, false)?;
                None
            }
            LocateMode::Timed(duration) => Some(led::locate_timed(
                &info.sg_device,
                info.slot,
                duration,
                &self.interrupt,
            )?),
        };
        Ok((info, outcome))
    }

    // ── Power ────────────────────────────────────────────────────────

    pub fn spindown(
        &mut self,
        selector: Selector,
        opts: SpindownOptions,
    ) -> Result<SpindownOutcome> {
        let snap = self.snapshot();
        let targets = self.resolve_targets(&snap, &selector, opts.force_all)?;
        eprintln!("Spinning down {} drive(s)...", targets.len());
        power::spindown(
            &self.cache,
            &mut self.store,
            &targets,
            opts,
            &self.interrupt,
            power::prompt_pool_export,
        )
    }

    pub fn spinup(&mut self, selector: Selector, opts: SpinupOptions) -> Result<SpinupOutcome> {
        let snap = self.snapshot();
        let targets = self.resolve_targets(&snap, &selector, false)?;
        eprintln!("Spinning up {} drive(s)...", targets.len());
        power::spinup(&self.cache, &mut self.store, &targets, opts, &self.interrupt)
    }

    /// Resolve a power-operation selector to fused drive records. A bare
    /// `All` requires the force_all override; an empty result is a
    /// precondition failure.
    fn resolve_targets(
        &self,
        snap: &SystemSnapshot,
        selector: &Selector,
        force_all: bool,
    ) -> Result<Vec<DriveRecord>> {
        let devices: Vec<String> = match selector {
            Selector::Devices(list) => list.clone(),
            Selector::Controller(ctrl) => {
                let serials = snap.hba.serials_on_controller(ctrl);
                if serials.is_empty() {
                    return Err(EngineError::Precondition(format!(
                        "no drives found for controller {}",
                        ctrl
                    )));
                }
                let roster: Vec<String> =
                    self.roster().into_iter().map(|(d, _)| d).collect();
                fusion::fuse_all(&self.cache, snap, &roster, self.store.as_ref())
                    .into_iter()
                    .filter(|r| {
                        r.serial
                            .as_deref()
                            .map(|s| serials.contains(&s.to_uppercase()))
                            .unwrap_or(false)
                            || r.serial_vpd
                                .as_deref()
                                .map(|s| serials.contains(&s.to_uppercase()))
                                .unwrap_or(false)
                    })
                    .map(|r| r.device_path)
                    .collect()
            }
            Selector::All => {
                if !force_all {
                    return Err(EngineError::Precondition(
                        "no devices or controller given (use --force-all to target every drive)"
                            .to_string(),
                    ));
                }
                self.roster().into_iter().map(|(d, _)| d).collect()
            }
        };

        if devices.is_empty() {
            return Err(EngineError::Precondition("no target drives".to_string()));
        }
        Ok(fusion::fuse_all(&self.cache, snap, &devices, self.store.as_ref()))
    }

    // ── Healthcheck / inventory ──────────────────────────────────────

    pub fn healthcheck(&mut self, update: bool) -> HealthResult {
        let started = std::time::Instant::now();
        let snap = self.snapshot();
        let devices: Vec<String> = self.roster().into_iter().map(|(d, _)| d).collect();
        let drives = fusion::fuse_all(&self.cache, &snap, &devices, self.store.as_ref());

        let hba_serials: Vec<String> =
            snap.hba.drives.values().map(|d| d.serial.to_uppercase()).collect();
        let known = self.store.as_ref().map(|s| s.known_serials());

        let mut result = health::evaluate(
            &drives,
            &snap.zfs.pools,
            devices.len(),
            &self.config.thresholds,
            known.as_ref(),
            &hba_serials,
        );
        result.scan_duration_ms = started.elapsed().as_millis() as u64;

        if let Some(store) = self.store.as_mut() {
            for alert in &result.alerts {
                store.append_alert(
                    alert.severity,
                    alert.category,
                    &alert.message,
                    alert.details["serial"].as_str().map(String::from),
                    alert.details["pool"].as_str().map(String::from),
                    alert.details.clone(),
                );
            }
            if update {
                sync_drives_into_store(store, &drives);
            }
        }
        result
    }

    /// Upsert every live drive into the inventory store. Returns how many
    /// rows were written.
    pub fn sync_inventory(&mut self) -> Result<usize> {
        let snap = self.snapshot();
        let devices: Vec<String> = self.roster().into_iter().map(|(d, _)| d).collect();
        let drives = fusion::fuse_all(&self.cache, &snap, &devices, None);

        let store = self
            .store
            .as_mut()
            .ok_or_else(|| EngineError::Precondition("inventory store disabled".to_string()))?;
        Ok(sync_drives_into_store(store, &drives))
    }
}

fn sync_drives_into_store(store: &mut Store, drives: &[DriveRecord]) -> usize {
    let mut written = 0;
    for d in drives {
        let Some(serial) = d.serial.clone() else { continue };
        store.upsert_drive(DriveRow {
            serial,
            serial_vpd: d.serial_vpd.clone(),
            model: d.model.clone(),
            vendor: d.vendor.clone(),
            firmware: d.firmware.clone(),
            size_bytes: d.size_bytes,
            protocol: d.protocol.map(|p| p.label().to_string()),
            media_type: None,
            controller_id: d.controller_id.clone(),
            enclosure_id: d.enclosure_id,
            slot: d.slot,
            sas_address: d.sas_address.clone(),
            device_path: Some(d.device_path.clone()),
            wwn: d.wwn.clone(),
            zpool: d.zpool.clone(),
            vdev_type: d.vdev_type.clone(),
            vdev_guid: d.vdev_guid.clone(),
            state: d.state,
            first_seen: chrono::Utc::now(),
            last_seen: chrono::Utc::now(),
        });
        written += 1;
    }
    written
}
