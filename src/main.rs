mod cache;
mod collectors;
mod config;
mod engine;
mod error;
mod fusion;
mod gate;
mod health;
mod identify;
mod inventory;
mod models;
mod output;
mod power;
mod ses;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::Config;
use engine::{Engine, LocateMode, Selector};
use error::EngineError;
use inventory::Store;
use power::{SpindownOptions, SpinupOptions};

#[derive(Parser, Debug)]
#[command(
    name = "jbodctl",
    about = "JBOD storage enclosure management: drive identification, standby-safe monitoring, ZFS-aware power control, locate LEDs",
    version
)]
struct Cli {
    /// Config file path (default: XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Inventory store directory (default: XDG data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Run without the inventory store
    #[arg(long, global = true)]
    no_db: bool,

    /// Verbose diagnostics (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show every drive's state, temperature and pool membership
    Status {
        /// Add model, serial and size columns
        #[arg(long)]
        detail: bool,
        #[arg(long)]
        json: bool,
    },

    /// Live-updating drive monitor
    Monitor {
        /// State refresh interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,
        /// Temperature refresh interval in seconds
        #[arg(long)]
        temp_interval: Option<u64>,
        /// Also show this controller's die temperature (e.g. c0)
        #[arg(short = 'c', long)]
        controller: Option<String>,
    },

    /// Spin down drives, exporting their ZFS pools first
    Spindown {
        /// Target device paths (e.g. /dev/sda)
        devices: Vec<String>,
        /// Target every drive on this controller (e.g. c0)
        #[arg(short = 'c', long)]
        controller: Option<String>,
        /// Skip ZFS pool handling entirely
        #[arg(long)]
        force: bool,
        /// Export all member pools without prompting; with no selector,
        /// target every drive
        #[arg(long)]
        force_all: bool,
        #[arg(long)]
        json: bool,
    },

    /// Spin up drives and re-import pools exported at spindown
    Spinup {
        devices: Vec<String>,
        #[arg(short = 'c', long)]
        controller: Option<String>,
        /// Skip automatic pool re-import
        #[arg(long)]
        no_import: bool,
        #[arg(long)]
        json: bool,
    },

    /// Light a drive bay's identify LED
    Locate {
        /// Any identifier: device path, serial, WWN, pool name, vdev GUID,
        /// "enclosure:slot", ...
        query: String,
        /// Turn the LED on and leave it on
        #[arg(long, conflicts_with_all = ["off", "info"])]
        on: bool,
        /// Turn the LED off
        #[arg(long, conflicts_with = "info")]
        off: bool,
        /// Resolve the bay without touching the LED
        #[arg(long)]
        info: bool,
        /// Seconds to keep the LED lit (timed mode)
        #[arg(short = 'd', long, default_value_t = 30)]
        duration: u64,
        #[arg(long)]
        json: bool,
    },

    /// Resolve an identifier to its device and show everything known
    Identify {
        query: String,
        #[arg(long)]
        json: bool,
    },

    /// Check drives and pools against expectations, emitting alerts
    Healthcheck {
        #[arg(long)]
        json: bool,
        /// Also sync the current state into the inventory store
        #[arg(long)]
        update: bool,
        /// Temperature warning threshold in °C
        #[arg(long)]
        temp_warn: Option<i32>,
        /// Temperature critical threshold in °C
        #[arg(long)]
        temp_crit: Option<i32>,
    },

    /// Inventory store maintenance
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },

    /// List or acknowledge persisted alerts
    Alerts {
        #[command(subcommand)]
        action: AlertsAction,
    },
}

#[derive(Subcommand, Debug)]
enum InventoryAction {
    /// Upsert the live drive roster into the store
    Sync,
    /// List all inventoried drives
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show recent drive events
    Events {
        #[arg(long, default_value_t = 50)]
        last: usize,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AlertsAction {
    /// List alerts (unacknowledged by default)
    List {
        /// Include acknowledged alerts
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Acknowledge one alert by id
    Ack { id: u64 },
    /// Acknowledge every open alert
    AckAll,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        let _ = ctrlc::set_handler(move || {
            interrupt.store(true, Ordering::Relaxed);
        });
    }

    let mut config = Config::load(cli.config.as_deref());
    if let Some(dir) = cli.db.clone() {
        config.inventory.dir = Some(dir);
    }

    let store = if cli.no_db {
        None
    } else {
        let dir = config.inventory.dir.clone().or_else(Store::default_dir);
        match dir {
            Some(dir) => match Store::open(&dir) {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!(error = %e, "inventory store unavailable, continuing without");
                    None
                }
            },
            None => None,
        }
    };

    let mut engine = Engine::new(config, store, interrupt);

    match run(&mut engine, cli.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {}", err);
            let code = err.downcast_ref::<EngineError>().map(|e| e.exit_code()).unwrap_or(1);
            std::process::exit(code);
        }
    }
}

fn run(engine: &mut Engine, command: Commands) -> Result<i32> {
    match command {
        Commands::Status { detail, json } => {
            let (drives, summary) = engine.status();
            if json {
                let out = if detail {
                    let hba = collectors::hba::collect(&engine.cache);
                    serde_json::json!({
                        "drives": drives,
                        "summary": summary,
                        "controllers": hba.controllers,
                        "enclosures": hba.enclosures,
                    })
                } else {
                    serde_json::json!({ "drives": drives, "summary": summary })
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                output::print_status_table(&drives, detail);
                println!();
                output::print_summary(&summary);
            }
            Ok(0)
        }

        Commands::Monitor { interval, temp_interval, controller } => {
            let interval = interval.unwrap_or(engine.config.general.monitor_interval_sec);
            let temp_interval =
                temp_interval.unwrap_or(engine.config.general.temp_interval_sec);
            engine.monitor(interval, temp_interval, controller.as_deref());
            Ok(0)
        }

        Commands::Spindown { devices, controller, force, force_all, json } => {
            let selector = selector_from(devices, controller);
            let opts = SpindownOptions { force, force_all };
            let outcome = engine.spindown(selector, opts)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                if !outcome.exported_pools.is_empty() {
                    println!("Exported pools: {}", outcome.exported_pools.join(", "));
                    println!("Use 'jbodctl spinup' to re-import them automatically");
                }
                if !outcome.skipped_pools.is_empty() {
                    println!("Skipped pools (not exported): {}", outcome.skipped_pools.join(", "));
                }
                println!("{}/{} drives in standby", outcome.standby, outcome.targets);
            }
            Ok(0)
        }

        Commands::Spinup { devices, controller, no_import, json } => {
            let selector = selector_from(devices, controller);
            let outcome = engine.spinup(selector, SpinupOptions { no_import })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}/{} drives active", outcome.active, outcome.targets);
                for (pool, result) in &outcome.imported_pools {
                    println!("Pool {}: import {:?}", pool, result);
                }
            }
            Ok(0)
        }

        Commands::Locate { query, on, off, info, duration, json } => {
            let mode = if info {
                LocateMode::Info
            } else if on {
                LocateMode::On
            } else if off {
                LocateMode::Off
            } else {
                LocateMode::Timed(Duration::from_secs(duration))
            };

            let (locate_info, outcome) = engine.locate(&query, mode)?;
            if json {
                let out = serde_json::json!({ "locate": locate_info, "led": outcome });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                output::print_locate(&locate_info);
                match (mode, outcome) {
                    (LocateMode::On, _) => println!("Identify LED on"),
                    (LocateMode::Off, _) => println!("Identify LED off"),
                    (LocateMode::Timed(_), Some(o)) => {
                        println!("Identify LED cleared ({:?})", o)
                    }
                    _ => {}
                }
            }
            Ok(0)
        }

        Commands::Identify { query, json } => {
            let (entity, kind) = engine.identify(&query)?;
            if json {
                let out = serde_json::json!({
                    "query": query, "matched_as": kind, "device": entity,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                output::print_entity(&entity, kind);
            }
            Ok(0)
        }

        Commands::Healthcheck { json, update, temp_warn, temp_crit } => {
            if let Some(warn) = temp_warn {
                engine.config.thresholds.temp_warn_c = warn;
            }
            if let Some(crit) = temp_crit {
                engine.config.thresholds.temp_crit_c = crit;
            }
            let result = engine.healthcheck(update);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                output::print_health(&result);
            }
            Ok(result.status.exit_code())
        }

        Commands::Inventory { action } => run_inventory(engine, action),
        Commands::Alerts { action } => run_alerts(engine, action),
    }
}

fn run_inventory(engine: &mut Engine, action: InventoryAction) -> Result<i32> {
    match action {
        InventoryAction::Sync => {
            let written = engine.sync_inventory()?;
            println!("Synced {} drive(s) into inventory", written);
            Ok(0)
        }
        InventoryAction::List { json } => {
            let store = require_store(engine)?;
            let drives = store.all_drives();
            if json {
                println!("{}", serde_json::to_string_pretty(&drives)?);
            } else {
                println!(
                    "{:<16} {:<8} {:<9} {:<20} {:<12}",
                    "SERIAL", "SLOT", "STATE", "MODEL", "LAST SEEN"
                );
                println!("{}", "-".repeat(70));
                for d in drives {
                    let slot = match (d.enclosure_id, d.slot) {
                        (Some(e), Some(s)) => format!("{}:{}", e, s),
                        _ => "-".to_string(),
                    };
                    println!(
                        "{:<16} {:<8} {:<9} {:<20} {:<12}",
                        d.serial,
                        slot,
                        d.state.label(),
                        d.model.as_deref().unwrap_or("-"),
                        d.last_seen.format("%Y-%m-%d"),
                    );
                }
            }
            Ok(0)
        }
        InventoryAction::Events { last, json } => {
            let store = require_store(engine)?;
            let events = store.recent_events(last);
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for e in events {
                    println!(
                        "{} {:<12} {:<14} {}",
                        e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        e.kind.label(),
                        e.serial,
                        e.device_path.as_deref().unwrap_or(""),
                    );
                }
            }
            Ok(0)
        }
    }
}

fn run_alerts(engine: &mut Engine, action: AlertsAction) -> Result<i32> {
    match action {
        AlertsAction::List { all, json } => {
            let store = require_store(engine)?;
            let alerts = store.alerts(!all);
            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else {
                for a in alerts {
                    let ack = if a.acknowledged { " (acked)" } else { "" };
                    println!(
                        "{:>4} {} [{}] {}{}",
                        a.id,
                        a.timestamp.format("%Y-%m-%d %H:%M"),
                        a.severity.label(),
                        a.message,
                        ack,
                    );
                }
            }
            Ok(0)
        }
        AlertsAction::Ack { id } => {
            let store = engine
                .store
                .as_mut()
                .ok_or_else(|| EngineError::Precondition("inventory store disabled".into()))?;
            if store.acknowledge_alert(id) {
                println!("Alert {} acknowledged", id);
                Ok(0)
            } else {
                Err(EngineError::NotFound(format!("alert {}", id)).into())
            }
        }
        AlertsAction::AckAll => {
            let store = engine
                .store
                .as_mut()
                .ok_or_else(|| EngineError::Precondition("inventory store disabled".into()))?;
            let n = store.acknowledge_all();
            println!("Acknowledged {} alert(s)", n);
            Ok(0)
        }
    }
}

fn require_store(engine: &Engine) -> Result<&Store> {
    engine
        .store
        .as_ref()
        .ok_or_else(|| EngineError::Precondition("inventory store disabled".into()).into())
}

fn selector_from(devices: Vec<String>, controller: Option<String>) -> Selector {
    if !devices.is_empty() {
        Selector::Devices(devices)
    } else if let Some(ctrl) = controller {
        Selector::Controller(ctrl)
    } else {
        Selector::All
    }
}

fn init_tracing(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("jbodctl={}", default)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
