//! Health assessor: correlates the fused snapshot against the declared
//! roster and pool topology, and emits typed alerts. Overall status is the
//! worst severity seen.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::Thresholds;
use crate::models::drive::{DriveRecord, DriveState};
use crate::models::event::{AlertCategory, Severity};
use crate::models::pool::{PoolHealth, STATE_ONLINE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
        }
    }

    /// Exit code for one-shot health checks: 0 OK, 1 warning, 2 critical.
    pub fn exit_code(&self) -> i32 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
        }
    }

    fn worsen(&mut self, severity: Severity) {
        let to = match severity {
            Severity::Critical => HealthStatus::Critical,
            Severity::Warning => HealthStatus::Warning,
            Severity::Info => return,
        };
        if (to == HealthStatus::Critical) || (*self == HealthStatus::Healthy) {
            *self = to;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthAlert {
    pub severity: Severity,
    pub category: AlertCategory,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DriveHealthSummary {
    pub expected: usize,
    pub present: usize,
    pub active: usize,
    pub standby: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub temp_warn: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_state: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub faulted_vdevs: Vec<String>,
    pub error_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResult {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub drives: DriveHealthSummary,
    pub pools: Vec<PoolSummary>,
    pub alerts: Vec<HealthAlert>,
    pub scan_duration_ms: u64,
}

/// Evaluate all health rules. `known_serials` is the inventory roster when
/// a store is open; `hba_serials` is the live HBA view used for new-drive
/// detection.
pub fn evaluate(
    drives: &[DriveRecord],
    pools: &[PoolHealth],
    expected: usize,
    thresholds: &Thresholds,
    known_serials: Option<&HashSet<String>>,
    hba_serials: &[String],
) -> HealthResult {
    let mut result = HealthResult {
        timestamp: Utc::now(),
        status: HealthStatus::Healthy,
        drives: DriveHealthSummary { expected, ..Default::default() },
        pools: Vec::new(),
        alerts: Vec::new(),
        scan_duration_ms: 0,
    };

    for d in drives {
        match d.state {
            DriveState::Active => {
                result.drives.active += 1;
                result.drives.present += 1;

                if let Some(temp) = d.temperature_c {
                    if temp >= thresholds.temp_crit_c {
                        result.drives.temp_warn.push(d.device_path.clone());
                        push_alert(
                            &mut result,
                            Severity::Critical,
                            AlertCategory::Temperature,
                            format!(
                                "Drive {} temperature {}°C ≥ critical threshold {}°C",
                                d.device_path, temp, thresholds.temp_crit_c
                            ),
                            serde_json::json!({ "device": d.device_path, "temp": temp }),
                        );
                    } else if temp >= thresholds.temp_warn_c {
                        result.drives.temp_warn.push(d.device_path.clone());
                        push_alert(
                            &mut result,
                            Severity::Warning,
                            AlertCategory::Temperature,
                            format!(
                                "Drive {} temperature {}°C ≥ warning threshold {}°C",
                                d.device_path, temp, thresholds.temp_warn_c
                            ),
                            serde_json::json!({ "device": d.device_path, "temp": temp }),
                        );
                    }
                }
            }
            DriveState::Standby => {
                result.drives.standby += 1;
                result.drives.present += 1;
            }
            DriveState::Missing => {
                result.drives.missing.push(d.device_path.clone());
                let serial = d.serial.as_deref().unwrap_or("unknown");
                push_alert(
                    &mut result,
                    Severity::Critical,
                    AlertCategory::DriveMissing,
                    format!("Drive {} is missing (serial: {})", d.device_path, serial),
                    serde_json::json!({ "device": d.device_path, "serial": serial }),
                );
            }
            DriveState::Failed | DriveState::Unknown => {
                result.drives.failed.push(d.device_path.clone());
                let serial = d.serial.as_deref().unwrap_or("unknown");
                push_alert(
                    &mut result,
                    Severity::Critical,
                    AlertCategory::DriveFailed,
                    format!("Drive {} has failed (serial: {})", d.device_path, serial),
                    serde_json::json!({ "device": d.device_path, "serial": serial }),
                );
            }
        }
    }

    // Drives visible to the HBA but absent from inventory
    if let Some(known) = known_serials {
        for serial in hba_serials {
            if !known.contains(&serial.to_uppercase()) {
                result.drives.new.push(serial.clone());
                push_alert(
                    &mut result,
                    Severity::Info,
                    AlertCategory::DriveNew,
                    format!("New drive detected: {}", serial),
                    serde_json::json!({ "serial": serial }),
                );
            }
        }
    }

    for pool in pools {
        let faulted: Vec<String> =
            pool.faulted_devices().iter().map(|v| v.name.clone()).collect();
        result.pools.push(PoolSummary {
            name: pool.name.clone(),
            state: pool.state.clone(),
            scan_state: pool.scan_state.clone(),
            faulted_vdevs: faulted.clone(),
            error_count: pool.total_errors,
        });

        if pool.state != STATE_ONLINE {
            push_alert(
                &mut result,
                Severity::Critical,
                AlertCategory::PoolDegraded,
                format!("ZFS pool {} is {}", pool.name, pool.state),
                serde_json::json!({
                    "pool": pool.name, "state": pool.state, "faulted": faulted,
                }),
            );
        } else if pool.total_errors > 0 {
            push_alert(
                &mut result,
                Severity::Warning,
                AlertCategory::PoolErrors,
                format!("ZFS pool {} has {} errors", pool.name, pool.total_errors),
                serde_json::json!({ "pool": pool.name, "errors": pool.total_errors }),
            );
        }
    }

    // Worst first in output
    result.alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
    result
}

fn push_alert(
    result: &mut HealthResult,
    severity: Severity,
    category: AlertCategory,
    message: String,
    details: serde_json::Value,
) {
    result.status.worsen(severity);
    result.alerts.push(HealthAlert { severity, category, message, details });
}
