use serde::{Deserialize, Serialize};

/// Kind of a persisted drive lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Discovered,
    Online,
    Offline,
    Missing,
    Failed,
    Replaced,
    Moved,
    StateChange,
    PoolExport,
    PoolImport,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Discovered => "discovered",
            EventKind::Online => "online",
            EventKind::Offline => "offline",
            EventKind::Missing => "missing",
            EventKind::Failed => "failed",
            EventKind::Replaced => "replaced",
            EventKind::Moved => "moved",
            EventKind::StateChange => "state_change",
            EventKind::PoolExport => "pool_export",
            EventKind::PoolImport => "pool_import",
        }
    }
}

/// Alert severity, ordered so that `max` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Critical => "CRIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    DriveMissing,
    DriveFailed,
    DriveNew,
    PoolDegraded,
    PoolErrors,
    Temperature,
}

impl AlertCategory {
    pub fn label(&self) -> &'static str {
        match self {
            AlertCategory::DriveMissing => "drive_missing",
            AlertCategory::DriveFailed => "drive_failed",
            AlertCategory::DriveNew => "drive_new",
            AlertCategory::PoolDegraded => "pool_degraded",
            AlertCategory::PoolErrors => "pool_errors",
            AlertCategory::Temperature => "temperature",
        }
    }
}

/// Outcome of a pool re-import after spindown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportOutcome {
    Pending,
    Success,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_worst_last() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(Severity::Info.max(Severity::Critical), Severity::Critical);
    }
}
