//! Drive-state gate. Decides active / standby / missing / failed without
//! waking a standby drive:
//!
//! 1. sysfs `state` settles offline/blocked (failed) and an absent device
//!    node settles missing;
//! 2. a `running` drive is indeterminate between active and standby, so the
//!    standby-safe SMART probe breaks the tie.
//!
//! Every fusion step that could issue a SMART attribute read consults this
//! gate first.

use std::path::Path;

use crate::cache::Cache;
use crate::collectors::smart;
use crate::models::drive::DriveState;

/// What sysfs alone can settle. `None` means active-vs-standby is still
/// open and the state probe must decide.
pub fn classify_sysfs(sysfs_state: Option<&str>, node_exists: bool) -> Option<DriveState> {
    if !node_exists {
        return Some(DriveState::Missing);
    }
    match sysfs_state {
        Some("offline") | Some("blocked") => Some(DriveState::Failed),
        // running, or sysfs data missing entirely
        _ => None,
    }
}

/// Gate a device through sysfs plus, only when needed, the standby-safe
/// SMART probe.
pub fn drive_state(cache: &Cache, sysfs_state: Option<&str>, device_path: &str) -> DriveState {
    let node_exists = Path::new(device_path).exists();
    if let Some(settled) = classify_sysfs(sysfs_state, node_exists) {
        return settled;
    }
    smart::probe_state(cache, device_path)
}

/// True when the gate's verdict permits a SMART attribute read.
pub fn allows_attribute_read(state: DriveState) -> bool {
    state == DriveState::Active
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn absent_node_is_missing_regardless_of_sysfs() {
        assert_eq!(classify_sysfs(Some("running"), false), Some(DriveState::Missing));
        assert_eq!(classify_sysfs(None, false), Some(DriveState::Missing));
    }

    #[test]
    fn offline_and_blocked_are_failed() {
        assert_eq!(classify_sysfs(Some("offline"), true), Some(DriveState::Failed));
        assert_eq!(classify_sysfs(Some("blocked"), true), Some(DriveState::Failed));
    }

    #[test]
    fn running_is_indeterminate() {
        // sysfs cannot tell active from standby for a running drive
        assert_eq!(classify_sysfs(Some("running"), true), None);
        assert_eq!(classify_sysfs(None, true), None);
    }

    #[test]
    fn only_active_unlocks_attribute_reads() {
        assert!(allows_attribute_read(DriveState::Active));
        assert!(!allows_attribute_read(DriveState::Standby));
        assert!(!allows_attribute_read(DriveState::Missing));
        assert!(!allows_attribute_read(DriveState::Failed));
        assert!(!allows_attribute_read(DriveState::Unknown));
    }
}
