//! Human-readable rendering of engine results: status tables, summaries,
//! health reports, locate details. Machine output is plain serde_json on
//! the same types, handled in main.

use crate::health::HealthResult;
use crate::identify::{DeviceEntity, IdentifierKind};
use crate::models::drive::{DriveRecord, Summary};
use crate::ses::LocateInfo;

pub fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn dash(opt: Option<&str>) -> &str {
    opt.unwrap_or("-")
}

pub fn print_status_table(drives: &[DriveRecord], detail: bool) {
    if detail {
        println!(
            "{:<12} {:<8} {:<9} {:<6} {:<12} {:<20} {:<16} {:<10}",
            "DEVICE", "SLOT", "STATE", "TEMP", "ZPOOL", "MODEL", "SERIAL", "SIZE"
        );
        println!("{}", "-".repeat(98));
    } else {
        println!(
            "{:<12} {:<8} {:<9} {:<6} {:<12}",
            "DEVICE", "SLOT", "STATE", "TEMP", "ZPOOL"
        );
        println!("{}", "-".repeat(52));
    }

    for d in drives {
        let slot = d.bay().unwrap_or_else(|| "-".to_string());
        let temp = d
            .temperature_c
            .map(|t| format!("{}°C", t))
            .unwrap_or_else(|| "-".to_string());
        let zpool = dash(d.zpool.as_deref());

        if detail {
            let size = d
                .size_bytes
                .map(fmt_bytes)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<12} {:<8} {:<9} {:<6} {:<12} {:<20} {:<16} {:<10}",
                d.device_path,
                slot,
                d.state.label(),
                temp,
                zpool,
                truncate(dash(d.model.as_deref()), 18),
                truncate(dash(d.serial.as_deref()), 14),
                size,
            );
        } else {
            println!(
                "{:<12} {:<8} {:<9} {:<6} {:<12}",
                d.device_path,
                slot,
                d.state.label(),
                temp,
                zpool
            );
        }
    }
}

pub fn print_summary(summary: &Summary) {
    let mut parts = vec![
        format!("Active: {}", summary.active),
        format!("Standby: {}", summary.standby),
    ];
    if summary.missing > 0 {
        parts.push(format!("Missing: {}", summary.missing));
    }
    if summary.failed > 0 {
        parts.push(format!("Failed: {}", summary.failed));
    }
    println!("{}", parts.join(" | "));

    if let (Some(min), Some(max), Some(avg)) =
        (summary.temp_min, summary.temp_max, summary.temp_avg)
    {
        println!("Temps: Min {}°C | Max {}°C | Avg {}°C", min, max, avg);
    }
}

pub fn print_monitor_frame(
    drives: &[DriveRecord],
    interval: u64,
    temp_interval: u64,
    controller: Option<&str>,
    controller_temp: Option<i32>,
) {
    // Clear and home; a refreshing table, not a scrolling log
    print!("\x1b[H\x1b[2J");
    println!("=== JBOD Drive Monitor === (Ctrl+C to exit)");
    println!(
        "Refreshing every {}s (temps every {}s) | {}",
        interval,
        temp_interval,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    print_status_table(drives, false);
    println!();
    print_summary(&Summary::build(drives));

    if let Some(ctrl) = controller {
        match controller_temp {
            Some(t) => println!("Controller {}: {}°C", ctrl, t),
            None => println!("Controller {}: -", ctrl),
        }
    }
}

pub fn print_health(result: &HealthResult) {
    println!();
    println!("Health Check: {}", result.status.label());
    println!(
        "  Timestamp: {} (took {}ms)",
        result.timestamp.format("%Y-%m-%d %H:%M:%S"),
        result.scan_duration_ms
    );
    println!();

    println!("Drives:");
    println!(
        "  Expected: {} | Present: {} | Active: {} | Standby: {}",
        result.drives.expected, result.drives.present, result.drives.active, result.drives.standby
    );
    if !result.drives.missing.is_empty() {
        println!("  Missing: {}", result.drives.missing.join(", "));
    }
    if !result.drives.failed.is_empty() {
        println!("  Failed: {}", result.drives.failed.join(", "));
    }
    if !result.drives.temp_warn.is_empty() {
        println!("  Temperature warnings: {}", result.drives.temp_warn.join(", "));
    }
    if !result.drives.new.is_empty() {
        println!("  New drives: {}", result.drives.new.join(", "));
    }
    println!();

    if !result.pools.is_empty() {
        println!("ZFS Pools:");
        for pool in &result.pools {
            print!("  {}: {}", pool.name, pool.state);
            if pool.error_count > 0 {
                print!(" ({} errors)", pool.error_count);
            }
            if let Some(scan) = pool.scan_state.as_deref() {
                if scan != "none" {
                    print!(" [{}]", scan);
                }
            }
            println!();
            if !pool.faulted_vdevs.is_empty() {
                println!("    Faulted: {}", pool.faulted_vdevs.join(", "));
            }
        }
        println!();
    }

    if !result.alerts.is_empty() {
        println!("Alerts:");
        for alert in &result.alerts {
            println!(
                "  [{}] {} {}",
                alert.severity.label(),
                alert.category.label(),
                alert.message
            );
        }
    }
}

pub fn print_locate(info: &LocateInfo) {
    println!("Query:      {} (matched as {})", info.query, info.matched_kind);
    if let Some(dev) = &info.device_path {
        println!("Device:     {}", dev);
    }
    if let Some(serial) = &info.serial {
        println!("Serial:     {}", serial);
    }
    if let Some(model) = &info.model {
        println!("Model:      {}", model);
    }
    println!("Bay:        enclosure {} slot {}", info.enclosure_id, info.slot);
    println!("SES device: {}", info.sg_device);
    if info.hba_sas_address.is_some() || info.ses_sas_address.is_some() {
        println!(
            "SAS addr:   hba={} ses={}",
            dash(info.hba_sas_address.as_deref()),
            dash(info.ses_sas_address.as_deref())
        );
    }
}

pub fn print_entity(entity: &DeviceEntity, kind: IdentifierKind) {
    println!("Matched as: {}", kind);

    let mut row = |label: &str, value: Option<&str>| {
        if let Some(v) = value {
            println!("  {:<18} {}", label, v);
        }
    };

    row("device_path", entity.device_path.as_deref());
    row("kernel_name", entity.kernel_name.as_deref());
    row("serial", entity.serial.as_deref());
    row("serial_vpd", entity.serial_vpd.as_deref());
    row("wwn", entity.wwn.as_deref());
    row("luid", entity.luid.as_deref());
    row("model", entity.model.as_deref());
    row("vendor", entity.vendor.as_deref());
    row("scsi_hctl", entity.scsi_hctl.as_deref());
    row("maj_min", entity.maj_min.as_deref());
    row("transport", entity.transport.as_deref());
    row("fs_type", entity.fs_type.as_deref());
    row("fs_uuid", entity.fs_uuid.as_deref());
    row("fs_label", entity.fs_label.as_deref());
    row("part_uuid", entity.part_uuid.as_deref());
    row("part_label", entity.part_label.as_deref());
    row("zfs_pool", entity.zfs_pool_name.as_deref());
    row("zfs_pool_guid", entity.zfs_pool_guid.as_deref());
    row("zfs_dataset", entity.zfs_dataset_name.as_deref());
    row("zfs_dataset_guid", entity.zfs_dataset_guid.as_deref());
    row("zfs_vdev_guid", entity.zfs_vdev_guid.as_deref());
    row("lvm_pv_uuid", entity.lvm_pv_uuid.as_deref());
    row("lvm_vg", entity.lvm_vg_name.as_deref());
    row("lvm_lv", entity.lvm_lv_name.as_deref());
    row("md_name", entity.md_name.as_deref());
    row("md_array_uuid", entity.md_array_uuid.as_deref());
    row("dm_name", entity.dm_name.as_deref());
    row("dm_uuid", entity.dm_uuid.as_deref());

    for link in &entity.by_id {
        println!("  {:<18} {}", "by_id", link);
    }
    for link in &entity.by_path {
        println!("  {:<18} {}", "by_path", link);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}..", &s[..max.saturating_sub(2)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bytes_formatting() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(8_001_563_222_016), "7.3 TiB");
    }

    #[test]
    fn truncate_marks_overflow() {
        assert_eq!(truncate("ST8000NM0075", 18), "ST8000NM0075");
        assert_eq!(truncate("A_VERY_LONG_MODEL_NUMBER", 10), "A_VERY_L..");
    }
}
