//! ZFS pool topology probe and pool operations. Topology comes from
//! `zpool status -vL` (resolved device paths) paired with `zpool status -g`
//! (vdev GUIDs); the config section is parsed by indentation, not regex.

use std::collections::HashMap;
use std::process::Command;

use crate::cache::{Cache, Tier};
use crate::error::EngineError;
use crate::models::drive::ZfsErrors;
use crate::models::pool::{PoolHealth, VdevHealth, VdevKind};

/// One leaf device's pool membership, fused into drive records and the
/// identifier index.
#[derive(Debug, Clone)]
pub struct VdevLink {
    pub pool: String,
    pub pool_state: String,
    /// Base device path, partition suffix stripped
    pub device_path: String,
    /// Path exactly as zpool printed it
    pub raw_path: String,
    /// mirror, raidz2, stripe, spare, log, cache
    pub vdev_type: String,
    pub vdev_guid: Option<String>,
    pub errors: ZfsErrors,
}

#[derive(Debug, Clone, Default)]
pub struct ZfsTopology {
    pub pools: Vec<PoolHealth>,
    /// Pool name -> pool GUID
    pub pool_guids: HashMap<String, String>,
    /// Dataset name -> dataset GUID
    pub datasets: Vec<(String, String)>,
    pub links: Vec<VdevLink>,
}

pub fn collect(cache: &Cache) -> ZfsTopology {
    cache.get_or_insert_with("zfs:topology", Tier::Medium, || {
        if !tool_present() {
            return ZfsTopology::default();
        }

        let status = run_zpool(&["status", "-vL"]).unwrap_or_default();
        let status_g = run_zpool(&["status", "-g"]).unwrap_or_default();
        let pools = parse_status(&status);
        let guid_pools = parse_status(&status_g);
        let pool_guids = parse_name_value(&run_zpool(&["get", "-H", "-o", "name,value", "guid"]).unwrap_or_default());
        let datasets = parse_datasets(&run_zfs_get_guid().unwrap_or_default());

        let links = vdev_links(&pools, &guid_pools);
        ZfsTopology { pools, pool_guids, datasets, links }
    })
}

pub fn tool_present() -> bool {
    which("zpool")
}

fn which(tool: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file())
        })
        .unwrap_or(false)
}

fn run_zpool(args: &[&str]) -> Option<String> {
    let out = Command::new("zpool").args(args).output().ok()?;
    Some(String::from_utf8_lossy(&out.stdout).to_string())
}

fn run_zfs_get_guid() -> Option<String> {
    let out = Command::new("zfs")
        .args(["get", "-H", "-t", "filesystem,volume", "-o", "name,value", "guid"])
        .output()
        .ok()?;
    Some(String::from_utf8_lossy(&out.stdout).to_string())
}

// ── Status parsing ───────────────────────────────────────────────────

/// Parse the full `zpool status` output into per-pool health trees.
pub fn parse_status(output: &str) -> Vec<PoolHealth> {
    let mut pools: Vec<PoolHealth> = Vec::new();
    let mut current: Option<PoolHealth> = None;
    let mut config_lines: Vec<String> = Vec::new();
    let mut in_config = false;

    let mut flush = |pool: &mut Option<PoolHealth>, lines: &mut Vec<String>, pools: &mut Vec<PoolHealth>| {
        if let Some(mut p) = pool.take() {
            parse_config_section(&mut p, lines);
            pools.push(p);
        }
        lines.clear();
    };

    for line in output.lines() {
        let trimmed = line.trim_start();

        if let Some(name) = trimmed.strip_prefix("pool:") {
            flush(&mut current, &mut config_lines, &mut pools);
            current = Some(PoolHealth::new(name.trim()));
            in_config = false;
            continue;
        }

        let Some(pool) = current.as_mut() else { continue };

        if let Some(v) = trimmed.strip_prefix("state:") {
            pool.state = v.trim().to_string();
        } else if let Some(v) = trimmed.strip_prefix("status:") {
            pool.status = Some(v.trim().to_string());
        } else if let Some(v) = trimmed.strip_prefix("action:") {
            pool.action = Some(v.trim().to_string());
        } else if let Some(v) = trimmed.strip_prefix("scan:") {
            pool.scan_message = Some(v.trim().to_string());
            parse_scan_state(pool);
        } else if let Some(v) = trimmed.strip_prefix("errors:") {
            pool.errors = Some(v.trim().to_string());
            in_config = false;
        } else if trimmed.starts_with("config:") {
            in_config = true;
        } else if in_config {
            if trimmed.is_empty() {
                continue;
            }
            // Skip the NAME STATE READ WRITE CKSUM header
            if trimmed.starts_with("NAME") && trimmed.contains("STATE") {
                continue;
            }
            config_lines.push(line.to_string());
        }
    }
    flush(&mut current, &mut config_lines, &mut pools);
    pools
}

fn parse_scan_state(pool: &mut PoolHealth) {
    let Some(msg) = pool.scan_message.as_deref() else { return };
    let percent = msg
        .split_whitespace()
        .find_map(|w| w.strip_suffix('%').and_then(|n| n.parse::<f64>().ok()));

    if msg.contains("scrub in progress") {
        pool.scan_state = Some("scrub".to_string());
        pool.scan_percent = percent;
    } else if msg.contains("resilver in progress") {
        pool.scan_state = Some("resilver".to_string());
        pool.scan_percent = percent;
    } else if msg.contains("scrub repaired")
        || msg.contains("scrub canceled")
        || msg.contains("resilvered")
    {
        pool.scan_state = Some("none".to_string());
    }
}

/// Config lines are tab-prefixed, nested two spaces per level:
///   \ttank        ONLINE  0 0 0
///   \t  raidz2-0  ONLINE  0 0 0
///   \t    sda     ONLINE  0 0 0
///   \tlogs
///   \t  sdc1      ONLINE  0 0 0
///
/// The pool-name row is dropped and its subtree becomes the pool's vdev
/// list; special groups (logs, cache, spares) share the root indent and
/// keep their own subtrees.
fn parse_config_section(pool: &mut PoolHealth, lines: &[String]) {
    let mut vdevs: Vec<VdevHealth> = Vec::new();
    // True while depth-1 rows are children of the (dropped) pool root
    let mut under_root = true;

    for line in lines {
        let body = line.strip_prefix('\t').unwrap_or(line);
        let indent = body.len() - body.trim_start().len();
        let depth = indent / 2;

        let fields: Vec<&str> = body.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }

        let name = fields[0].to_string();
        if depth == 0 && name == pool.name {
            under_root = true;
            continue;
        }

        let state = fields.get(1).map(|s| s.to_string()).unwrap_or_default();
        let read = fields.get(2).and_then(|f| f.parse().ok()).unwrap_or(0);
        let write = fields.get(3).and_then(|f| f.parse().ok()).unwrap_or(0);
        let cksum = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);

        let mut kind = VdevKind::from_name(&name);
        if under_root && depth == 1 && kind == VdevKind::Disk {
            kind = VdevKind::Stripe;
        }

        let device_path = match kind {
            VdevKind::Disk | VdevKind::Stripe => Some(device_path_for(&name)),
            _ => None,
        };

        pool.total_errors += read + write + cksum;
        let node = VdevHealth {
            name,
            kind,
            state,
            device_path,
            read_errors: read,
            write_errors: write,
            cksum_errors: cksum,
            slow_ios: 0,
            children: Vec::new(),
        };

        if depth == 0 {
            // logs / cache / spares group at root indent
            vdevs.push(node);
            under_root = false;
        } else if under_root {
            insert_at(&mut vdevs, node, depth - 1);
        } else {
            match vdevs.last_mut() {
                Some(group) => insert_at(&mut group.children, node, depth - 1),
                None => vdevs.push(node),
            }
        }
    }

    pool.vdevs = vdevs;
}

fn insert_at(level: &mut Vec<VdevHealth>, node: VdevHealth, depth: usize) {
    if depth == 0 || level.is_empty() {
        level.push(node);
        return;
    }
    let last = level.len() - 1;
    insert_at(&mut level[last].children, node, depth - 1);
}

fn device_path_for(name: &str) -> String {
    if name.starts_with("/dev/") {
        name.to_string()
    } else {
        format!("/dev/{}", name)
    }
}

/// Strip a partition suffix to get the base device: /dev/sda1 -> /dev/sda,
/// /dev/nvme0n1p2 -> /dev/nvme0n1.
pub fn normalize_device_path(path: &str) -> String {
    if path.starts_with("/dev/nvme") {
        if let Some(idx) = path.rfind('p') {
            if path[idx + 1..].chars().all(|c| c.is_ascii_digit())
                && !path[idx + 1..].is_empty()
            {
                return path[..idx].to_string();
            }
        }
        return path.to_string();
    }
    if path.starts_with("/dev/sd") || path.starts_with("/dev/hd") || path.starts_with("/dev/vd") {
        return path.trim_end_matches(|c: char| c.is_ascii_digit()).to_string();
    }
    path.to_string()
}

// ── GUID pairing ─────────────────────────────────────────────────────

fn parse_name_value(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|l| {
            let mut it = l.split_whitespace();
            Some((it.next()?.to_string(), it.next()?.to_string()))
        })
        .collect()
}

fn parse_datasets(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|l| {
            let mut it = l.split_whitespace();
            Some((it.next()?.to_string(), it.next()?.to_string()))
        })
        .collect()
}

fn structural_leaves(vdevs: &[VdevHealth]) -> Vec<&VdevHealth> {
    let mut out = Vec::new();
    fn walk<'a>(v: &'a VdevHealth, out: &mut Vec<&'a VdevHealth>) {
        if v.children.is_empty() {
            out.push(v);
        }
        for c in &v.children {
            walk(c, out);
        }
    }
    for v in vdevs {
        walk(v, &mut out);
    }
    out
}

/// The -L tree shows device paths, the -g tree shows GUIDs in the same
/// positions. Pair the two leaf sequences per pool to get GUID links.
pub fn vdev_links(path_pools: &[PoolHealth], guid_pools: &[PoolHealth]) -> Vec<VdevLink> {
    let mut links = Vec::new();

    for pool in path_pools {
        let guid_tree = guid_pools.iter().find(|p| p.name == pool.name);
        let path_leaves = structural_leaves(&pool.vdevs);
        let guid_leaves: Vec<&VdevHealth> =
            guid_tree.map(|p| structural_leaves(&p.vdevs)).unwrap_or_default();

        for (i, leaf) in path_leaves.iter().enumerate() {
            let Some(raw_path) = leaf.device_path.clone() else { continue };
            let vdev_guid = guid_leaves
                .get(i)
                .filter(|g| g.name.chars().all(|c| c.is_ascii_digit()))
                .map(|g| g.name.clone());

            links.push(VdevLink {
                pool: pool.name.clone(),
                pool_state: pool.state.clone(),
                device_path: normalize_device_path(&raw_path),
                raw_path,
                vdev_type: vdev_type_of(pool, leaf),
                vdev_guid,
                errors: ZfsErrors {
                    read: leaf.read_errors,
                    write: leaf.write_errors,
                    cksum: leaf.cksum_errors,
                },
            });
        }
    }
    links
}

/// Type label for a leaf: the parent group's name with the "-N" index
/// stripped, or "stripe" for a leaf directly under the pool root.
fn vdev_type_of(pool: &PoolHealth, leaf: &VdevHealth) -> String {
    fn find_parent<'a>(vdevs: &'a [VdevHealth], leaf: &VdevHealth) -> Option<&'a VdevHealth> {
        for v in vdevs {
            if v.children.iter().any(|c| std::ptr::eq(c, leaf)) {
                return Some(v);
            }
            if let Some(p) = find_parent(&v.children, leaf) {
                return Some(p);
            }
        }
        None
    }

    match find_parent(&pool.vdevs, leaf) {
        Some(parent) => {
            let base = parent.name.split('-').next().unwrap_or(&parent.name);
            match base {
                "logs" => "log".to_string(),
                "spares" => "spare".to_string(),
                _ => base.to_string(),
            }
        }
        None => "stripe".to_string(),
    }
}

// ── Pool operations ──────────────────────────────────────────────────

/// Quiesce and export a pool: filesystem sync, pool sync, then export.
/// Any failure is fatal to the calling operation.
pub fn export_pool(pool: &str) -> Result<(), EngineError> {
    run_checked(&mut Command::new("sync"), "sync", pool)?;
    run_checked(Command::new("zpool").args(["sync", pool]), "zpool sync", pool)?;
    run_checked(Command::new("zpool").args(["export", pool]), "zpool export", pool)?;
    Ok(())
}

pub fn import_pool(pool: &str) -> Result<(), EngineError> {
    let out = Command::new("zpool")
        .args(["import", pool])
        .output()
        .map_err(|e| EngineError::PoolImport { pool: pool.to_string(), detail: e.to_string() })?;
    if !out.status.success() {
        return Err(EngineError::PoolImport {
            pool: pool.to_string(),
            detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(())
}

pub fn list_pool_names() -> Vec<String> {
    let Some(out) = run_zpool(&["list", "-H", "-o", "name"]) else { return Vec::new() };
    out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
}

pub fn is_imported(pool: &str) -> bool {
    list_pool_names().iter().any(|p| p == pool)
}

fn run_checked(cmd: &mut Command, what: &str, pool: &str) -> Result<(), EngineError> {
    let out = cmd
        .output()
        .map_err(|e| EngineError::PoolExport { pool: pool.to_string(), detail: format!("{}: {}", what, e) })?;
    if !out.status.success() {
        return Err(EngineError::PoolExport {
            pool: pool.to_string(),
            detail: format!("{}: {}", what, String::from_utf8_lossy(&out.stderr).trim()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STATUS_L: &str = "  pool: tank
 state: ONLINE
  scan: scrub repaired 0B in 10:44:31 with 0 errors on Sun Jul 12 11:08:32 2026
config:

\tNAME        STATE     READ WRITE CKSUM
\ttank        ONLINE       0     0     0
\t  raidz2-0  ONLINE       0     0     0
\t    sda1    ONLINE       0     0     0
\t    sdb1    ONLINE       0     0     2
\tlogs
\t  sdc1      ONLINE       0     0     0

errors: No known data errors
  pool: scratch
 state: DEGRADED
status: One or more devices could not be used.
action: Replace the faulted device.
  scan: resilver in progress, 42.5% done
config:

\tNAME        STATE     READ WRITE CKSUM
\tscratch     DEGRADED     0     0     0
\t  sdd       FAULTED      3     1     0
\t  sde       ONLINE       0     0     0

errors: No known data errors
";

    const STATUS_G: &str = "  pool: tank
 state: ONLINE
config:

\tNAME                      STATE     READ WRITE CKSUM
\ttank                      ONLINE       0     0     0
\t  4837465298374652983     ONLINE       0     0     0
\t    9413058431145097813   ONLINE       0     0     0
\t    1268413504051701733   ONLINE       0     0     2
\tlogs
\t  7777777777777777777     ONLINE       0     0     0

errors: No known data errors
  pool: scratch
 state: DEGRADED
config:

\tNAME                      STATE     READ WRITE CKSUM
\tscratch                   DEGRADED     0     0     0
\t  1111111111111111111     FAULTED      3     1     0
\t  2222222222222222222     ONLINE       0     0     0

errors: No known data errors
";

    #[test]
    fn parses_pools_and_vdev_tree() {
        let pools = parse_status(STATUS_L);
        assert_eq!(pools.len(), 2);

        let tank = &pools[0];
        assert_eq!(tank.name, "tank");
        assert_eq!(tank.state, "ONLINE");
        assert_eq!(tank.scan_state.as_deref(), Some("none"));
        assert_eq!(tank.total_errors, 2);
        assert_eq!(tank.vdevs.len(), 2); // raidz2-0 + logs
        assert_eq!(tank.vdevs[0].kind, VdevKind::Raidz);
        assert_eq!(tank.vdevs[0].children.len(), 2);
        assert_eq!(tank.vdevs[0].children[1].cksum_errors, 2);

        let scratch = &pools[1];
        assert_eq!(scratch.state, "DEGRADED");
        assert_eq!(scratch.scan_state.as_deref(), Some("resilver"));
        assert_eq!(scratch.scan_percent, Some(42.5));
        assert_eq!(scratch.total_errors, 4);
        // Stripe leaves directly under the pool root
        assert_eq!(scratch.vdevs[0].kind, VdevKind::Stripe);
        let faulted: Vec<&str> =
            scratch.faulted_devices().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(faulted, vec!["sdd"]);
    }

    #[test]
    fn pairs_guids_with_paths_positionally() {
        let paths = parse_status(STATUS_L);
        let guids = parse_status(STATUS_G);
        let links = vdev_links(&paths, &guids);

        assert_eq!(links.len(), 5);
        let sda = links.iter().find(|l| l.raw_path == "/dev/sda1").unwrap();
        assert_eq!(sda.pool, "tank");
        assert_eq!(sda.device_path, "/dev/sda");
        assert_eq!(sda.vdev_type, "raidz2");
        assert_eq!(sda.vdev_guid.as_deref(), Some("9413058431145097813"));

        let sdb = links.iter().find(|l| l.raw_path == "/dev/sdb1").unwrap();
        assert_eq!(sdb.errors.cksum, 2);

        let log = links.iter().find(|l| l.raw_path == "/dev/sdc1").unwrap();
        assert_eq!(log.vdev_type, "log");

        let sdd = links.iter().find(|l| l.device_path == "/dev/sdd").unwrap();
        assert_eq!(sdd.vdev_type, "stripe");
        assert_eq!(sdd.errors.read, 3);
        assert_eq!(sdd.vdev_guid.as_deref(), Some("1111111111111111111"));
    }

    #[test]
    fn normalizes_partition_suffixes() {
        assert_eq!(normalize_device_path("/dev/sda1"), "/dev/sda");
        assert_eq!(normalize_device_path("/dev/sda"), "/dev/sda");
        assert_eq!(normalize_device_path("/dev/nvme0n1p2"), "/dev/nvme0n1");
        assert_eq!(normalize_device_path("/dev/nvme0n1"), "/dev/nvme0n1");
        assert_eq!(normalize_device_path("/dev/mapper/crypt0"), "/dev/mapper/crypt0");
    }

    #[test]
    fn empty_output_parses_to_nothing() {
        assert!(parse_status("").is_empty());
        assert!(parse_status("no pools available\n").is_empty());
    }
}
