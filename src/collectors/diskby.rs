//! Walker for the /dev/disk/by-* symlink farms. Builds bidirectional maps
//! between stable names and the canonical device path.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::cache::{Cache, Tier};

#[derive(Debug, Clone, Default)]
pub struct DiskByLinks {
    /// Device path -> by-id link paths (whole-disk links only)
    pub by_id: HashMap<String, Vec<String>>,
    /// Device path -> by-path link paths
    pub by_path: HashMap<String, Vec<String>>,
    /// Filesystem UUID -> device path
    pub by_uuid: HashMap<String, String>,
    /// Partition UUID -> device path
    pub by_partuuid: HashMap<String, String>,
    /// Filesystem label -> device path
    pub by_label: HashMap<String, String>,
    /// Partition label -> device path
    pub by_partlabel: HashMap<String, String>,
    /// Any symlink path -> device path
    pub symlink_to_device: HashMap<String, String>,
}

pub fn collect(cache: &Cache) -> DiskByLinks {
    cache.get_or_insert_with("diskby:links", Tier::Slow, || {
        collect_from(Path::new("/dev/disk"))
    })
}

pub fn collect_from(root: &Path) -> DiskByLinks {
    let mut links = DiskByLinks::default();

    walk(root.join("by-id"), |name, link, target| {
        links.symlink_to_device.insert(link.to_string(), target.to_string());
        // Partition links resolve but are not a disk's preferred stable path
        if !name.contains("-part") {
            links.by_id.entry(target.to_string()).or_default().push(link.to_string());
        }
    });

    walk(root.join("by-path"), |name, link, target| {
        links.symlink_to_device.insert(link.to_string(), target.to_string());
        if !name.contains("-part") {
            links.by_path.entry(target.to_string()).or_default().push(link.to_string());
        }
    });

    walk(root.join("by-uuid"), |name, link, target| {
        links.symlink_to_device.insert(link.to_string(), target.to_string());
        links.by_uuid.insert(name.to_string(), target.to_string());
    });

    walk(root.join("by-partuuid"), |name, link, target| {
        links.symlink_to_device.insert(link.to_string(), target.to_string());
        links.by_partuuid.insert(name.to_string(), target.to_string());
    });

    walk(root.join("by-label"), |name, link, target| {
        links.symlink_to_device.insert(link.to_string(), target.to_string());
        links.by_label.insert(name.to_string(), target.to_string());
    });

    walk(root.join("by-partlabel"), |name, link, target| {
        links.symlink_to_device.insert(link.to_string(), target.to_string());
        links.by_partlabel.insert(name.to_string(), target.to_string());
    });

    for v in links.by_id.values_mut() {
        v.sort();
    }
    for v in links.by_path.values_mut() {
        v.sort();
    }
    links
}

fn walk<F: FnMut(&str, &str, &str)>(dir: std::path::PathBuf, mut f: F) {
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let link = entry.path();
        let Ok(target) = fs::canonicalize(&link) else { continue };
        let name = entry.file_name().to_string_lossy().to_string();
        f(&name, &link.to_string_lossy(), &target.to_string_lossy());
    }
}

impl DiskByLinks {
    /// Preferred stable path for a device: first wwn- link, else first
    /// by-id link of any kind.
    pub fn preferred_by_id(&self, device: &str) -> Option<&String> {
        let ids = self.by_id.get(device)?;
        ids.iter().find(|p| p.contains("/wwn-")).or_else(|| ids.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::symlink;

    #[test]
    fn builds_bidirectional_maps() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        // Fake device nodes
        let dev = root.join("dev");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("sda"), "").unwrap();
        fs::write(dev.join("sda1"), "").unwrap();

        for sub in ["by-id", "by-path", "by-uuid", "by-label"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        symlink(dev.join("sda"), root.join("by-id/wwn-0x5000c500a6e7b82b")).unwrap();
        symlink(dev.join("sda"), root.join("by-id/scsi-35000c500a6e7b82b")).unwrap();
        symlink(dev.join("sda1"), root.join("by-id/wwn-0x5000c500a6e7b82b-part1")).unwrap();
        symlink(dev.join("sda"), root.join("by-path/pci-0000:0d:00.0-sas-phy0-lun-0")).unwrap();
        symlink(dev.join("sda1"), root.join("by-uuid/a1b2c3d4")).unwrap();
        symlink(dev.join("sda1"), root.join("by-label/tank")).unwrap();

        let links = collect_from(root);
        let sda = dev.join("sda").to_string_lossy().to_string();
        let sda1 = dev.join("sda1").to_string_lossy().to_string();

        assert_eq!(links.by_id[&sda].len(), 2);
        assert_eq!(links.by_path[&sda].len(), 1);
        assert_eq!(links.by_uuid["a1b2c3d4"], sda1);
        assert_eq!(links.by_label["tank"], sda1);
        // Partition link resolves through the symlink map but is excluded
        // from the whole-disk by-id list
        assert!(links
            .symlink_to_device
            .contains_key(&root.join("by-id/wwn-0x5000c500a6e7b82b-part1").to_string_lossy().to_string()));
        assert!(!links.by_id.contains_key(&sda1));

        let preferred = links.preferred_by_id(&sda).unwrap();
        assert!(preferred.contains("/wwn-"));
    }

    #[test]
    fn missing_farm_is_empty() {
        let links = collect_from(Path::new("/nonexistent"));
        assert!(links.symlink_to_device.is_empty());
    }
}
