use serde::Serialize;

pub const STATE_ONLINE: &str = "ONLINE";

/// Grouping kind of a vdev tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VdevKind {
    Pool,
    Raidz,
    Mirror,
    /// Leaf disk directly under the pool root.
    Stripe,
    Disk,
    Spare,
    Log,
    Cache,
}

impl VdevKind {
    /// Classify a name from the zpool status config section.
    pub fn from_name(name: &str) -> VdevKind {
        if name.starts_with("raidz") {
            VdevKind::Raidz
        } else if name.starts_with("mirror") {
            VdevKind::Mirror
        } else if name.starts_with("spare") {
            VdevKind::Spare
        } else if name == "logs" || name.starts_with("log") {
            VdevKind::Log
        } else if name.starts_with("cache") {
            VdevKind::Cache
        } else if name.starts_with("/dev/")
            || name.starts_with("sd")
            || name.starts_with("hd")
            || name.starts_with("vd")
            || name.starts_with("nvme")
        {
            VdevKind::Disk
        } else {
            VdevKind::Pool
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VdevKind::Pool => "pool",
            VdevKind::Raidz => "raidz",
            VdevKind::Mirror => "mirror",
            VdevKind::Stripe => "stripe",
            VdevKind::Disk => "disk",
            VdevKind::Spare => "spare",
            VdevKind::Log => "log",
            VdevKind::Cache => "cache",
        }
    }
}

/// One node in a pool's vdev tree with its error counters.
#[derive(Debug, Clone, Serialize)]
pub struct VdevHealth {
    pub name: String,
    pub kind: VdevKind,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
    pub read_errors: u64,
    pub write_errors: u64,
    pub cksum_errors: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub slow_ios: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VdevHealth>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl VdevHealth {
    fn faulted_into<'a>(&'a self, out: &mut Vec<&'a VdevHealth>) {
        if self.state != STATE_ONLINE && matches!(self.kind, VdevKind::Disk | VdevKind::Stripe) {
            out.push(self);
        }
        for c in &self.children {
            c.faulted_into(out);
        }
    }

    fn leaves_into<'a>(&'a self, out: &mut Vec<&'a VdevHealth>) {
        if self.children.is_empty() && matches!(self.kind, VdevKind::Disk | VdevKind::Stripe) {
            out.push(self);
        }
        for c in &self.children {
            c.leaves_into(out);
        }
    }
}

/// Health of one ZFS pool: state, scan progress and the vdev tree.
#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    pub name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
    pub vdevs: Vec<VdevHealth>,
    pub total_errors: u64,
}

impl PoolHealth {
    pub fn new(name: &str) -> Self {
        PoolHealth {
            name: name.to_string(),
            state: String::new(),
            status: None,
            action: None,
            scan_state: None,
            scan_percent: None,
            scan_message: None,
            errors: None,
            vdevs: Vec::new(),
            total_errors: 0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.state != STATE_ONLINE
    }

    /// Leaf devices whose state is not ONLINE.
    pub fn faulted_devices(&self) -> Vec<&VdevHealth> {
        let mut out = Vec::new();
        for v in &self.vdevs {
            v.faulted_into(&mut out);
        }
        out
    }

    /// All leaf disk devices in the tree.
    pub fn leaf_devices(&self) -> Vec<&VdevHealth> {
        let mut out = Vec::new();
        for v in &self.vdevs {
            v.leaves_into(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leaf(name: &str, state: &str) -> VdevHealth {
        VdevHealth {
            name: name.to_string(),
            kind: VdevKind::Disk,
            state: state.to_string(),
            device_path: Some(format!("/dev/{}", name)),
            read_errors: 0,
            write_errors: 0,
            cksum_errors: 0,
            slow_ios: 0,
            children: Vec::new(),
        }
    }

    #[test]
    fn faulted_devices_walks_nested_vdevs() {
        let mut pool = PoolHealth::new("tank");
        pool.state = "DEGRADED".to_string();
        pool.vdevs = vec![VdevHealth {
            name: "raidz2-0".to_string(),
            kind: VdevKind::Raidz,
            state: "DEGRADED".to_string(),
            device_path: None,
            read_errors: 0,
            write_errors: 0,
            cksum_errors: 0,
            slow_ios: 0,
            children: vec![leaf("sda", "ONLINE"), leaf("sdb", "FAULTED"), leaf("sdc", "UNAVAIL")],
        }];

        let faulted: Vec<&str> = pool.faulted_devices().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(faulted, vec!["sdb", "sdc"]);
        assert_eq!(pool.leaf_devices().len(), 3);
        assert!(pool.is_degraded());
    }

    #[test]
    fn vdev_kind_classification() {
        assert_eq!(VdevKind::from_name("raidz2-0"), VdevKind::Raidz);
        assert_eq!(VdevKind::from_name("mirror-1"), VdevKind::Mirror);
        assert_eq!(VdevKind::from_name("/dev/sda1"), VdevKind::Disk);
        assert_eq!(VdevKind::from_name("sdc"), VdevKind::Disk);
        assert_eq!(VdevKind::from_name("logs"), VdevKind::Log);
        assert_eq!(VdevKind::from_name("cache"), VdevKind::Cache);
        assert_eq!(VdevKind::from_name("tank"), VdevKind::Pool);
    }
}
