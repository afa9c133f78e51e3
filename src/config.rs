use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub drives: DrivesConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Monitor refresh interval in seconds (drive state)
    pub monitor_interval_sec: u64,
    /// Temperature refresh interval in seconds
    pub temp_interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub temp_warn_c: i32,
    pub temp_crit_c: i32,
    pub controller_temp_warn_c: i32,
    pub controller_temp_crit_c: i32,
}

/// One declared drive from the config roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeclaredDrive {
    pub device: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrivesConfig {
    /// Expected drives. Empty means: discover live at runtime.
    #[serde(default)]
    pub declared: Vec<DeclaredDrive>,

    /// Glob-style patterns of kernel names to exclude from discovery
    /// (e.g. "loop*", "sr*")
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InventoryConfig {
    /// Override for the inventory store directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            thresholds: Thresholds::default(),
            drives: DrivesConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { monitor_interval_sec: 5, temp_interval_sec: 30 }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_warn_c: 55,
            temp_crit_c: 60,
            controller_temp_warn_c: 70,
            controller_temp_crit_c: 80,
        }
    }
}

impl Default for DrivesConfig {
    fn default() -> Self {
        Self {
            declared: Vec::new(),
            exclude: vec![
                "loop*".into(),
                "sr*".into(),
                "ram*".into(),
                "fd*".into(),
                "zd*".into(),
                "dm-*".into(),
                "md*".into(),
            ],
        }
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    /// Load from the given path, or the default location. Missing or
    /// unreadable config falls back to defaults (and writes them on first
    /// run when using the default location).
    pub fn load(path: Option<&std::path::Path>) -> Self {
        match path {
            Some(p) => try_load(p.to_path_buf()).unwrap_or_default(),
            None => match Config::config_path().and_then(|p| try_load(p).ok()) {
                Some(c) => c,
                None => {
                    let _ = try_write_defaults();
                    Config::default()
                }
            },
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("jbodctl").join("jbodctl.toml"))
    }

    /// True if `kernel_name` matches any exclude pattern.
    pub fn is_excluded(&self, kernel_name: &str) -> bool {
        self.drives.exclude.iter().any(|pat| glob_match(pat, kernel_name))
    }
}

fn try_load(path: PathBuf) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&text)?;
    Ok(cfg)
}

fn try_write_defaults() -> Result<()> {
    let path = Config::config_path().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&Config::default())?;
    fs::write(
        path,
        format!("# jbodctl configuration\n# Generated on first run — edit freely\n\n{}", text),
    )?;
    Ok(())
}

/// Minimal glob matcher: '*' matches any run of characters, everything else
/// is literal. Enough for device-name patterns like "loop*" or "sd*".
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn inner(p: &[u8], n: &[u8]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..])),
            (Some(pc), Some(nc)) if pc == nc => inner(&p[1..], &n[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn glob_match_star() {
        assert!(glob_match("loop*", "loop0"));
        assert!(glob_match("sd*", "sda"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("dm-*", "dm-3"));
        assert!(!glob_match("loop*", "sda"));
        assert!(!glob_match("sda", "sdab"));
        assert!(glob_match("sda", "sda"));
    }

    #[test]
    fn default_excludes_virtual_devices() {
        let cfg = Config::default();
        assert!(cfg.is_excluded("loop7"));
        assert!(cfg.is_excluded("sr0"));
        assert!(cfg.is_excluded("md127"));
        assert!(!cfg.is_excluded("sda"));
    }

    #[test]
    fn roundtrip_through_toml() {
        let mut cfg = Config::default();
        cfg.drives.declared.push(DeclaredDrive { device: "/dev/sda".into(), name: "bay0".into() });
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.drives.declared, cfg.drives.declared);
        assert_eq!(back.thresholds.temp_crit_c, 60);
    }
}
