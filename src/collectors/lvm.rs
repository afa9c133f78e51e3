//! LVM probe: `pvs`/`vgs`/`lvs` in JSON report mode.

use serde_json::Value;
use std::process::Command;

use crate::cache::{Cache, Tier};

#[derive(Debug, Clone, Default)]
pub struct LvmPv {
    /// /dev/sdf1
    pub name: String,
    pub uuid: Option<String>,
    pub vg_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LvmVg {
    pub name: String,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LvmLv {
    pub name: String,
    pub uuid: Option<String>,
    pub vg_name: Option<String>,
    /// /dev/vg0/lv0
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LvmState {
    pub pvs: Vec<LvmPv>,
    pub vgs: Vec<LvmVg>,
    pub lvs: Vec<LvmLv>,
}

pub fn collect(cache: &Cache) -> LvmState {
    cache.get_or_insert_with("lvm:state", Tier::Medium, || {
        let pvs_out = run("pvs", "pv_name,pv_uuid,vg_name");
        let vgs_out = run("vgs", "vg_name,vg_uuid");
        let lvs_out = run("lvs", "lv_name,lv_uuid,vg_name,lv_path");
        LvmState {
            pvs: pvs_out.as_deref().map(parse_pvs).unwrap_or_default(),
            vgs: vgs_out.as_deref().map(parse_vgs).unwrap_or_default(),
            lvs: lvs_out.as_deref().map(parse_lvs).unwrap_or_default(),
        }
    })
}

fn run(tool: &str, columns: &str) -> Option<String> {
    let out = Command::new(tool)
        .args(["--reportformat", "json", "--units", "b", "--nosuffix", "-o", columns])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).to_string())
}

/// The report JSON nests rows as report[0].<section>[].
fn report_rows<'a>(v: &'a Value, section: &str) -> Vec<&'a Value> {
    v["report"]
        .as_array()
        .map(|reports| {
            reports
                .iter()
                .filter_map(|r| r[section].as_array())
                .flatten()
                .collect()
        })
        .unwrap_or_default()
}

fn field(row: &Value, key: &str) -> Option<String> {
    row[key].as_str().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn parse_pvs(text: &str) -> Vec<LvmPv> {
    let Ok(v) = serde_json::from_str::<Value>(text) else { return Vec::new() };
    report_rows(&v, "pv")
        .into_iter()
        .filter_map(|row| {
            Some(LvmPv {
                name: field(row, "pv_name")?,
                uuid: field(row, "pv_uuid"),
                vg_name: field(row, "vg_name"),
            })
        })
        .collect()
}

pub fn parse_vgs(text: &str) -> Vec<LvmVg> {
    let Ok(v) = serde_json::from_str::<Value>(text) else { return Vec::new() };
    report_rows(&v, "vg")
        .into_iter()
        .filter_map(|row| {
            Some(LvmVg { name: field(row, "vg_name")?, uuid: field(row, "vg_uuid") })
        })
        .collect()
}

pub fn parse_lvs(text: &str) -> Vec<LvmLv> {
    let Ok(v) = serde_json::from_str::<Value>(text) else { return Vec::new() };
    report_rows(&v, "lv")
        .into_iter()
        .filter_map(|row| {
            Some(LvmLv {
                name: field(row, "lv_name")?,
                uuid: field(row, "lv_uuid"),
                vg_name: field(row, "vg_name"),
                path: field(row, "lv_path"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_pv_report() {
        let text = r#"{"report":[{"pv":[
            {"pv_name":"/dev/sdf1","pv_uuid":"Jf0eKz-0000","vg_name":"vg0"},
            {"pv_name":"/dev/sdg1","pv_uuid":"Kx9yLm-1111","vg_name":""}
        ]}]}"#;
        let pvs = parse_pvs(text);
        assert_eq!(pvs.len(), 2);
        assert_eq!(pvs[0].name, "/dev/sdf1");
        assert_eq!(pvs[0].vg_name.as_deref(), Some("vg0"));
        // Orphan PV has no VG
        assert_eq!(pvs[1].vg_name, None);
    }

    #[test]
    fn parses_lv_report() {
        let text = r#"{"report":[{"lv":[
            {"lv_name":"data","lv_uuid":"abc-123","vg_name":"vg0","lv_path":"/dev/vg0/data"}
        ]}]}"#;
        let lvs = parse_lvs(text);
        assert_eq!(lvs.len(), 1);
        assert_eq!(lvs[0].path.as_deref(), Some("/dev/vg0/data"));
    }

    #[test]
    fn bad_json_is_empty() {
        assert!(parse_pvs("garbage").is_empty());
        assert!(parse_vgs("{}").is_empty());
    }
}
