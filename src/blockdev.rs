//! Block-Device Query (spec §4.2).
//!
//! Parses the output of `lsblk`'s JSON mode and a handful of related probes
//! (`blkid`, `findmnt`, sysfs) into typed records. Grounded on the teacher's
//! `hardware.rs` probe style (pure read-only detection, `anyhow::Result`,
//! safe fallbacks) and on the lsblk column list the original C++ installer
//! requests (`name,type,fstype,uuid,partuuid,pkname,label,size,mountpoint,model`).

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::supervisor;
use crate::types::DiskTransport;

/// A disk enumerated by [`list_disks`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiskInfo {
    pub device: String,
    pub model: Option<String>,
    pub size: u64,
    pub transport: DiskTransport,
    pub is_ssd: bool,
    pub is_removable: bool,
    pub pttype: Option<String>,
    pub partitions: Vec<PartitionInfo>,
}

/// A partition enumerated under a [`DiskInfo`].
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionInfo {
    pub device: String,
    pub fstype: Option<String>,
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub partuuid: Option<String>,
    pub mountpoint: Option<String>,
    pub is_mounted: bool,
    pub part_number: u32,
}

/// Raw shape of one `lsblk -J` device node. Only `name` and `type` are
/// required; everything else the probe might omit parses to `None`.
#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    fstype: Option<String>,
    uuid: Option<String>,
    model: Option<String>,
    mountpoint: Option<String>,
    label: Option<String>,
    partuuid: Option<String>,
    pttype: Option<String>,
    tran: Option<String>,
    rota: Option<bool>,
    rm: Option<bool>,
    #[serde(deserialize_with = "deserialize_size", default)]
    size: Option<u64>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// lsblk emits `size` as either a JSON number or a quoted string depending
/// on version; accept both.
fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeField {
        Num(u64),
        Str(String),
    }
    let opt = Option::<SizeField>::deserialize(deserializer)?;
    Ok(opt.and_then(|f| match f {
        SizeField::Num(n) => Some(n),
        SizeField::Str(s) => s.parse().ok(),
    }))
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

const LSBLK_COLUMNS: &str = "NAME,TYPE,FSTYPE,UUID,PARTUUID,LABEL,PTTYPE,TRAN,ROTA,RM,SIZE,MOUNTPOINT,MODEL";

fn probe_lsblk() -> Result<LsblkOutput> {
    let argv = vec![
        "lsblk".to_string(),
        "-b".to_string(),
        "-p".to_string(),
        "-a".to_string(),
        "-J".to_string(),
        "-O".to_string(),
        "-o".to_string(),
        LSBLK_COLUMNS.to_string(),
    ];
    let raw = supervisor::exec_capture(&argv);
    if raw == "-1" || raw.trim().is_empty() {
        anyhow::bail!("lsblk produced no output");
    }
    serde_json::from_str(&raw).context("failed to parse lsblk JSON")
}

fn partition_from_device(dev: &LsblkDevice) -> PartitionInfo {
    PartitionInfo {
        device: dev.name.clone(),
        fstype: dev.fstype.clone(),
        label: dev.label.clone(),
        uuid: dev.uuid.clone(),
        partuuid: dev.partuuid.clone(),
        mountpoint: dev.mountpoint.clone(),
        is_mounted: dev.mountpoint.is_some(),
        part_number: parse_partition_number(&dev.name).unwrap_or(0),
    }
}

fn disk_from_device(dev: &LsblkDevice) -> DiskInfo {
    let device = dev.name.clone();
    let transport = dev
        .tran
        .as_deref()
        .map(DiskTransport::from_probe_str)
        .unwrap_or_default();
    let is_ssd = dev.rota.map(|rota| !rota).unwrap_or_else(|| is_device_ssd(&device));
    let partitions = dev
        .children
        .iter()
        .filter(|c| c.kind == "part")
        .map(partition_from_device)
        .collect();

    DiskInfo {
        device,
        model: dev.model.clone(),
        size: dev.size.unwrap_or(0),
        transport,
        is_ssd,
        is_removable: dev.rm.unwrap_or(false),
        pttype: dev.pttype.clone(),
        partitions,
    }
}

/// Enumerate all disks known to the running system. Non-disk top-level
/// entries (`rom`, `loop`) are skipped.
pub fn list_disks() -> Result<Vec<DiskInfo>> {
    let output = probe_lsblk()?;
    Ok(output
        .blockdevices
        .iter()
        .filter(|d| d.kind == "disk")
        .map(disk_from_device)
        .collect())
}

/// Look up a single disk by device path.
pub fn get_disk_info(device: &str) -> Result<Option<DiskInfo>> {
    Ok(list_disks()?.into_iter().find(|d| d.device == device))
}

/// List the partitions of a single disk.
pub fn list_partitions(device: &str) -> Result<Vec<PartitionInfo>> {
    Ok(get_disk_info(device)?.map(|d| d.partitions).unwrap_or_default())
}

/// Filesystem UUID of a device, via `blkid`.
pub fn get_device_uuid(device: &str) -> Result<String> {
    let argv = vec![
        "blkid".to_string(),
        "-s".to_string(),
        "UUID".to_string(),
        "-o".to_string(),
        "value".to_string(),
        device.to_string(),
    ];
    let out = supervisor::exec_capture(&argv);
    if out == "-1" || out.is_empty() {
        anyhow::bail!("no UUID reported for {device}");
    }
    Ok(out)
}

/// Filesystem type mounted at `path`, via `findmnt`.
pub fn get_mountpoint_fs(path: &str) -> Result<String> {
    findmnt_field(path, "FSTYPE")
}

/// Mount source (device, or `/dev/mapper/<name>`, or zpool/dataset) at `path`.
pub fn get_mountpoint_source(path: &str) -> Result<String> {
    findmnt_field(path, "SOURCE")
}

fn findmnt_field(path: &str, field: &str) -> Result<String> {
    let argv = vec![
        "findmnt".to_string(),
        "-n".to_string(),
        "-o".to_string(),
        field.to_string(),
        path.to_string(),
    ];
    let out = supervisor::exec_capture(&argv);
    if out == "-1" || out.is_empty() {
        anyhow::bail!("{path} is not a mountpoint");
    }
    Ok(out)
}

/// Probe the rotational flag at `/sys/block/<base>/queue/rotational`;
/// fall back to name heuristics (`nvme*`, `vd*` imply SSD) when the sysfs
/// path is unreadable (e.g. inside a container).
pub fn is_device_ssd(device: &str) -> bool {
    let base = get_disk_name_from_device(device);
    let base_name = base.rsplit('/').next().unwrap_or(&base);
    let sysfs_path = format!("/sys/block/{base_name}/queue/rotational");

    match std::fs::read_to_string(&sysfs_path) {
        Ok(contents) => contents.trim() == "0",
        Err(_) => base_name.starts_with("nvme") || base_name.starts_with("vd"),
    }
}

/// Parse the trailing partition number off a device path. NVMe names split
/// at the first `p` after `nvme...`; other names strip trailing digits.
pub fn parse_partition_number(device: &str) -> Option<u32> {
    let name = device.rsplit('/').next().unwrap_or(device);
    if name.contains("nvme") {
        let p_pos = name.rfind('p')?;
        name[p_pos + 1..].parse().ok()
    } else {
        let digits_start = name.rfind(|c: char| !c.is_ascii_digit())? + 1;
        if digits_start == name.len() {
            return None;
        }
        name[digits_start..].parse().ok()
    }
}

/// Strip a partition suffix off a device path, returning the parent disk's
/// device path (e.g. `/dev/nvme0n1p2` → `/dev/nvme0n1`, `/dev/sda2` → `/dev/sda`).
pub fn get_disk_name_from_device(device: &str) -> String {
    if device.contains("nvme") {
        match device.rfind('p') {
            Some(p_pos) if device[p_pos + 1..].chars().all(|c| c.is_ascii_digit()) && p_pos + 1 < device.len() => {
                device[..p_pos].to_string()
            }
            _ => device.to_string(),
        }
    } else {
        let digits_start = device.rfind(|c: char| !c.is_ascii_digit()).map(|i| i + 1).unwrap_or(0);
        if digits_start == 0 || digits_start == device.len() {
            device.to_string()
        } else {
            device[..digits_start].to_string()
        }
    }
}

/// Format a byte count using binary units (KiB/MiB/GiB/TiB), with one
/// decimal place once the value reaches GiB or larger.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    const TIB: f64 = GIB * 1024.0;

    let b = bytes as f64;
    if b >= TIB {
        format!("{:.1}TiB", b / TIB)
    } else if b >= GIB {
        format!("{:.1}GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.0}MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.0}KiB", b / KIB)
    } else {
        format!("{bytes}B")
    }
}

/// Returns true if `path` is currently a mountpoint (used by callers that
/// only need the boolean, not the source/fstype).
pub fn is_mounted(path: &Path) -> bool {
    get_mountpoint_source(&path.display().to_string()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_lsblk_json() {
        let json = r#"{
            "blockdevices": [
                {
                    "name": "/dev/nvme0n1",
                    "type": "disk",
                    "size": "512110190592",
                    "tran": "nvme",
                    "rota": false,
                    "rm": false,
                    "children": [
                        {
                            "name": "/dev/nvme0n1p1",
                            "type": "part",
                            "fstype": "vfat",
                            "mountpoint": "/boot"
                        },
                        {
                            "name": "/dev/nvme0n1p2",
                            "type": "part",
                            "fstype": "ext4",
                            "mountpoint": null
                        }
                    ]
                },
                { "name": "/dev/loop0", "type": "loop" }
            ]
        }"#;
        let parsed: LsblkOutput = serde_json::from_str(json).unwrap();
        let disks: Vec<DiskInfo> = parsed
            .blockdevices
            .iter()
            .filter(|d| d.kind == "disk")
            .map(disk_from_device)
            .collect();

        assert_eq!(disks.len(), 1);
        let disk = &disks[0];
        assert_eq!(disk.device, "/dev/nvme0n1");
        assert_eq!(disk.transport, DiskTransport::Nvme);
        assert!(disk.is_ssd);
        assert!(!disk.is_removable);
        assert_eq!(disk.partitions.len(), 2);
        assert_eq!(disk.partitions[0].part_number, 1);
        assert!(disk.partitions[0].is_mounted);
        assert!(!disk.partitions[1].is_mounted);
    }

    #[test]
    fn parse_partition_number_nvme() {
        assert_eq!(parse_partition_number("/dev/nvme0n1p3"), Some(3));
    }

    #[test]
    fn parse_partition_number_sata() {
        assert_eq!(parse_partition_number("/dev/sda2"), Some(2));
    }

    #[test]
    fn parse_partition_number_whole_disk_is_none() {
        assert_eq!(parse_partition_number("/dev/sda"), None);
        assert_eq!(parse_partition_number("/dev/nvme0n1"), None);
    }

    #[test]
    fn disk_name_from_partition_nvme() {
        assert_eq!(get_disk_name_from_device("/dev/nvme0n1p2"), "/dev/nvme0n1");
    }

    #[test]
    fn disk_name_from_partition_sata() {
        assert_eq!(get_disk_name_from_device("/dev/sda2"), "/dev/sda");
    }

    #[test]
    fn disk_name_from_whole_disk_is_unchanged() {
        assert_eq!(get_disk_name_from_device("/dev/sda"), "/dev/sda");
        assert_eq!(get_disk_name_from_device("/dev/nvme0n1"), "/dev/nvme0n1");
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5MiB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 + 512 * 1024 * 1024), "3.5GiB");
    }

    #[test]
    fn transport_from_probe_str_covers_known_values() {
        assert_eq!(DiskTransport::from_probe_str("nvme"), DiskTransport::Nvme);
        assert_eq!(DiskTransport::from_probe_str("sata"), DiskTransport::Sata);
        assert_eq!(DiskTransport::from_probe_str("usb"), DiskTransport::Usb);
        assert_eq!(DiskTransport::from_probe_str("weird"), DiskTransport::Unknown);
    }
}
