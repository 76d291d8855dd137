//! Partition Planner (spec §4.3).
//!
//! Builds a [`PartitionScheme`] from either a [`DefaultPartitionSchemaConfig`]
//! clean-install layout or an explicit declarative list, validates its
//! invariants, previews it as text, and emits the partitioning-tool script.
//!
//! Grounded on the `gucc` partitioning/partition_config pair: `sfdisk`
//! script generation (`type=<alias>,size=<size>[,bootable]`), the
//! erase→partition clean-disk procedure, and the UEFI/BIOS/swap/root
//! layout ordering.

use crate::blockdev;
use crate::error::{InstallError, Result};
use crate::supervisor;
use crate::types::Filesystem;

/// A single partition (or btrfs subvolume sharing a device) in a scheme.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    pub device: String,
    pub fstype: Filesystem,
    /// Absolute path inside the target root; empty for swap.
    pub mountpoint: String,
    pub mount_opts: String,
    pub uuid: Option<String>,
    /// Human size string (`"512MiB"`); empty means "grow to remainder".
    pub size: String,
    pub subvolume: Option<String>,
    pub luks_mapper_name: Option<String>,
    pub luks_uuid: Option<String>,
    pub luks_passphrase: Option<String>,
}

impl Partition {
    pub fn is_grow(&self) -> bool {
        self.size.is_empty()
    }

    pub fn is_swap(&self) -> bool {
        self.fstype == Filesystem::LinuxSwap
    }

    pub fn is_root(&self) -> bool {
        self.mountpoint == "/"
    }

    pub fn is_luks(&self) -> bool {
        self.luks_mapper_name.is_some()
    }
}

/// Ordered sequence of partitions plus the target disk and firmware mode.
#[derive(Debug, Clone, Default)]
pub struct PartitionScheme {
    pub device: String,
    pub is_efi: bool,
    pub partitions: Vec<Partition>,
}

/// `{/@→/, /@home→/home, /@cache→/var/cache}` — the default btrfs layout.
pub fn default_btrfs_subvolumes() -> Vec<BtrfsSubvolume> {
    vec![
        BtrfsSubvolume { subvolume: "/@".into(), mountpoint: "/".into() },
        BtrfsSubvolume { subvolume: "/@home".into(), mountpoint: "/home".into() },
        BtrfsSubvolume { subvolume: "/@cache".into(), mountpoint: "/var/cache".into() },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtrfsSubvolume {
    pub subvolume: String,
    pub mountpoint: String,
}

/// Config describing a clean-install layout (spec §4.3).
#[derive(Debug, Clone)]
pub struct DefaultPartitionSchemaConfig {
    pub root_fs_type: Filesystem,
    pub efi_partition_size: String,
    pub swap_partition_size: Option<String>,
    pub boot_partition_size: Option<String>,
    pub is_ssd: bool,
    pub root_mount_opts: Option<String>,
    pub boot_mountpoint: String,
    pub create_btrfs_subvolumes: bool,
}

impl Default for DefaultPartitionSchemaConfig {
    fn default() -> Self {
        Self {
            root_fs_type: Filesystem::Ext4,
            efi_partition_size: "2GiB".to_string(),
            swap_partition_size: None,
            boot_partition_size: None,
            is_ssd: false,
            root_mount_opts: None,
            boot_mountpoint: "/boot".to_string(),
            create_btrfs_subvolumes: true,
        }
    }
}

/// Synthesize the device path for the `index`'th partition (1-based) of
/// `disk` (NVMe appends `pN`; otherwise `N`).
fn nth_partition_device(disk: &str, index: usize) -> String {
    if disk.contains("nvme") {
        format!("{disk}p{index}")
    } else {
        format!("{disk}{index}")
    }
}

/// Build a scheme from a clean-install config: UEFI ESP (or BIOS boot) →
/// swap → root (grows to remainder).
pub fn generate_default_partition_schema(
    device: &str,
    config: &DefaultPartitionSchemaConfig,
    is_efi: bool,
) -> PartitionScheme {
    let mut partitions = Vec::new();
    let root_mount_opts = config
        .root_mount_opts
        .clone()
        .unwrap_or_else(|| config.root_fs_type.default_mount_opts(config.is_ssd).to_string());

    if is_efi {
        partitions.push(Partition {
            device: nth_partition_device(device, partitions.len() + 1),
            fstype: Filesystem::Vfat,
            mountpoint: config.boot_mountpoint.clone(),
            mount_opts: Filesystem::Vfat.default_mount_opts(config.is_ssd).to_string(),
            size: config.efi_partition_size.clone(),
            ..Default::default()
        });
    } else if let Some(boot_size) = &config.boot_partition_size {
        partitions.push(Partition {
            device: nth_partition_device(device, partitions.len() + 1),
            fstype: Filesystem::Ext4,
            mountpoint: config.boot_mountpoint.clone(),
            mount_opts: Filesystem::Ext4.default_mount_opts(config.is_ssd).to_string(),
            size: boot_size.clone(),
            ..Default::default()
        });
    }

    if let Some(swap_size) = &config.swap_partition_size {
        partitions.push(Partition {
            device: nth_partition_device(device, partitions.len() + 1),
            fstype: Filesystem::LinuxSwap,
            mountpoint: String::new(),
            mount_opts: "defaults".to_string(),
            size: swap_size.clone(),
            ..Default::default()
        });
    }

    partitions.push(Partition {
        device: nth_partition_device(device, partitions.len() + 1),
        fstype: config.root_fs_type,
        mountpoint: "/".to_string(),
        mount_opts: root_mount_opts,
        size: String::new(),
        ..Default::default()
    });

    PartitionScheme { device: device.to_string(), is_efi, partitions }
}

/// Recommended swap size from the amount of installed RAM. Tiered so small
/// systems get enough swap to hibernate while large-memory systems aren't
/// asked to carve out tens of gigabytes: <=2GiB RAM doubles it, 2-8GiB
/// matches it 1:1, 8-64GiB halves it (capped at 8GiB), beyond that a flat
/// 4GiB covers occasional overflow without hibernation support.
pub fn recommended_swap_size(ram_bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    let ram_gib = ram_bytes / GIB;

    let swap_gib = if ram_gib <= 2 {
        (ram_gib * 2).max(1)
    } else if ram_gib <= 8 {
        ram_gib
    } else if ram_gib <= 64 {
        (ram_gib / 2).min(8)
    } else {
        4
    };
    format!("{swap_gib}GiB")
}

/// Validation result for a scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validate the scheme's invariants (spec §4.3).
pub fn validate(scheme: &PartitionScheme) -> ValidationResult {
    let mut result = ValidationResult { is_valid: true, errors: Vec::new(), warnings: Vec::new() };

    if scheme.partitions.is_empty() {
        result.is_valid = false;
        result.errors.push("Partition schema is empty".to_string());
        return result;
    }

    if !scheme.partitions.iter().any(|p| p.mountpoint == "/") {
        result.is_valid = false;
        result.errors.push("No root (/) partition defined".to_string());
    }

    if scheme.is_efi && !scheme.partitions.iter().any(|p| p.fstype == Filesystem::Vfat) {
        result.is_valid = false;
        result.errors.push("UEFI requires ESP".to_string());
    }

    let empty_size_count = scheme
        .partitions
        .iter()
        .filter(|p| p.is_grow() && p.subvolume.is_none())
        .count();
    if empty_size_count > 1 {
        result
            .warnings
            .push("Multiple partitions without specified size - only the last grows".to_string());
    }

    result
}

/// Sort partitions for numbering/script emission: by size descending
/// (grow-to-fill partitions sort last).
fn sorted_by_size_desc(partitions: &[Partition]) -> Vec<&Partition> {
    let mut sorted: Vec<&Partition> = partitions.iter().collect();
    sorted.sort_by(|a, b| {
        let key = |p: &Partition| if p.is_grow() { 0u64 } else { parse_size_bytes(&p.size) };
        key(b).cmp(&key(a))
    });
    sorted
}

fn parse_size_bytes(size: &str) -> u64 {
    let size = size.trim();
    let split_at = size.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(size.len());
    let (num, unit) = size.split_at(split_at);
    let num: f64 = num.parse().unwrap_or(0.0);
    let mult: f64 = match unit.trim() {
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    (num * mult) as u64
}

fn partition_type_alias(fstype: Filesystem) -> &'static str {
    match fstype {
        Filesystem::Vfat => "U",
        Filesystem::LinuxSwap => "S",
        _ => "L",
    }
}

/// Emit the `sfdisk`-script-style partitioning commands for `scheme`.
pub fn gen_partitioning_script(scheme: &PartitionScheme) -> String {
    let mut script = String::new();
    script.push_str(if scheme.is_efi { "label: gpt\n" } else { "label: dos\n" });

    for part in sorted_by_size_desc(&scheme.partitions) {
        script.push_str(&format!("type={}", partition_type_alias(part.fstype)));
        if !part.is_grow() {
            script.push_str(&format!(",size={}", part.size));
        }
        if part.fstype == Filesystem::Vfat {
            script.push_str(",bootable");
        }
        script.push('\n');
    }
    script
}

/// Render a human-readable preview of the scheme: header, per-partition
/// table, subvolume table (if any), validation messages, then the
/// partitioning script for traceability.
pub fn preview(scheme: &PartitionScheme) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== Partition Schema for {} ===\n", scheme.device));
    out.push_str(&format!("Mode: {}\n\n", if scheme.is_efi { "UEFI (GPT)" } else { "BIOS (MBR)" }));

    for part in &scheme.partitions {
        let size = if part.is_grow() { "grow".to_string() } else { part.size.clone() };
        let opts: String = part.mount_opts.chars().take(40).collect();
        out.push_str(&format!(
            "  {:<20} {:>8} {:<8} {:<12} {}\n",
            part.device, size, part.fstype, part.mountpoint, opts
        ));
    }

    let subvols: Vec<&Partition> = scheme.partitions.iter().filter(|p| p.subvolume.is_some()).collect();
    if !subvols.is_empty() {
        out.push_str("\n--- Subvolumes ---\n");
        for part in subvols {
            out.push_str(&format!(
                "  {} -> {}\n",
                part.subvolume.as_deref().unwrap_or(""),
                part.mountpoint
            ));
        }
    }

    let validation = validate(scheme);
    if !validation.errors.is_empty() || !validation.warnings.is_empty() {
        out.push_str("\n--- Validation ---\n");
        for e in &validation.errors {
            out.push_str(&format!("  ERROR: {e}\n"));
        }
        for w in &validation.warnings {
            out.push_str(&format!("  WARNING: {w}\n"));
        }
    }

    out.push_str("\n--- Partitioning script ---\n");
    out.push_str(&gen_partitioning_script(scheme));
    out
}

/// Erase a whole disk: zero the first 512 bytes, `wipefs -a`, zap GPT
/// structures. Any step's failure aborts and returns an error.
fn erase_disk(device: &str) -> Result<()> {
    let dd = vec![
        "dd".to_string(),
        "if=/dev/zero".to_string(),
        format!("of={device}"),
        "bs=512".to_string(),
        "count=1".to_string(),
    ];
    if !supervisor::exec_checked(&dd) {
        return Err(InstallError::partitioning(format!("failed to zero first sector of {device}")));
    }

    let wipefs = vec!["wipefs".to_string(), "-af".to_string(), device.to_string()];
    if !supervisor::exec_checked(&wipefs) {
        return Err(InstallError::partitioning(format!("wipefs failed on {device}")));
    }

    let sgdisk = vec!["sgdisk".to_string(), "-Zo".to_string(), device.to_string()];
    if !supervisor::exec_checked(&sgdisk) {
        return Err(InstallError::partitioning(format!("sgdisk zap failed on {device}")));
    }

    Ok(())
}

/// Feed the partitioning script to `sfdisk` with the always-sync flag.
fn run_sfdisk(script: &str, device: &str) -> Result<()> {
    let argv = vec![
        "sfdisk".to_string(),
        "-w".to_string(),
        "always".to_string(),
        device.to_string(),
    ];
    let mut cmd = std::process::Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::piped());

    if std::env::var("DIRTY_CMD_RUN").as_deref() == Ok("1") {
        tracing::info!(script, device, "DIRTY_CMD_RUN=1: skipping sfdisk invocation");
        return Ok(());
    }

    let mut child = cmd.spawn().map_err(|e| InstallError::partitioning(e.to_string()))?;
    {
        use std::io::Write;
        let stdin = child.stdin.as_mut().expect("stdin was piped");
        stdin
            .write_all(script.as_bytes())
            .map_err(|e| InstallError::partitioning(e.to_string()))?;
    }
    let output = child.wait_with_output().map_err(|e| InstallError::partitioning(e.to_string()))?;
    if !output.status.success() {
        return Err(InstallError::partitioning(format!(
            "sfdisk failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Clean-disk procedure: erase the disk, then apply `scheme`'s script.
pub fn make_clean_partschema(scheme: &PartitionScheme) -> Result<()> {
    erase_disk(&scheme.device)?;
    let script = gen_partitioning_script(scheme);
    run_sfdisk(&script, &scheme.device)
}

/// Augment `scheme` with one `Partition` per subvolume, cloning the root
/// btrfs partition's device/uuid/LUKS metadata for each. Fails if no root
/// btrfs partition exists.
pub fn btrfs_append_subvolumes(scheme: &mut PartitionScheme, subvols: &[BtrfsSubvolume]) -> Result<()> {
    let root_idx = scheme
        .partitions
        .iter()
        .position(|p| p.is_root() && p.fstype == Filesystem::Btrfs)
        .ok_or_else(|| InstallError::partitioning("no root btrfs partition to attach subvolumes to"))?;
    let root = scheme.partitions[root_idx].clone();

    for sub in subvols {
        if let Some(existing) = scheme
            .partitions
            .iter_mut()
            .find(|p| p.mountpoint == sub.mountpoint || p.subvolume.as_deref() == Some(sub.subvolume.as_str()))
        {
            existing.subvolume = Some(sub.subvolume.clone());
            existing.mountpoint = sub.mountpoint.clone();
        } else {
            let mut clone = root.clone();
            clone.subvolume = Some(sub.subvolume.clone());
            clone.mountpoint = sub.mountpoint.clone();
            scheme.partitions.push(clone);
        }
    }
    Ok(())
}

/// Re-probe UUIDs for every partition in the scheme after formatting, via
/// the block-device query layer.
pub fn refresh_uuids(scheme: &mut PartitionScheme) {
    for part in &mut scheme.partitions {
        if let Ok(uuid) = blockdev::get_device_uuid(&part.device) {
            part.uuid = Some(uuid);
        }
    }
}
