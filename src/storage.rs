//! Storage Layer Composer (spec §4.4).
//!
//! Realizes a planned [`PartitionScheme`](crate::partition::PartitionScheme)
//! on disk: LUKS, LVM, ZFS, and btrfs-subvolume layering, then mounts
//! everything in dependency order.
//!
//! Grounded on `gucc`'s `luks.cpp`/`lvm.cpp`/`zfs.cpp`/`btrfs.cpp`/
//! `mount_partitions.cpp`/`umount_partitions.cpp` for command shapes and
//! ordering, executed here through the process supervisor instead of
//! shelling to bash, and on the teacher's `engine/storage.rs`
//! `StorageOp`/`StoragePlan` shape for the operation-list representation.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::process::Stdio;

use crate::error::{InstallError, Result};
use crate::supervisor::{self, ExecOpts};
use crate::types::LuksVersion;

/// `{version, passphrase, extra_flags?, tpm2?}` (spec §3 `LuksConfig`).
#[derive(Debug, Clone)]
pub struct LuksConfig {
    pub version: LuksVersion,
    pub passphrase: String,
    pub extra_flags: Option<String>,
    pub tpm2: Option<Tpm2Config>,
}

#[derive(Debug, Clone)]
pub struct Tpm2Config {
    /// PCR set to bind to; default `0,2,4,7`.
    pub pcrs: String,
    pub device: String,
}

impl Default for Tpm2Config {
    fn default() -> Self {
        Self { pcrs: "0,2,4,7".to_string(), device: "auto".to_string() }
    }
}

/// A LUKS device may hold up to 8 key slots; the composer refuses to add a
/// new one once 4 are already used, leaving headroom for recovery keys.
const MAX_KEY_SLOTS_BEFORE_REFUSAL: usize = 4;

fn pipe_to_stdin(argv: &[String], stdin_data: &str) -> Result<bool> {
    if std::env::var("DIRTY_CMD_RUN").as_deref() == Ok("1") {
        tracing::info!(argv = ?argv, "DIRTY_CMD_RUN=1: skipping actual execution");
        return Ok(true);
    }
    let mut cmd = std::process::Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| InstallError::composer(e.to_string()))?;
    {
        let stdin = child.stdin.as_mut().expect("stdin was piped");
        stdin
            .write_all(stdin_data.as_bytes())
            .map_err(|e| InstallError::composer(e.to_string()))?;
    }
    let output = child.wait_with_output().map_err(|e| InstallError::composer(e.to_string()))?;
    Ok(output.status.success())
}

/// `cryptsetup luksFormat` on `device`, passphrase fed via stdin.
pub fn luks_format(config: &LuksConfig, device: &str) -> Result<()> {
    let mut argv = vec!["cryptsetup".to_string(), "-q".to_string()];
    if let Some(flags) = &config.extra_flags {
        argv.extend(flags.split_whitespace().map(str::to_string));
    }
    argv.push("--type".to_string());
    argv.push(config.version.cryptsetup_type().to_string());
    argv.push("luksFormat".to_string());
    argv.push(device.to_string());

    if !pipe_to_stdin(&argv, &config.passphrase)? {
        return Err(InstallError::composer(format!("luksFormat failed on {device}")));
    }
    Ok(())
}

/// `cryptsetup open` into `/dev/mapper/<mapper_name>`.
pub fn luks_open(config: &LuksConfig, device: &str, mapper_name: &str) -> Result<()> {
    let argv = vec![
        "cryptsetup".to_string(),
        "open".to_string(),
        "--type".to_string(),
        config.version.cryptsetup_type().to_string(),
        device.to_string(),
        mapper_name.to_string(),
    ];
    if !pipe_to_stdin(&argv, &config.passphrase)? {
        return Err(InstallError::composer(format!("luksOpen failed on {device}")));
    }
    Ok(())
}

/// Count key slots currently in use via `cryptsetup luksDump`.
fn used_key_slots(device: &str) -> usize {
    let out = supervisor::exec_capture(&["cryptsetup".to_string(), "luksDump".to_string(), device.to_string()]);
    out.lines().filter(|l| l.trim_start().starts_with(|c: char| c.is_ascii_digit()) && l.contains(':')).count()
}

/// Add a key slot from `keyfile`. Refuses once
/// [`MAX_KEY_SLOTS_BEFORE_REFUSAL`] slots are already used.
pub fn luks_add_key(device: &str, keyfile: &Path, passphrase: &str, extra_flags: Option<&str>) -> Result<()> {
    if used_key_slots(device) >= MAX_KEY_SLOTS_BEFORE_REFUSAL {
        return Err(InstallError::composer(format!(
            "refusing to add a LUKS key slot to {device}: already at the slot-usage limit"
        )));
    }
    let mut argv = vec!["cryptsetup".to_string(), "-q".to_string()];
    if let Some(flags) = extra_flags {
        argv.extend(flags.split_whitespace().map(str::to_string));
    }
    argv.push("luksAddKey".to_string());
    argv.push(device.to_string());
    argv.push(keyfile.display().to_string());

    if !pipe_to_stdin(&argv, passphrase)? {
        return Err(InstallError::composer(format!("luksAddKey failed on {device}")));
    }
    Ok(())
}

/// Generate a random 512-byte keyfile inside the mounted target root,
/// `chmod 600` it, and add it as a LUKS key slot.
pub fn luks_setup_keyfile(
    keyfile_path: &Path,
    root_mountpoint: &Path,
    device: &str,
    passphrase: &str,
    extra_flags: Option<&str>,
) -> Result<()> {
    let full_path = root_mountpoint.join(keyfile_path.strip_prefix("/").unwrap_or(keyfile_path));
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut key_bytes = [0u8; 512];
    fs::File::open("/dev/urandom")?.read_exact(&mut key_bytes)?;
    fs::write(&full_path, key_bytes)?;

    let chmod = vec!["chmod".to_string(), "600".to_string(), full_path.display().to_string()];
    if !supervisor::exec_checked(&chmod) {
        return Err(InstallError::composer(format!("chmod 600 failed on {}", full_path.display())));
    }

    luks_add_key(device, &full_path, passphrase, extra_flags)
}

/// Probe whether TPM2 enrollment tooling (`systemd-cryptenroll`) is usable.
pub fn tpm2_available() -> bool {
    supervisor::exec_checked(&["systemd-cryptenroll".to_string(), "--tpm2-device=list".to_string()])
}

/// TPM2 enrollment (LUKS2 only). Returns `Ok(false)` (not an error) when
/// the availability probe fails: the partition stays encrypted but without
/// TPM auto-unlock, and the caller is responsible for informing the user.
pub fn luks_enroll_tpm2(device: &str, tpm2: &Tpm2Config) -> Result<bool> {
    if !tpm2_available() {
        tracing::warn!(device, "TPM2 not available; continuing without auto-unlock");
        return Ok(false);
    }
    let argv = vec![
        "systemd-cryptenroll".to_string(),
        format!("--tpm2-device={}", tpm2.device),
        format!("--tpm2-pcrs={}", tpm2.pcrs),
        device.to_string(),
    ];
    Ok(supervisor::exec_checked(&argv))
}

/// Result of probing for an existing LVM setup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LvmInfo {
    pub physical_volumes: Vec<String>,
    pub volume_groups: Vec<String>,
    pub logical_volumes: Vec<String>,
}

impl LvmInfo {
    pub fn is_active(&self) -> bool {
        !self.physical_volumes.is_empty() && !self.volume_groups.is_empty() && !self.logical_volumes.is_empty()
    }
}

fn parse_lvm_lines(output: &str) -> Vec<String> {
    output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

/// Detect an existing LVM setup via `pvs`/`vgs`/`lvs`.
pub fn detect_lvm() -> LvmInfo {
    LvmInfo {
        physical_volumes: parse_lvm_lines(&supervisor::exec_capture(&[
            "pvs".to_string(),
            "-o".to_string(),
            "pv_name".to_string(),
            "--noheading".to_string(),
        ])),
        volume_groups: parse_lvm_lines(&supervisor::exec_capture(&[
            "vgs".to_string(),
            "-o".to_string(),
            "vg_name".to_string(),
            "--noheading".to_string(),
        ])),
        logical_volumes: parse_lvm_lines(&supervisor::exec_capture(&[
            "lvs".to_string(),
            "-o".to_string(),
            "vg_name,lv_name".to_string(),
            "--noheading".to_string(),
            "--separator=-".to_string(),
        ])),
    }
}

/// Load the DM module, scan VGs, activate all LVs. Any step's failure
/// returns false.
pub fn activate_lvm() -> bool {
    supervisor::exec_checked(&["modprobe".to_string(), "-v".to_string(), "dm-mod".to_string()])
        && supervisor::exec_checked(&["vgscan".to_string(), "-v".to_string()])
        && supervisor::exec_checked(&["vgchange".to_string(), "-ay".to_string(), "-v".to_string()])
}

/// `{zpath, mountpoint}` — one dataset to create within a pool.
#[derive(Debug, Clone)]
pub struct ZfsDataset {
    pub zpath: String,
    pub mountpoint: String,
}

/// `{zpool_name, zpool_options, passphrase?, datasets}` (spec §3 `ZfsSetupConfig`).
#[derive(Debug, Clone)]
pub struct ZfsSetupConfig {
    pub zpool_name: String,
    pub zpool_options: String,
    pub passphrase: Option<String>,
    pub datasets: Vec<ZfsDataset>,
}

/// Create the zpool (optionally with native encryption, passphrase fed via
/// stdin), then create each dataset in order with its `mountpoint=`.
pub fn zfs_create_pool_and_datasets(config: &ZfsSetupConfig, device: &str) -> Result<()> {
    let mut argv = vec!["zpool".to_string(), "create".to_string()];
    argv.extend(config.zpool_options.split_whitespace().map(str::to_string));
    if config.passphrase.is_some() {
        argv.push("-O".to_string());
        argv.push("encryption=on".to_string());
        argv.push("-O".to_string());
        argv.push("keyformat=passphrase".to_string());
    }
    argv.push(config.zpool_name.clone());
    argv.push(device.to_string());

    let ok = match &config.passphrase {
        Some(pass) => pipe_to_stdin(&argv, pass)?,
        None => supervisor::exec_checked(&argv),
    };
    if !ok {
        return Err(InstallError::composer(format!("zpool create failed for {}", config.zpool_name)));
    }

    for dataset in &config.datasets {
        let argv = vec![
            "zfs".to_string(),
            "create".to_string(),
            "-o".to_string(),
            format!("mountpoint={}", dataset.mountpoint),
            dataset.zpath.clone(),
        ];
        if !supervisor::exec_checked(&argv) {
            return Err(InstallError::composer(format!("zfs create failed for {}", dataset.zpath)));
        }
    }
    Ok(())
}

/// After installation: set `cachefile` on the pool, copy
/// `/etc/zfs/zpool.cache` into the target root, and enable the standard
/// ZFS services.
pub fn zfs_finalize(pool_name: &str, root_mountpoint: &Path) -> Result<()> {
    let set_cachefile = vec![
        "zpool".to_string(),
        "set".to_string(),
        "cachefile=/etc/zfs/zpool.cache".to_string(),
        pool_name.to_string(),
    ];
    if !supervisor::exec_checked(&set_cachefile) {
        return Err(InstallError::composer("failed to set zpool cachefile".to_string()));
    }

    let dest_dir = root_mountpoint.join("etc/zfs");
    fs::create_dir_all(&dest_dir)?;
    fs::copy("/etc/zfs/zpool.cache", dest_dir.join("zpool.cache"))?;

    for service in ["zfs.target", "zfs-import-cache", "zfs-mount", "zfs-import.target"] {
        let argv = vec![
            "chroot".to_string(),
            root_mountpoint.display().to_string(),
            "systemctl".to_string(),
            "enable".to_string(),
            service.to_string(),
        ];
        if !supervisor::exec_checked(&argv) {
            return Err(InstallError::composer(format!("failed to enable {service}")));
        }
    }
    Ok(())
}

/// Create a nested directory path for `subvolume` under `root_mountpoint`,
/// then `btrfs subvolume create`.
pub fn btrfs_create_subvol(subvolume: &str, root_mountpoint: &Path) -> Result<()> {
    let target = root_mountpoint.join(subvolume.trim_start_matches('/'));
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let argv = vec![
        "btrfs".to_string(),
        "subvolume".to_string(),
        "create".to_string(),
        target.display().to_string(),
    ];
    if !supervisor::exec_checked(&argv) {
        return Err(InstallError::composer(format!("btrfs subvolume create failed for {subvolume}")));
    }
    Ok(())
}

/// Create all subvolumes, unmount the base device, then re-mount each at
/// its own mountpoint with `subvol=<name>,<mount_opts>`.
pub fn btrfs_create_subvols(
    subvols: &[crate::partition::BtrfsSubvolume],
    device: &str,
    root_mountpoint: &Path,
    mount_opts: &str,
) -> Result<()> {
    for sub in subvols {
        btrfs_create_subvol(&sub.subvolume, root_mountpoint)?;
    }

    let umount = vec!["umount".to_string(), root_mountpoint.display().to_string()];
    if !supervisor::exec_checked(&umount) {
        return Err(InstallError::composer("failed to unmount base btrfs volume".to_string()));
    }

    for sub in subvols {
        let dir = root_mountpoint.join(sub.mountpoint.trim_start_matches('/'));
        let opts = format!("subvol={},{}", sub.subvolume, mount_opts);
        mount_partition(device, &dir, &opts)?;
    }
    Ok(())
}

/// `mkfs`/`mkswap` a single partition according to its planned filesystem.
/// `Zfs` partitions are skipped here; the ZFS composer owns pool creation.
pub fn format_partition(part: &crate::partition::Partition) -> Result<()> {
    use crate::types::Filesystem;

    let argv: Vec<String> = match part.fstype {
        Filesystem::Ext4 => vec!["mkfs.ext4".to_string(), "-F".to_string(), part.device.clone()],
        Filesystem::Xfs => vec!["mkfs.xfs".to_string(), "-f".to_string(), part.device.clone()],
        Filesystem::Btrfs => vec!["mkfs.btrfs".to_string(), "-f".to_string(), part.device.clone()],
        Filesystem::F2fs => vec!["mkfs.f2fs".to_string(), "-f".to_string(), part.device.clone()],
        Filesystem::Vfat => vec!["mkfs.fat".to_string(), "-F32".to_string(), part.device.clone()],
        Filesystem::LinuxSwap => vec!["mkswap".to_string(), part.device.clone()],
        Filesystem::Zfs | Filesystem::Unknown => return Ok(()),
    };

    if !supervisor::exec_checked(&argv) {
        return Err(InstallError::partitioning(format!("{} failed on {}", argv[0], part.device)));
    }
    Ok(())
}

/// Mount `device` at `dir` with `mount_opts`, creating `dir` if missing.
pub fn mount_partition(device: &str, dir: &Path, mount_opts: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    let argv = vec![
        "mount".to_string(),
        "-o".to_string(),
        mount_opts.to_string(),
        device.to_string(),
        dir.display().to_string(),
    ];
    let code = supervisor::exec(&argv, &ExecOpts::default()).map_err(|e| InstallError::composer(e.to_string()))?;
    if code != 0 {
        return Err(InstallError::composer(format!("mount failed for {device} at {}", dir.display())));
    }
    Ok(())
}

/// Parse `/etc/mtab`-style lines, select entries under `root_mountpoint`,
/// sort by mountpoint lexicographically descending (deeper first), unmount
/// each, then export each zpool. Any failure aborts.
pub fn umount_partitions(root_mountpoint: &Path, zpool_names: &[String]) -> Result<()> {
    let mtab = fs::read_to_string("/etc/mtab").unwrap_or_default();
    let root_str = root_mountpoint.display().to_string();

    let mut mountpoints: Vec<String> = mtab
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mountpoint = fields.next()?;
            if mountpoint.starts_with(&root_str) {
                Some(mountpoint.to_string())
            } else {
                None
            }
        })
        .collect();
    mountpoints.sort();
    mountpoints.reverse();

    for mountpoint in mountpoints {
        let argv = vec!["umount".to_string(), mountpoint.clone()];
        if !supervisor::exec_checked(&argv) {
            return Err(InstallError::composer(format!("failed to unmount {mountpoint}")));
        }
    }

    for pool in zpool_names {
        let argv = vec!["zpool".to_string(), "export".to_string(), pool.clone()];
        if !supervisor::exec_checked(&argv) {
            return Err(InstallError::composer(format!("failed to export zpool {pool}")));
        }
    }
    Ok(())
}
