//! Type-safe enumerations shared across the installer core.
//!
//! Per the design notes: dynamic string lookups are replaced with exhaustive
//! enums that drive exhaustive `match` at every use site, instead of a
//! map-of-variants keyed by name.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Boot firmware mode the target (or the live environment) is running under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum BootFirmware {
    #[default]
    #[strum(serialize = "BIOS")]
    Bios,
    #[strum(serialize = "UEFI")]
    Uefi,
}

impl BootFirmware {
    pub fn is_efi(self) -> bool {
        matches!(self, Self::Uefi)
    }
}

/// Filesystem type for a partition or subvolume.
///
/// `fat16`/`fat32` normalize to `Vfat` at parse time (see
/// [`Filesystem::normalize`]); `Swap` is the fstab spelling of `linuxswap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Filesystem {
    #[default]
    Ext4,
    Xfs,
    Btrfs,
    F2fs,
    Vfat,
    #[strum(serialize = "linuxswap")]
    LinuxSwap,
    Zfs,
    Unknown,
}

impl Filesystem {
    /// Normalize a raw filesystem-name string as reported by block-device
    /// probes: `fat16`/`fat32` collapse to `vfat`.
    pub fn normalize(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "fat16" | "fat32" | "vfat" => Self::Vfat,
            "ext4" => Self::Ext4,
            "xfs" => Self::Xfs,
            "btrfs" => Self::Btrfs,
            "f2fs" => Self::F2fs,
            "linuxswap" | "swap" => Self::LinuxSwap,
            "zfs_member" | "zfs" => Self::Zfs,
            _ => Self::Unknown,
        }
    }

    /// Spelling used when this filesystem is emitted into `/etc/fstab`'s
    /// third column (`linuxswap` → `swap`).
    pub fn fstab_name(self) -> &'static str {
        match self {
            Self::LinuxSwap => "swap",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::F2fs => "f2fs",
            Self::Vfat => "vfat",
            Self::Zfs => "zfs",
            Self::Unknown => "auto",
        }
    }

    /// Default mount options for this filesystem, optionally tuned for a
    /// non-rotational (SSD/NVMe) backing disk.
    pub fn default_mount_opts(self, is_ssd: bool) -> &'static str {
        match self {
            Self::Btrfs if is_ssd => "defaults,noatime,compress=zstd:1",
            Self::Btrfs => "defaults,noatime,compress=zstd:1",
            Self::Ext4 => "defaults,noatime",
            Self::Xfs => "defaults,lazytime,noatime,inode64,logbsize=256k,noquota",
            Self::Vfat => "defaults,umask=0077",
            Self::F2fs if is_ssd => "defaults,noatime,compress_algorithm=zstd",
            Self::F2fs => "defaults,noatime",
            _ => "defaults",
        }
    }
}

/// Transport/bus a disk is attached through, as reported by the block-device
/// probe's `tran` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum DiskTransport {
    Sata,
    Nvme,
    Usb,
    Scsi,
    Virtio,
    #[default]
    Unknown,
}

impl DiskTransport {
    pub fn from_probe_str(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "sata" | "ata" => Self::Sata,
            "nvme" => Self::Nvme,
            "usb" => Self::Usb,
            "scsi" | "sas" => Self::Scsi,
            "virtio" => Self::Virtio,
            _ => Self::Unknown,
        }
    }
}

/// Storage layering kind applied over a partition (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum StorageType {
    #[default]
    Plain,
    Luks,
    Lvm,
    LuksLvm,
    Zfs,
    BtrfsSubvolume,
}

/// LUKS on-disk format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum LuksVersion {
    Luks1,
    #[default]
    Luks2,
}

impl LuksVersion {
    /// Value passed to `cryptsetup luksFormat --type`.
    pub fn cryptsetup_type(self) -> &'static str {
        match self {
            Self::Luks1 => "luks1",
            Self::Luks2 => "luks2",
        }
    }
}

/// Entry kind in the declarative JSON config's `partitions` list (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionType {
    #[default]
    Root,
    Boot,
    Additional,
}

/// Supported bootloader backends (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Bootloader {
    #[default]
    Grub,
    #[strum(serialize = "systemd-boot")]
    SystemdBoot,
    Refind,
    Limine,
}

impl Bootloader {
    /// Returns true if this bootloader requires UEFI firmware.
    pub fn requires_uefi(self) -> bool {
        matches!(self, Self::SystemdBoot | Self::Limine | Self::Refind)
    }
}

/// Generic Yes/No toggle for boolean-like configuration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Toggle {
    #[default]
    Yes,
    No,
}

impl Toggle {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

/// Display managers the system configurator knows how to wire autologin
/// into (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum DisplayManager {
    Gdm,
    Lightdm,
    #[default]
    Sddm,
    Lxdm,
}
