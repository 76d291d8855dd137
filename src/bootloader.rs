//! Bootloader Generator (spec §4.6).
//!
//! Synthesizes per-bootloader configuration from a [`BootloaderConfig`]
//! derived from the final [`PartitionScheme`], then invokes the installer
//! for the selected bootloader.
//!
//! Grounded on `gucc`'s `bootloader.cpp` (the `GRUB_DEFAULT_CONFIG`
//! template and its uncomment-then-substitute rendering, and
//! `install_systemd_boot`'s autodetect-hook removal for removable disks)
//! and the `unit-limine_config_gen.cpp`/`unit-refind_config_gen.cpp`
//! fixtures (exact `KERNEL_CMDLINE[default]=` and two-entry rEFInd
//! formats).

use std::fs;
use std::path::Path;

use crate::error::{InstallError, Result};
use crate::initcpio::InitcpioConfig;
use crate::partition::PartitionScheme;
use crate::supervisor;
use crate::types::Filesystem;

/// Bootloader-agnostic view consumed by the generator (spec §3).
#[derive(Debug, Clone, Default)]
pub struct BootloaderConfig {
    pub kernel_params: Vec<String>,
    pub extra_kernel_versions: Vec<String>,
    pub root_device_spec: String,
    pub resume_device_spec: Option<String>,
    pub cryptdevice_spec: Option<String>,
    pub rootflags: Option<String>,
}

const GRUB_DEFAULT_TEMPLATE: &str = r#"# GRUB boot loader configuration

GRUB_DEFAULT=0
GRUB_TIMEOUT=5
GRUB_DISTRIBUTOR="Arch"
GRUB_CMDLINE_LINUX_DEFAULT="loglevel=3 quiet"
GRUB_CMDLINE_LINUX=""

# Preload both GPT and MBR modules so that they are not missed
GRUB_PRELOAD_MODULES="part_gpt part_msdos"

# Uncomment to enable booting from LUKS encrypted devices
#GRUB_ENABLE_CRYPTODISK=y

# Set to 'countdown' or 'hidden' to change timeout behavior,
# press ESC key to display menu.
GRUB_TIMEOUT_STYLE=menu

# Uncomment to use basic console
GRUB_TERMINAL_INPUT=console

# Uncomment to disable graphical terminal
#GRUB_TERMINAL_OUTPUT=console

# The resolution used on graphical terminal
# note that you can use only modes which your graphic card supports via VBE
# you can see them in real GRUB with the command `videoinfo'
GRUB_GFXMODE=auto

# Uncomment to allow the kernel use the same resolution used by grub
GRUB_GFXPAYLOAD_LINUX=keep

# Uncomment if you want GRUB to pass to the Linux kernel the old parameter
# format "root=/dev/xxx" instead of "root=/dev/disk/by-uuid/xxx"
#GRUB_DISABLE_LINUX_UUID=true

# Uncomment to disable generation of recovery mode menu entries
GRUB_DISABLE_RECOVERY=true

# Uncomment and set to the desired menu colors.  Used by normal and wallpaper
# modes only.  Entries specified as foreground/background.
#GRUB_COLOR_NORMAL="light-blue/black"
#GRUB_COLOR_HIGHLIGHT="light-cyan/blue"

# Uncomment one of them for the gfx desired, a image background or a gfxtheme
#GRUB_BACKGROUND="/path/to/wallpaper"
#GRUB_THEME="/path/to/gfxtheme"

# Uncomment to get a beep at GRUB start
#GRUB_INIT_TUNE="480 440 1"

# Uncomment to make GRUB remember the last selection. This requires
# setting 'GRUB_DEFAULT=saved' above.
#GRUB_SAVEDEFAULT=true

# Uncomment to disable submenus in boot menu
#GRUB_DISABLE_SUBMENU=y

# Probing for other operating systems is disabled for security reasons. Read
# documentation on GRUB_DISABLE_OS_PROBER, if still want to enable this
# functionality install os-prober and uncomment to detect and include other
# operating systems.
#GRUB_DISABLE_OS_PROBER=false
"#;

/// All the tunable fields that appear in `/etc/default/grub`.
#[derive(Debug, Clone)]
pub struct GrubConfig {
    pub default_entry: String,
    pub grub_timeout: i32,
    pub grub_distributor: String,
    pub cmdline_linux_default: String,
    pub cmdline_linux: String,
    pub preload_modules: String,
    pub timeout_style: String,
    pub terminal_input: String,
    pub gfxmode: String,
    pub gfxpayload_linux: String,
    pub disable_recovery: bool,
    pub terminal_output: Option<String>,
    pub enable_cryptodisk: Option<bool>,
    pub disable_linux_uuid: Option<bool>,
    pub color_normal: Option<String>,
    pub color_highlight: Option<String>,
    pub background: Option<String>,
    pub theme: Option<String>,
    pub init_tune: Option<String>,
    pub savedefault: Option<bool>,
    pub disable_submenu: Option<bool>,
    pub disable_os_prober: Option<bool>,
}

impl Default for GrubConfig {
    fn default() -> Self {
        Self {
            default_entry: "0".to_string(),
            grub_timeout: 5,
            grub_distributor: "Arch".to_string(),
            cmdline_linux_default: "loglevel=3 quiet".to_string(),
            cmdline_linux: String::new(),
            preload_modules: "part_gpt part_msdos".to_string(),
            timeout_style: "menu".to_string(),
            terminal_input: "console".to_string(),
            gfxmode: "auto".to_string(),
            gfxpayload_linux: "keep".to_string(),
            disable_recovery: true,
            terminal_output: None,
            enable_cryptodisk: None,
            disable_linux_uuid: None,
            color_normal: None,
            color_highlight: None,
            background: None,
            theme: None,
            init_tune: None,
            savedefault: None,
            disable_submenu: None,
            disable_os_prober: None,
        }
    }
}

fn bool_str(needle: &str, value: bool) -> &'static str {
    if needle == "GRUB_ENABLE_CRYPTODISK=" || needle == "GRUB_DISABLE_SUBMENU=" {
        if value { "y" } else { "n" }
    } else if value {
        "true"
    } else {
        "false"
    }
}

fn render_grub_line(config: &GrubConfig, line: &str) -> String {
    let uncommented;
    let working: &str = if let Some(rest) = line.strip_prefix("#GRUB_") {
        uncommented = format!("GRUB_{rest}");
        &uncommented
    } else {
        line
    };

    if !working.starts_with("GRUB_") {
        return working.to_string();
    }

    macro_rules! req_f {
        ($needle:literal, $value:expr) => {
            if working.starts_with($needle) {
                return format!(concat!($needle, "{}"), $value);
            }
        };
    }
    macro_rules! req_f_s {
        ($needle:literal, $value:expr) => {
            if working.starts_with($needle) {
                return format!(concat!($needle, "\"{}\""), $value);
            }
        };
    }
    macro_rules! opt_f_s {
        ($needle:literal, $value:expr, $default:literal) => {
            if working.starts_with($needle) {
                return match &$value {
                    Some(v) => format!(concat!($needle, "\"{}\""), v),
                    None => concat!("#", $needle, "\"", $default, "\"").to_string(),
                };
            }
        };
    }
    macro_rules! req_b {
        ($needle:literal, $value:expr) => {
            if working.starts_with($needle) {
                return format!(concat!($needle, "{}"), bool_str($needle, $value));
            }
        };
    }
    macro_rules! opt_b {
        ($needle:literal, $value:expr, $default:literal) => {
            if working.starts_with($needle) {
                return match $value {
                    Some(v) => format!(concat!($needle, "{}"), bool_str($needle, v)),
                    None => concat!("#", $needle, $default).to_string(),
                };
            }
        };
    }

    req_f!("GRUB_DEFAULT=", config.default_entry);
    req_f!("GRUB_TIMEOUT=", config.grub_timeout);
    req_f_s!("GRUB_DISTRIBUTOR=", config.grub_distributor);
    req_f_s!("GRUB_CMDLINE_LINUX_DEFAULT=", config.cmdline_linux_default);
    req_f_s!("GRUB_CMDLINE_LINUX=", config.cmdline_linux);
    req_f_s!("GRUB_PRELOAD_MODULES=", config.preload_modules);
    req_f!("GRUB_TIMEOUT_STYLE=", config.timeout_style);
    req_f!("GRUB_TERMINAL_INPUT=", config.terminal_input);
    if working.starts_with("GRUB_TERMINAL_OUTPUT=") {
        return match &config.terminal_output {
            Some(v) => format!("GRUB_TERMINAL_OUTPUT={v}"),
            None => "#GRUB_TERMINAL_OUTPUT=console".to_string(),
        };
    }
    req_f!("GRUB_GFXMODE=", config.gfxmode);
    req_f!("GRUB_GFXPAYLOAD_LINUX=", config.gfxpayload_linux);
    opt_f_s!("GRUB_COLOR_NORMAL=", config.color_normal, "light-blue/black");
    opt_f_s!("GRUB_COLOR_HIGHLIGHT=", config.color_highlight, "light-cyan/blue");
    opt_f_s!("GRUB_BACKGROUND=", config.background, "/path/to/wallpaper");
    opt_f_s!("GRUB_THEME=", config.theme, "/path/to/gfxtheme");
    opt_f_s!("GRUB_INIT_TUNE=", config.init_tune, "480 440 1");
    opt_b!("GRUB_ENABLE_CRYPTODISK=", config.enable_cryptodisk, "y");
    opt_b!("GRUB_DISABLE_LINUX_UUID=", config.disable_linux_uuid, "true");
    req_b!("GRUB_DISABLE_RECOVERY=", config.disable_recovery);
    opt_b!("GRUB_SAVEDEFAULT=", config.savedefault, "true");
    opt_b!("GRUB_DISABLE_SUBMENU=", config.disable_submenu, "y");
    opt_b!("GRUB_DISABLE_OS_PROBER=", config.disable_os_prober, "false");

    working.to_string()
}

/// Render `/etc/default/grub` content from `config`.
pub fn gen_grub_config(config: &GrubConfig) -> String {
    let rendered: Vec<String> =
        GRUB_DEFAULT_TEMPLATE.lines().map(|line| render_grub_line(config, line)).collect();
    rendered.join("\n") + "\n"
}

/// Derive the `GrubConfig` adjustments implied by the final scheme: drop
/// `SAVEDEFAULT` on sparse filesystems (btrfs/zfs) or LVM, enable
/// cryptodisk and prepend `cryptdevice=` when root or `/boot` is LUKS,
/// and fold in the ZFS root cmdline token.
pub fn build_grub_config(scheme: &PartitionScheme, bootloader_config: &BootloaderConfig, lvm_active: bool) -> GrubConfig {
    let mut config = GrubConfig::default();
    let root = scheme.partitions.iter().find(|p| p.is_root());
    let root_is_btrfs = root.is_some_and(|p| p.fstype == Filesystem::Btrfs);
    let root_is_zfs = root.is_some_and(|p| p.fstype == Filesystem::Zfs);
    let root_is_luks = root.is_some_and(|p| p.is_luks());
    let boot_is_luks = scheme.partitions.iter().any(|p| p.mountpoint == "/boot" && p.is_luks());

    if root_is_luks || boot_is_luks {
        config.enable_cryptodisk = Some(true);
    }
    if let Some(cryptdevice) = &bootloader_config.cryptdevice_spec {
        config.cmdline_linux = format!("{cryptdevice} {}", config.cmdline_linux).trim().to_string();
    }
    if root_is_btrfs || root_is_zfs || lvm_active {
        config.savedefault = None;
    }
    if root_is_zfs {
        let dataset = bootloader_config.root_device_spec.trim_start_matches("ZFS=");
        let zfs_token = format!("zfs={dataset} rw");
        config.cmdline_linux_default = format!("{} {zfs_token}", config.cmdline_linux_default).trim().to_string();
        config.cmdline_linux = format!("{} {zfs_token}", config.cmdline_linux).trim().to_string();
    }
    config
}

/// Append `ZPOOL_VDEV_NAME_PATH=YES` to `/etc/environment` (needed so GRUB
/// can find a ZFS root's underlying device).
pub fn write_zfs_environment(root_mountpoint: &Path) -> Result<()> {
    let path = root_mountpoint.join("etc/environment");
    let mut content = fs::read_to_string(&path).unwrap_or_default();
    if !content.contains("ZPOOL_VDEV_NAME_PATH") {
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str("ZPOOL_VDEV_NAME_PATH=YES\n");
    }
    fs::write(path, content).map_err(InstallError::from)
}

/// Render `limine.conf`'s `KERNEL_CMDLINE[default]=` entry.
pub fn gen_limine_config(kernel_params: &[String]) -> String {
    format!("KERNEL_CMDLINE[default]=\"{}\"\n", kernel_params.join(" "))
}

/// Render `refind_linux.conf`'s two stanzas (standard boot, single-user).
pub fn gen_refind_config(kernel_params: &[String]) -> String {
    let joined = kernel_params.join(" ");
    format!(
        "\"Boot with standard options\"    \"{joined}\"\n\"Boot to single-user mode\"    \"{joined}\" single\n"
    )
}

fn chroot_ok(argv: &[&str], root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
    let ok = supervisor::chroot_exec(&argv, root_mountpoint, install_log, false)
        .map_err(|e| InstallError::bootloader(e.to_string()))?;
    if !ok {
        return Err(InstallError::bootloader(format!("command failed: {}", argv.join(" "))));
    }
    Ok(())
}

/// Write `/etc/default/grub`, run `grub-install`, then `grub-mkconfig`.
pub fn install_grub(
    config: &GrubConfig,
    is_efi: bool,
    efi_directory: &str,
    bootloader_id: &str,
    device: &str,
    is_removable: bool,
    root_mountpoint: &Path,
    install_log: &Path,
) -> Result<()> {
    fs::write(root_mountpoint.join("etc/default/grub"), gen_grub_config(config))?;

    if is_efi {
        let mut argv = vec![
            "grub-install".to_string(),
            "--target=x86_64-efi".to_string(),
            format!("--efi-directory={efi_directory}"),
            format!("--bootloader-id={bootloader_id}"),
        ];
        if is_removable {
            argv.push("--removable".to_string());
        }
        let ok = supervisor::chroot_exec(&argv, root_mountpoint, install_log, false)
            .map_err(|e| InstallError::bootloader(e.to_string()))?;
        if !ok {
            return Err(InstallError::bootloader("grub-install failed"));
        }
    } else {
        chroot_ok(&["grub-install", "--target=i386-pc", device], root_mountpoint, install_log)?;
    }

    chroot_ok(&["grub-mkconfig", "-o", "/boot/grub/grub.cfg"], root_mountpoint, install_log)
}

/// `bootctl --path=<esp> install`, then remove the `autodetect` hook from
/// `mkinitcpio.conf` when the target disk is removable (a portable
/// initrd can't rely on hardware autodetection at boot).
pub fn install_systemd_boot(root_mountpoint: &Path, efi_directory: &str, is_removable: bool, install_log: &Path) -> Result<()> {
    chroot_ok(&["bootctl", &format!("--path={efi_directory}"), "install"], root_mountpoint, install_log)?;

    if is_removable {
        let initcpio_path = root_mountpoint.join("etc/mkinitcpio.conf");
        let mut initcpio = InitcpioConfig::parse_file(&initcpio_path)?;
        initcpio.remove_hook("autodetect");
        initcpio.write(&initcpio_path)?;
    }
    Ok(())
}

/// Write a systemd-boot loader entry for one kernel image.
pub fn write_systemd_boot_entry(
    efi_directory: &Path,
    entry_name: &str,
    title: &str,
    linux_path: &str,
    initrd_path: &str,
    kernel_params: &[String],
) -> Result<()> {
    let entries_dir = efi_directory.join("loader/entries");
    fs::create_dir_all(&entries_dir)?;
    let content = format!(
        "title   {title}\nlinux   {linux_path}\ninitrd  {initrd_path}\noptions {}\n",
        kernel_params.join(" ")
    );
    fs::write(entries_dir.join(format!("{entry_name}.conf")), content).map_err(InstallError::from)
}

/// `refind-install`, then write `refind_linux.conf` with the two standard
/// stanzas and (if any) an `extra_kernel_version_strings` line.
pub fn install_refind(
    root_mountpoint: &Path,
    kernel_params: &[String],
    extra_kernel_versions: &[String],
    install_log: &Path,
) -> Result<()> {
    chroot_ok(&["refind-install"], root_mountpoint, install_log)?;

    let mut content = gen_refind_config(kernel_params);
    if !extra_kernel_versions.is_empty() {
        content.push_str(&format!("extra_kernel_version_strings {}\n", extra_kernel_versions.join(",")));
    }
    fs::write(root_mountpoint.join("boot/refind_linux.conf"), content).map_err(InstallError::from)
}

/// Install limine's EFI binary, write `limine.conf`, and enable
/// `limine-snapper-sync` when root is on btrfs.
pub fn install_limine(
    root_mountpoint: &Path,
    kernel_params: &[String],
    root_is_btrfs: bool,
    install_log: &Path,
) -> Result<()> {
    chroot_ok(&["limine-install"], root_mountpoint, install_log)?;
    fs::write(root_mountpoint.join("boot/limine.conf"), gen_limine_config(kernel_params))?;

    if root_is_btrfs {
        crate::configurator::enable_systemd_service("limine-snapper-sync", root_mountpoint, install_log)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grub_default_config_matches_template() {
        let config = GrubConfig::default();
        let rendered = gen_grub_config(&config);
        assert_eq!(rendered, GRUB_DEFAULT_TEMPLATE);
    }

    #[test]
    fn grub_optionals_render_uncommented() {
        let config = GrubConfig {
            default_entry: "saved".to_string(),
            grub_timeout: 10,
            grub_distributor: "CachyOS".to_string(),
            cmdline_linux_default: "nowatchdog nvme_load=YES zswap.enabled=0 splash quiet".to_string(),
            cmdline_linux: "quiet".to_string(),
            preload_modules: "part_gpt part_msdos part_efi".to_string(),
            enable_cryptodisk: Some(true),
            terminal_output: Some("console".to_string()),
            disable_linux_uuid: Some(true),
            color_normal: Some("light-blue/yellow".to_string()),
            color_highlight: Some("light-cyan/yellow".to_string()),
            background: Some("/path/to/wallpaper/here".to_string()),
            theme: Some("/path/to/gfxtheme-smth".to_string()),
            init_tune: Some("380 420 2".to_string()),
            savedefault: Some(true),
            disable_submenu: Some(true),
            disable_os_prober: Some(false),
            ..GrubConfig::default()
        };
        let rendered = gen_grub_config(&config);
        assert!(rendered.contains("GRUB_DEFAULT=saved"));
        assert!(rendered.contains("GRUB_DISTRIBUTOR=\"CachyOS\""));
        assert!(rendered.contains("GRUB_ENABLE_CRYPTODISK=y"));
        assert!(rendered.contains("GRUB_DISABLE_SUBMENU=y"));
        assert!(rendered.contains("GRUB_DISABLE_OS_PROBER=false"));
        assert!(!rendered.contains("#GRUB_ENABLE_CRYPTODISK"));
    }

    #[test]
    fn limine_config_basic() {
        let params: Vec<String> = ["quiet", "splash", "rw", "root=UUID=6bdb3301-8efb-4b84-b0b7-4caeef26fd6f"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            gen_limine_config(&params),
            "KERNEL_CMDLINE[default]=\"quiet splash rw root=UUID=6bdb3301-8efb-4b84-b0b7-4caeef26fd6f\"\n"
        );
    }

    #[test]
    fn limine_config_luks_swap() {
        let params: Vec<String> = [
            "quiet",
            "splash",
            "rw",
            "cryptdevice=UUID=00e1b836-81b6-433f-83ca-0fd373e3cd50:luks_device",
            "root=/dev/mapper/luks_device",
            "resume=/dev/mapper/luks_swap_device",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            gen_limine_config(&params),
            "KERNEL_CMDLINE[default]=\"quiet splash rw cryptdevice=UUID=00e1b836-81b6-433f-83ca-0fd373e3cd50:luks_device root=/dev/mapper/luks_device resume=/dev/mapper/luks_swap_device\"\n"
        );
    }

    #[test]
    fn refind_config_has_two_entries_with_single_suffix() {
        let params: Vec<String> = ["quiet", "splash", "rw", "root=UUID=6bdb3301-8efb-4b84-b0b7-4caeef26fd6f"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rendered = gen_refind_config(&params);
        let mut lines = rendered.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"Boot with standard options\"    \"quiet splash rw root=UUID=6bdb3301-8efb-4b84-b0b7-4caeef26fd6f\""
        );
        assert_eq!(
            lines.next().unwrap(),
            "\"Boot to single-user mode\"    \"quiet splash rw root=UUID=6bdb3301-8efb-4b84-b0b7-4caeef26fd6f\" single"
        );
    }

    #[test]
    fn refind_config_zfs() {
        let params: Vec<String> = ["quiet", "splash", "rw", "root=ZFS=zpcachyos/ROOT", "root=UUID=6bdb3301-8efb-4b84-b0b7-4caeef26fd6f"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rendered = gen_refind_config(&params);
        assert!(rendered.contains("root=ZFS=zpcachyos/ROOT"));
    }

    #[test]
    fn grub_config_drops_savedefault_for_btrfs_root() {
        let mut scheme = PartitionScheme { device: "/dev/sda".to_string(), is_efi: true, partitions: vec![] };
        scheme.partitions.push(crate::partition::Partition {
            device: "/dev/sda2".to_string(),
            fstype: Filesystem::Btrfs,
            mountpoint: "/".to_string(),
            ..Default::default()
        });
        let bootloader_config = BootloaderConfig { root_device_spec: "UUID=abc".to_string(), ..Default::default() };
        let config = build_grub_config(&scheme, &bootloader_config, false);
        assert!(config.savedefault.is_none());
    }

    #[test]
    fn grub_config_enables_cryptodisk_for_luks_root() {
        let mut scheme = PartitionScheme { device: "/dev/sda".to_string(), is_efi: true, partitions: vec![] };
        scheme.partitions.push(crate::partition::Partition {
            device: "/dev/sda2".to_string(),
            fstype: Filesystem::Ext4,
            mountpoint: "/".to_string(),
            luks_mapper_name: Some("cryptroot".to_string()),
            ..Default::default()
        });
        let bootloader_config = BootloaderConfig {
            root_device_spec: "/dev/mapper/cryptroot".to_string(),
            cryptdevice_spec: Some("cryptdevice=UUID=abc:cryptroot".to_string()),
            ..Default::default()
        };
        let config = build_grub_config(&scheme, &bootloader_config, false);
        assert_eq!(config.enable_cryptodisk, Some(true));
        assert!(config.cmdline_linux.starts_with("cryptdevice=UUID=abc:cryptroot"));
    }

    #[test]
    fn grub_config_adds_zfs_cmdline_token() {
        let mut scheme = PartitionScheme { device: "/dev/sda".to_string(), is_efi: true, partitions: vec![] };
        scheme.partitions.push(crate::partition::Partition {
            device: "/dev/sda2".to_string(),
            fstype: Filesystem::Zfs,
            mountpoint: "/".to_string(),
            ..Default::default()
        });
        let bootloader_config = BootloaderConfig { root_device_spec: "ZFS=zpool/ROOT".to_string(), ..Default::default() };
        let config = build_grub_config(&scheme, &bootloader_config, false);
        assert!(config.cmdline_linux_default.contains("zfs=zpool/ROOT rw"));
    }

    #[test]
    fn zfs_environment_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        write_zfs_environment(dir.path()).unwrap();
        write_zfs_environment(dir.path()).unwrap();
        let content = fs::read_to_string(dir.path().join("etc/environment")).unwrap();
        assert_eq!(content.matches("ZPOOL_VDEV_NAME_PATH").count(), 1);
    }

    #[test]
    fn systemd_boot_entry_lists_options() {
        let dir = tempfile::tempdir().unwrap();
        let params = vec!["rw".to_string(), "root=UUID=abc".to_string()];
        write_systemd_boot_entry(dir.path(), "arch", "Arch Linux", "/vmlinuz-linux", "/initramfs-linux.img", &params).unwrap();
        let content = fs::read_to_string(dir.path().join("loader/entries/arch.conf")).unwrap();
        assert!(content.contains("options rw root=UUID=abc"));
    }
}
