//! Installation pipeline core — binary entry point.
//!
//! Loads `settings.json`, builds a validated `PartitionScheme`, and drives
//! the pipeline stages (storage composer → system configurator → bootloader
//! generator) in dependency order. `anyhow::Result` is used here at the
//! binary boundary; the library crate's own API returns `rollforge::error::Result`.

mod bootloader;
mod blockdev;
mod cli;
mod config_file;
mod configurator;
mod error;
mod initcpio;
mod partition;
mod process_guard;
mod session;
mod storage;
mod supervisor;
mod types;

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config_file::{InstallerConfig, PartitionEntry};
use crate::partition::{DefaultPartitionSchemaConfig, Partition, PartitionScheme};
use crate::session::SessionState;
use crate::types::{Bootloader, DisplayManager, Filesystem};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn detect_firmware_is_efi() -> bool {
    Path::new("/sys/firmware/efi").exists()
}

/// Device path for the `index`'th (1-based) partition of `disk`.
fn nth_partition_device(disk: &str, index: usize) -> String {
    if disk.contains("nvme") {
        format!("{disk}p{index}")
    } else {
        format!("{disk}{index}")
    }
}

fn entry_type_mountpoint_key(entry: &PartitionEntry) -> (bool, String) {
    (entry.size.trim().is_empty(), entry.mountpoint.clone())
}

/// Build the declarative scheme from `config.partitions`, deriving device
/// paths by the spec's numbering rule (size descending, grow-to-fill last).
fn scheme_from_explicit_partitions(
    config: &InstallerConfig,
    device: &str,
    is_efi: bool,
) -> anyhow::Result<PartitionScheme> {
    let mut ordered: Vec<&PartitionEntry> = config.partitions.iter().collect();
    ordered.sort_by(|a, b| entry_type_mountpoint_key(a).cmp(&entry_type_mountpoint_key(b)));

    let mut partitions = Vec::with_capacity(ordered.len());
    for (index, entry) in ordered.into_iter().enumerate() {
        let fs_name = config
            .effective_fs_name(entry)
            .with_context(|| format!("partition '{}' has no resolvable fs_name", entry.name))?;
        let fstype = Filesystem::from_str(fs_name)
            .unwrap_or_else(|_| Filesystem::normalize(fs_name));
        let mountpoint = entry.mountpoint.clone();
        let mount_opts = config
            .mount_opts
            .clone()
            .unwrap_or_else(|| fstype.default_mount_opts(true).to_string());

        partitions.push(Partition {
            device: nth_partition_device(device, index + 1),
            fstype,
            mountpoint,
            mount_opts,
            size: entry.size.clone(),
            ..Default::default()
        });
    }

    Ok(PartitionScheme { device: device.to_string(), is_efi, partitions })
}

fn build_scheme(config: &InstallerConfig, is_efi: bool) -> anyhow::Result<PartitionScheme> {
    let device = config.device.as_deref().context("'device' is required to build a partition scheme")?;

    if config.partitions.is_empty() {
        let root_fs_type = config
            .fs_name
            .as_deref()
            .map(|name| Filesystem::from_str(name).unwrap_or_else(|_| Filesystem::normalize(name)))
            .unwrap_or_default();
        let is_ssd = blockdev::is_device_ssd(device);
        let schema_config = DefaultPartitionSchemaConfig {
            root_fs_type,
            is_ssd,
            root_mount_opts: config.mount_opts.clone(),
            ..Default::default()
        };
        Ok(partition::generate_default_partition_schema(device, &schema_config, is_efi))
    } else {
        scheme_from_explicit_partitions(config, device, is_efi)
    }
}

fn run_validate(config_path: &Path) -> anyhow::Result<()> {
    let config = InstallerConfig::load_from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.validate().context("configuration is invalid")?;
    println!("configuration is valid: {}", config_path.display());
    Ok(())
}

fn configure_system_stage(
    config: &InstallerConfig,
    scheme: &PartitionScheme,
    session: &SessionState,
) -> anyhow::Result<()> {
    let root = session.target_mountpoint();
    let log = session.install_log_path();

    configurator::generate_fstab(&scheme.partitions, root)?;
    configurator::generate_crypttab(&scheme.partitions, root, "")?;
    configurator::regenerate_initrds(root, log)?;

    if let Some(locale) = &config.locale {
        configurator::set_locale(locale, root, log)?;
    }
    if let Some(hostname) = &config.hostname {
        configurator::set_hostname(hostname, root)?;
    }
    if let Some(timezone) = &config.timezone {
        configurator::set_timezone(timezone, root)?;
    }
    configurator::set_hwclock(true, root, log)?;
    if let Some(xkbmap) = &config.xkbmap {
        configurator::set_xkbmap(xkbmap, root)?;
    }

    if let Some(root_pass) = &config.root_pass {
        configurator::set_root_password(root_pass, root, log)?;
    }
    if let (Some(user_name), Some(user_pass)) = (&config.user_name, &config.user_pass) {
        let user_info = configurator::UserInfo {
            username: user_name.clone(),
            password: user_pass.clone(),
            shell: config.user_shell.clone().unwrap_or_else(|| "/bin/bash".to_string()),
            sudoers_group: "wheel".to_string(),
        };
        configurator::create_new_user(&user_info, &["wheel".to_string()], root, log)?;
    }
    if let Some(desktop) = &config.desktop {
        if let Ok(dm) = DisplayManager::from_str(desktop) {
            configurator::enable_systemd_service(&format!("{dm}"), root, log)?;
        }
    }

    Ok(())
}

fn bootloader_stage(
    config: &InstallerConfig,
    scheme: &PartitionScheme,
    session: &SessionState,
) -> anyhow::Result<()> {
    let bootloader = config
        .bootloader
        .as_deref()
        .map(Bootloader::from_str)
        .transpose()
        .context("unrecognized bootloader")?
        .unwrap_or_default();

    if bootloader.requires_uefi() && !session.firmware_mode().is_efi() {
        bail!("{bootloader} requires UEFI firmware");
    }

    let root_partition = scheme.partitions.iter().find(|p| p.is_root()).context("scheme has no root partition")?;
    let root_device_spec = if let Some(mapper) = &root_partition.luks_mapper_name {
        format!("/dev/mapper/{mapper}")
    } else if let Some(uuid) = &root_partition.uuid {
        format!("UUID={uuid}")
    } else {
        root_partition.device.clone()
    };

    let kernel_params = configurator::get_kernel_params(scheme, "", None)?;
    let extra_kernel_versions = vec![config.kernel.clone().unwrap_or_else(|| "linux".to_string())];
    let bootloader_config =
        session.bootloader_config(kernel_params, extra_kernel_versions, root_device_spec, None, None, None);

    let root = session.target_mountpoint();
    let log = session.install_log_path();
    let lvm_active = storage::detect_lvm().is_active();

    match bootloader {
        Bootloader::Grub => {
            let grub_config = bootloader::build_grub_config(scheme, &bootloader_config, lvm_active);
            let is_efi = session.firmware_mode().is_efi();
            bootloader::install_grub(&grub_config, is_efi, "/boot/efi", "rollforge", &scheme.device, false, root, log)?;
        }
        Bootloader::SystemdBoot => {
            bootloader::install_systemd_boot(root, "/boot/efi", false, log)?;
        }
        Bootloader::Refind => {
            bootloader::install_refind(root, &bootloader_config.kernel_params, &bootloader_config.extra_kernel_versions, log)?;
        }
        Bootloader::Limine => {
            let root_is_btrfs = root_partition.fstype == Filesystem::Btrfs;
            bootloader::install_limine(root, &bootloader_config.kernel_params, root_is_btrfs, log)?;
        }
    }

    Ok(())
}

fn run_install(config_path: &Path) -> anyhow::Result<()> {
    let config = InstallerConfig::load_from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.validate().context("configuration is invalid")?;
    info!("loaded configuration from {}", config_path.display());

    let is_efi = detect_firmware_is_efi();
    let mut scheme = build_scheme(&config, is_efi)?;
    let validation = partition::validate(&scheme);
    for warning in &validation.warnings {
        warn!("{warning}");
    }
    if !validation.is_valid {
        bail!("invalid partition scheme: {}", validation.errors.join("; "));
    }

    info!("partition planner: partitioning {}", scheme.device);
    partition::make_clean_partschema(&scheme)?;

    info!("storage layer composer: formatting partitions");
    for part in &scheme.partitions {
        storage::format_partition(part)?;
    }
    partition::refresh_uuids(&mut scheme);

    let mut session = SessionState::new();
    session.set_headless(config.headless_mode);
    session.set_firmware_mode(if is_efi { crate::types::BootFirmware::Uefi } else { crate::types::BootFirmware::Bios });
    if let Some(bootloader) = &config.bootloader {
        session.set_bootloader(Bootloader::from_str(bootloader).unwrap_or_default());
    }
    session.set_partition_scheme(scheme.clone());
    if let Some(kernel) = &config.kernel {
        session.set_resolved_kernel(kernel.clone());
    }
    if let Some(desktop) = &config.desktop {
        session.set_desktop_profile(desktop.clone());
    }
    if let Some(swap) = scheme.partitions.iter().find(|p| p.is_swap()) {
        session.set_swap_device(swap.device.clone());
    }

    info!("storage layer composer: mounting partition scheme");
    let root = session.target_mountpoint().to_path_buf();
    let mut mountable: Vec<&Partition> = scheme.partitions.iter().filter(|p| !p.is_swap() && p.fstype != Filesystem::Zfs).collect();
    mountable.sort_by_key(|p| p.mountpoint.matches('/').count());
    for part in mountable {
        let target = root.join(part.mountpoint.trim_start_matches('/'));
        storage::mount_partition(&part.device, &target, &part.mount_opts)?;
    }

    info!("system configurator: provisioning target root");
    configure_system_stage(&config, &scheme, &session)?;

    info!("bootloader generator: installing {}", session.bootloader());
    bootloader_stage(&config, &scheme, &session)?;

    if let Some(post_install) = &config.post_install {
        info!("running post-install script: {post_install}");
        supervisor::chroot_exec(&[post_install.clone()], &root, session.install_log_path(), false)?;
    }

    println!("installation complete");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("failed to install signal handlers for child cleanup: {e}");
    }

    let cli = Cli::parse_args();
    if cli.dry_run {
        unsafe {
            std::env::set_var("DIRTY_CMD_RUN", "1");
        }
        info!("dry-run mode: commands will be logged, not executed");
    }

    match cli.command {
        Commands::Validate { config } => run_validate(&config),
        Commands::Install { config } => run_install(&config),
    }
}
