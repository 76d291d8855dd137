//! System Configurator (spec §4.5).
//!
//! After mounting, populates the target root with configuration files and
//! invokes in-chroot provisioning: fstab/crypttab, kernel-parameter
//! synthesis, locale/hostname/hosts/timezone/hwclock/keymap/xkbmap,
//! accounts, and services.
//!
//! Grounded on `gucc`'s `fstab.cpp`/`crypttab.cpp`/`kernel_params.cpp`
//! (entry formatting, sort/dedup-by-device, pass-number rules) and
//! `user.cpp`/`autologin.cpp` (account creation, sudoers, per-DM
//! autologin sed rules).

use std::fs;
use std::path::Path;

use crate::error::{InstallError, Result};
use crate::partition::{Partition, PartitionScheme};
use crate::supervisor;
use crate::types::{DisplayManager, Filesystem};

const FSTAB_HEADER: &str = "# Static information about the filesystems.\n# See fstab(5) for details.\n\n# <file system> <dir> <type> <options> <dump> <pass>\n";

const CRYPTTAB_HEADER: &str = "# Configuration for encrypted block devices\n# See crypttab(5) for details.\n\n# NOTE: Do not list your root (/) partition here, it must be set up\n#       beforehand by the initramfs (/etc/mkinitcpio.conf).\n\n# <name>       <device>                                     <password>              <options>\n";

/// Sort by (device, mountpoint), then keep only the first partition per
/// device (the planner's btrfs-subvolume clones share a device; fstab and
/// crypttab only need one entry per underlying device).
fn dedup_by_device(partitions: &[Partition]) -> Vec<Partition> {
    let mut sorted: Vec<Partition> = partitions.to_vec();
    sorted.sort_by(|a, b| (&a.device, &a.mountpoint).cmp(&(&b.device, &b.mountpoint)));
    let mut seen = std::collections::HashSet::new();
    sorted.retain(|p| seen.insert(p.device.clone()));
    sorted
}

/// Same dedup-by-device as `dedup_by_device`, but ordered by (mountpoint,
/// device) per spec §4.5's crypttab ordering rule.
fn dedup_by_device_for_crypttab(partitions: &[Partition]) -> Vec<Partition> {
    let mut sorted: Vec<Partition> = partitions.to_vec();
    sorted.sort_by(|a, b| (&a.mountpoint, &a.device).cmp(&(&b.mountpoint, &b.device)));
    let mut seen = std::collections::HashSet::new();
    sorted.retain(|p| seen.insert(p.device.clone()));
    sorted
}

fn source_token(part: &Partition) -> String {
    if let Some(mapper) = &part.luks_mapper_name {
        format!("/dev/mapper/{mapper}")
    } else if let Some(uuid) = &part.uuid {
        format!("UUID={uuid}")
    } else {
        part.device.clone()
    }
}

fn fstab_pass_number(part: &Partition) -> u8 {
    if part.mountpoint == "/" && part.fstype != Filesystem::Btrfs {
        1
    } else if part.mountpoint != "/" && part.fstype != Filesystem::Btrfs && !part.is_swap() {
        2
    } else {
        0
    }
}

/// Render one `/etc/fstab` entry, or `None` for swap (skipped per spec).
fn fstab_entry(part: &Partition) -> Option<String> {
    if part.is_swap() || part.fstype == Filesystem::Zfs {
        return None;
    }
    let source = source_token(part);
    let mount_opts = match &part.subvolume {
        Some(sub) if part.fstype == Filesystem::Btrfs => format!("subvol={sub},{}", part.mount_opts),
        _ => part.mount_opts.clone(),
    };
    let pass = fstab_pass_number(part);
    Some(format!(
        "# {}\n{:41} {:<14} {:<7} {:<10} 0 {}\n\n",
        part.device, source, part.mountpoint, part.fstype, mount_opts, pass
    ))
}

/// Generate the full `/etc/fstab` content for `partitions`.
pub fn generate_fstab_content(partitions: &[Partition]) -> String {
    let mut content = FSTAB_HEADER.to_string();
    for part in dedup_by_device(partitions) {
        if let Some(entry) = fstab_entry(&part) {
            content.push_str(&entry);
        }
    }
    content
}

/// Write `/etc/fstab` into the target root.
pub fn generate_fstab(partitions: &[Partition], root_mountpoint: &Path) -> Result<()> {
    let path = root_mountpoint.join("etc/fstab");
    fs::write(path, generate_fstab_content(partitions)).map_err(InstallError::from)
}

fn crypttab_entry(part: &Partition, opts: &str, root_encrypted: bool, boot_encrypted: bool) -> Option<String> {
    let mapper = part.luks_mapper_name.as_ref()?;
    let uuid = part.luks_uuid.as_ref()?;
    if mapper.is_empty() || uuid.is_empty() {
        return None;
    }

    let (password, options) = if !root_encrypted || (part.mountpoint == "/" && !boot_encrypted) {
        ("none".to_string(), String::new())
    } else {
        ("/crypto_keyfile.bin".to_string(), format!(" {opts}"))
    };

    Some(format!("{mapper:21} {:<45} {password}{options}\n", format!("UUID={uuid}")))
}

/// Generate the full `/etc/crypttab` content for `partitions`.
pub fn generate_crypttab_content(partitions: &[Partition], crypttab_opts: &str) -> String {
    let mut content = CRYPTTAB_HEADER.to_string();
    let root_encrypted = partitions.iter().any(|p| p.mountpoint == "/" && p.is_luks());
    let boot_encrypted = partitions.iter().any(|p| p.mountpoint == "/boot" && p.is_luks());

    for part in dedup_by_device_for_crypttab(partitions) {
        if let Some(entry) = crypttab_entry(&part, crypttab_opts, root_encrypted, boot_encrypted) {
            content.push_str(&entry);
        }
    }
    content
}

/// Write `/etc/crypttab` into the target root.
pub fn generate_crypttab(partitions: &[Partition], root_mountpoint: &Path, crypttab_opts: &str) -> Result<()> {
    let path = root_mountpoint.join("etc/crypttab");
    fs::write(path, generate_crypttab_content(partitions, crypttab_opts)).map_err(InstallError::from)
}

/// Synthesize the kernel command-line tokens from the final scheme (spec
/// §4.5 "Kernel params synthesis"). `default_params` is the user-supplied
/// base string, tokenized on spaces. `zfs_root_dataset` is required when
/// root is on ZFS.
pub fn get_kernel_params(
    scheme: &PartitionScheme,
    default_params: &str,
    zfs_root_dataset: Option<&str>,
) -> Result<Vec<String>> {
    let mut params: Vec<String> = default_params.split_whitespace().map(str::to_string).collect();
    params.push("rw".to_string());

    let mut cryptdevice_params = Vec::new();
    let mut root_uuid = None;
    let mut swap_uuid = None;
    let mut swap_mapper = None;

    for part in &scheme.partitions {
        if part.is_swap() && !part.is_luks() {
            swap_uuid = part.uuid.clone();
        } else if part.is_swap() && part.is_luks() {
            swap_mapper = part.luks_mapper_name.clone();
        }

        if part.is_root() && part.is_luks() {
            cryptdevice_params.push(format!(
                "cryptdevice=UUID={}:{}",
                part.luks_uuid.as_deref().unwrap_or_default(),
                part.luks_mapper_name.as_deref().unwrap_or_default()
            ));
            cryptdevice_params.push(format!("root=/dev/mapper/{}", part.luks_mapper_name.as_deref().unwrap_or_default()));
        }

        if part.is_root() {
            root_uuid = part.uuid.clone();
        }

        if part.is_root() && part.fstype == Filesystem::Btrfs {
            if let Some(sub) = &part.subvolume {
                params.push(format!("rootflags=subvol={sub}"));
            }
        } else if part.is_root() && part.fstype == Filesystem::Zfs {
            let dataset = zfs_root_dataset
                .ok_or_else(|| InstallError::config_write("root zfs dataset cannot be empty"))?;
            params.push(format!("root=ZFS={dataset}"));
        }
    }

    let root_uuid = root_uuid.ok_or_else(|| InstallError::config_write("no root partition UUID found"))?;
    if !cryptdevice_params.is_empty() {
        params.extend(cryptdevice_params);
    } else {
        params.push(format!("root=UUID={root_uuid}"));
    }

    if let Some(uuid) = swap_uuid {
        params.push(format!("resume=UUID={uuid}"));
    }
    if let Some(mapper) = swap_mapper {
        params.push(format!("resume=/dev/mapper/{mapper}"));
    }

    Ok(params)
}

/// Run `mkinitcpio -P` in-chroot to regenerate all configured presets.
pub fn regenerate_initrds(root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    let ok = supervisor::chroot_exec(&["mkinitcpio".to_string(), "-P".to_string()], root_mountpoint, install_log, false)
        .map_err(|e| InstallError::config_write(e.to_string()))?;
    if !ok {
        return Err(InstallError::config_write("mkinitcpio -P failed"));
    }
    Ok(())
}

/// Write `/etc/locale.conf`, uncomment the matching `/etc/locale.gen`
/// line, and run `locale-gen` in-chroot.
pub fn set_locale(locale: &str, root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    let locale_conf = root_mountpoint.join("etc/locale.conf");
    let mut content = String::new();
    for var in ["LANG", "LC_NUMERIC", "LC_TIME", "LC_MONETARY", "LC_PAPER", "LC_NAME", "LC_ADDRESS",
        "LC_TELEPHONE", "LC_MEASUREMENT", "LC_IDENTIFICATION", "LC_ALL", "LC_MESSAGES"]
    {
        content.push_str(&format!("{var}={locale}\n"));
    }
    fs::write(&locale_conf, content)?;

    let locale_gen_path = root_mountpoint.join("etc/locale.gen");
    if let Ok(gen_content) = fs::read_to_string(&locale_gen_path) {
        let prefix = format!("#{locale}");
        let updated: String = gen_content
            .lines()
            .map(|line| if line.trim_start() == prefix { locale } else { line })
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";
        fs::write(&locale_gen_path, updated)?;
    }

    let ok = supervisor::chroot_exec(&["locale-gen".to_string()], root_mountpoint, install_log, false)
        .map_err(|e| InstallError::config_write(e.to_string()))?;
    if !ok {
        return Err(InstallError::config_write("locale-gen failed"));
    }
    Ok(())
}

/// Write `/etc/hostname` and populate `/etc/hosts` with standard loopback
/// aliases.
pub fn set_hostname(hostname: &str, root_mountpoint: &Path) -> Result<()> {
    fs::write(root_mountpoint.join("etc/hostname"), format!("{hostname}\n"))?;
    let hosts = format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{hostname}.localdomain\t{hostname}\n"
    );
    fs::write(root_mountpoint.join("etc/hosts"), hosts)?;
    Ok(())
}

/// Symlink `/etc/localtime` to the requested zoneinfo entry. Fails if the
/// zoneinfo target does not exist.
pub fn set_timezone(timezone: &str, root_mountpoint: &Path) -> Result<()> {
    let target = format!("/usr/share/zoneinfo/{timezone}");
    let absolute_target = root_mountpoint.join(target.trim_start_matches('/'));
    if !absolute_target.exists() {
        return Err(InstallError::config_write(format!("zoneinfo entry not found: {timezone}")));
    }
    let link = root_mountpoint.join("etc/localtime");
    let _ = fs::remove_file(&link);
    std::os::unix::fs::symlink(&target, &link)?;
    Ok(())
}

/// Invoke `hwclock --systohc` in-chroot; retry UTC once with
/// `--directisa` on failure.
pub fn set_hwclock(utc: bool, root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    let mode_flag = if utc { "--utc" } else { "--localtime" };
    let argv = vec!["hwclock".to_string(), "--systohc".to_string(), mode_flag.to_string()];
    let ok = supervisor::chroot_exec(&argv, root_mountpoint, install_log, false)
        .map_err(|e| InstallError::config_write(e.to_string()))?;
    if ok {
        return Ok(());
    }
    if utc {
        let retry = vec!["hwclock".to_string(), "--systohc".to_string(), "--utc".to_string(), "--directisa".to_string()];
        let ok = supervisor::chroot_exec(&retry, root_mountpoint, install_log, false)
            .map_err(|e| InstallError::config_write(e.to_string()))?;
        if ok {
            return Ok(());
        }
    }
    Err(InstallError::config_write("hwclock failed"))
}

/// Write `/etc/vconsole.conf`.
pub fn set_keymap(keymap: &str, root_mountpoint: &Path) -> Result<()> {
    fs::write(root_mountpoint.join("etc/vconsole.conf"), format!("KEYMAP={keymap}\n")).map_err(InstallError::from)
}

/// Write `/etc/X11/xorg.conf.d/00-keyboard.conf`.
pub fn set_xkbmap(layout: &str, root_mountpoint: &Path) -> Result<()> {
    let dir = root_mountpoint.join("etc/X11/xorg.conf.d");
    fs::create_dir_all(&dir)?;
    let content = format!(
        "Section \"InputClass\"\n        Identifier \"system-keyboard\"\n        MatchIsKeyboard \"on\"\n        Option \"XkbLayout\" \"{layout}\"\nEndSection\n"
    );
    fs::write(dir.join("00-keyboard.conf"), content).map_err(InstallError::from)
}

/// Create a group in-chroot via `groupadd`.
pub fn create_group(name: &str, root_mountpoint: &Path, is_system: bool, install_log: &Path) -> Result<()> {
    let mut argv = vec!["groupadd".to_string()];
    if is_system {
        argv.push("--system".to_string());
    }
    argv.push(name.to_string());
    let ok = supervisor::chroot_exec(&argv, root_mountpoint, install_log, false)
        .map_err(|e| InstallError::config_write(e.to_string()))?;
    if !ok {
        return Err(InstallError::config_write(format!("groupadd failed for {name}")));
    }
    Ok(())
}

/// `{username, password, shell, sudoers_group}` — account to provision.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub username: String,
    pub password: String,
    pub shell: String,
    pub sudoers_group: String,
}

/// Create a user with shell, secondary groups, home ownership, password,
/// and (if `sudoers_group` is non-empty) a `/etc/sudoers.d/10-installer`
/// drop-in.
pub fn create_new_user(
    user_info: &UserInfo,
    default_groups: &[String],
    root_mountpoint: &Path,
    install_log: &Path,
) -> Result<()> {
    if !user_info.sudoers_group.is_empty() && !default_groups.iter().any(|g| g == &user_info.sudoers_group) {
        return Err(InstallError::config_write(format!(
            "sudoers group '{}' is not in the user's default groups",
            user_info.sudoers_group
        )));
    }

    for group in default_groups {
        create_group(group, root_mountpoint, false, install_log)?;
    }

    let mut useradd = vec!["useradd".to_string(), "-m".to_string(), "-U".to_string()];
    if !user_info.shell.is_empty() {
        useradd.push("-s".to_string());
        useradd.push(user_info.shell.clone());
    }
    useradd.push(user_info.username.clone());
    let ok = supervisor::chroot_exec(&useradd, root_mountpoint, install_log, false)
        .map_err(|e| InstallError::config_write(e.to_string()))?;
    if !ok {
        return Err(InstallError::config_write(format!("useradd failed for {}", user_info.username)));
    }

    if !default_groups.is_empty() {
        let usermod = vec![
            "usermod".to_string(),
            "-aG".to_string(),
            default_groups.join(","),
            user_info.username.clone(),
        ];
        let ok = supervisor::chroot_exec(&usermod, root_mountpoint, install_log, false)
            .map_err(|e| InstallError::config_write(e.to_string()))?;
        if !ok {
            return Err(InstallError::config_write(format!("usermod -aG failed for {}", user_info.username)));
        }
    }

    let chown = vec![
        "chown".to_string(),
        "-R".to_string(),
        format!("{0}:{0}", user_info.username),
        format!("/home/{}", user_info.username),
    ];
    let ok = supervisor::chroot_exec(&chown, root_mountpoint, install_log, false)
        .map_err(|e| InstallError::config_write(e.to_string()))?;
    if !ok {
        return Err(InstallError::config_write(format!("chown failed for {}'s home", user_info.username)));
    }

    set_user_password(&user_info.username, &user_info.password, root_mountpoint, install_log)?;

    if user_info.sudoers_group.is_empty() {
        return Ok(());
    }

    let sudoers_path = root_mountpoint.join("etc/sudoers.d/10-installer");
    fs::write(&sudoers_path, format!("%{} ALL=(ALL) ALL\n", user_info.sudoers_group))?;
    let mut perms = fs::metadata(&sudoers_path)?.permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o440);
    fs::set_permissions(&sudoers_path, perms)?;
    Ok(())
}

fn set_password(chroot_user: &str, password: &str, root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    let argv = vec!["chpasswd".to_string()];
    let stdin_data = format!("{chroot_user}:{password}\n");
    let ok = chroot_exec_with_stdin(&argv, &stdin_data, root_mountpoint, install_log)?;
    if !ok {
        return Err(InstallError::config_write(format!("failed to set password for {chroot_user}")));
    }
    Ok(())
}

fn chroot_exec_with_stdin(argv: &[String], stdin_data: &str, root_mountpoint: &Path, install_log: &Path) -> Result<bool> {
    if std::env::var("DIRTY_CMD_RUN").as_deref() == Ok("1") {
        tracing::info!(argv = ?argv, "DIRTY_CMD_RUN=1: skipping actual execution");
        return Ok(true);
    }
    use std::io::Write;
    use std::process::{Command, Stdio};
    let mut full_argv = vec!["chroot".to_string(), root_mountpoint.display().to_string()];
    full_argv.extend(argv.iter().cloned());

    let mut cmd = Command::new(&full_argv[0]);
    cmd.args(&full_argv[1..]);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| InstallError::config_write(e.to_string()))?;
    {
        let stdin = child.stdin.as_mut().expect("stdin was piped");
        stdin.write_all(stdin_data.as_bytes()).map_err(|e| InstallError::config_write(e.to_string()))?;
    }
    let output = child.wait_with_output().map_err(|e| InstallError::config_write(e.to_string()))?;
    if !output.stderr.is_empty() {
        let mut log = fs::OpenOptions::new().create(true).append(true).open(install_log)?;
        log.write_all(&output.stderr)?;
    }
    Ok(output.status.success())
}

pub fn set_root_password(password: &str, root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    set_password("root", password, root_mountpoint, install_log)
}

pub fn set_user_password(username: &str, password: &str, root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    set_password(username, password, root_mountpoint, install_log)
}

/// Enable autologin for `username` under `dm`, by editing that display
/// manager's config file with idempotent sed rules. For lightdm, also
/// creates the `autologin` group and adds the user to it.
pub fn enable_autologin(dm: DisplayManager, username: &str, root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    match dm {
        DisplayManager::Gdm => {
            let conf = root_mountpoint.join("etc/gdm/custom.conf");
            sed_in_place(&conf, "^AutomaticLogin=.*", &format!("AutomaticLogin={username}"))?;
            sed_in_place(&conf, "^AutomaticLoginEnable=.*", "AutomaticLoginEnable=true")?;
            sed_in_place(&conf, "^TimedLoginEnable=.*", "TimedLoginEnable=true")?;
            sed_in_place(&conf, "^TimedLogin=.*", &format!("TimedLogin={username}"))?;
            sed_in_place(&conf, "^TimedLoginDelay=.*", "TimedLoginDelay=0")?;
        }
        DisplayManager::Lightdm => {
            let conf = root_mountpoint.join("etc/lightdm/lightdm.conf");
            sed_in_place(&conf, "^#autologin-user=.*", &format!("autologin-user={username}"))?;
            sed_in_place(&conf, "^#autologin-user-timeout=0", "autologin-user-timeout=0")?;
            create_group("autologin", root_mountpoint, true, install_log)?;
            let gpasswd = vec!["gpasswd".to_string(), "-a".to_string(), username.to_string(), "autologin".to_string()];
            let ok = supervisor::chroot_exec(&gpasswd, root_mountpoint, install_log, false)
                .map_err(|e| InstallError::config_write(e.to_string()))?;
            if !ok {
                return Err(InstallError::config_write("failed to add user to autologin group"));
            }
        }
        DisplayManager::Sddm => {
            let conf = root_mountpoint.join("etc/sddm.conf");
            sed_in_place(&conf, "^User=.*", &format!("User={username}"))?;
        }
        DisplayManager::Lxdm => {
            let conf = root_mountpoint.join("etc/lxdm/lxdm.conf");
            sed_in_place(&conf, "^# autologin=.*", &format!("autologin={username}"))?;
        }
    }
    Ok(())
}

/// Replace every line matching `pattern` (a simple `^literal.*` anchor) with
/// `replacement`. Leaves the file untouched if it doesn't exist yet.
fn sed_in_place(path: &Path, pattern: &str, replacement: &str) -> Result<()> {
    let Ok(content) = fs::read_to_string(path) else { return Ok(()) };
    let prefix = pattern.trim_start_matches('^').trim_end_matches(".*");
    let updated: String = content
        .lines()
        .map(|line| if line.starts_with(prefix) { replacement } else { line })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";
    fs::write(path, updated).map_err(InstallError::from)
}

/// `systemctl enable <name>` in-chroot.
pub fn enable_systemd_service(name: &str, root_mountpoint: &Path, install_log: &Path) -> Result<()> {
    let argv = vec!["systemctl".to_string(), "enable".to_string(), name.to_string()];
    let ok = supervisor::chroot_exec(&argv, root_mountpoint, install_log, false)
        .map_err(|e| InstallError::config_write(e.to_string()))?;
    if !ok {
        return Err(InstallError::config_write(format!("failed to enable service {name}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::DefaultPartitionSchemaConfig;

    fn sample_partition(device: &str, mountpoint: &str, fstype: Filesystem) -> Partition {
        Partition {
            device: device.to_string(),
            fstype,
            mountpoint: mountpoint.to_string(),
            mount_opts: "defaults,noatime".to_string(),
            uuid: Some("11111111-2222-3333-4444-555555555555".to_string()),
            size: String::new(),
            ..Default::default()
        }
    }

    #[test]
    fn fstab_skips_swap_and_zfs() {
        let parts = vec![
            sample_partition("/dev/sda1", "", Filesystem::LinuxSwap),
            sample_partition("/dev/sda2", "/", Filesystem::Zfs),
        ];
        let content = generate_fstab_content(&parts);
        assert_eq!(content, FSTAB_HEADER);
    }

    #[test]
    fn fstab_uses_uuid_token_and_pass_one_for_root() {
        let parts = vec![sample_partition("/dev/sda2", "/", Filesystem::Ext4)];
        let content = generate_fstab_content(&parts);
        assert!(content.contains("UUID=11111111-2222-3333-4444-555555555555"));
        assert!(content.trim_end().ends_with(" 0 1"));
    }

    #[test]
    fn fstab_uses_mapper_token_for_luks() {
        let mut part = sample_partition("/dev/sda2", "/", Filesystem::Ext4);
        part.luks_mapper_name = Some("cryptroot".to_string());
        let content = generate_fstab_content(&[part]);
        assert!(content.contains("/dev/mapper/cryptroot"));
    }

    #[test]
    fn fstab_prepends_subvol_for_btrfs() {
        let mut part = sample_partition("/dev/sda2", "/home", Filesystem::Btrfs);
        part.subvolume = Some("/@home".to_string());
        let content = generate_fstab_content(&[part]);
        assert!(content.contains("subvol=/@home,defaults,noatime"));
    }

    #[test]
    fn crypttab_skips_unencrypted_partitions() {
        let part = sample_partition("/dev/sda2", "/", Filesystem::Ext4);
        let content = generate_crypttab_content(&[part], "luks");
        assert_eq!(content, CRYPTTAB_HEADER);
    }

    #[test]
    fn crypttab_uses_none_password_when_root_unencrypted_boot_entry() {
        let mut boot = sample_partition("/dev/sda1", "/boot", Filesystem::Ext4);
        boot.luks_mapper_name = Some("cryptboot".to_string());
        boot.luks_uuid = Some("aaaa".to_string());
        let content = generate_crypttab_content(&[boot], "luks");
        assert!(content.contains("cryptboot"));
        assert!(content.contains("none"));
    }

    #[test]
    fn crypttab_root_not_encrypted_twice_when_boot_already_unlocks() {
        let mut root = sample_partition("/dev/sda2", "/", Filesystem::Ext4);
        root.luks_mapper_name = Some("cryptroot".to_string());
        root.luks_uuid = Some("bbbb".to_string());
        let content = generate_crypttab_content(&[root], "luks");
        assert!(content.contains("none"));
    }

    #[test]
    fn crypttab_orders_by_mountpoint_then_device() {
        let mut boot = sample_partition("/dev/sda1", "/boot", Filesystem::Ext4);
        boot.luks_mapper_name = Some("cryptboot".to_string());
        boot.luks_uuid = Some("aaaa".to_string());
        let mut root = sample_partition("/dev/sda2", "/", Filesystem::Ext4);
        root.luks_mapper_name = Some("cryptroot".to_string());
        root.luks_uuid = Some("bbbb".to_string());

        let content = generate_crypttab_content(&[boot, root], "luks");
        let root_pos = content.find("cryptroot").unwrap();
        let boot_pos = content.find("cryptboot").unwrap();
        assert!(root_pos < boot_pos, "entries must sort by mountpoint (/ before /boot), not by device");
    }

    #[test]
    fn kernel_params_luks_root_adds_cryptdevice_and_mapper_root() {
        let config = DefaultPartitionSchemaConfig { root_fs_type: Filesystem::Ext4, ..Default::default() };
        let mut scheme = crate::partition::generate_default_partition_schema("/dev/sda", &config, true);
        let root = scheme.partitions.iter_mut().find(|p| p.is_root()).unwrap();
        root.luks_mapper_name = Some("cryptroot".to_string());
        root.luks_uuid = Some("uuid-root".to_string());
        root.uuid = Some("uuid-root".to_string());

        let params = get_kernel_params(&scheme, "quiet", None).unwrap();
        assert!(params.contains(&"cryptdevice=UUID=uuid-root:cryptroot".to_string()));
        assert!(params.contains(&"root=/dev/mapper/cryptroot".to_string()));
        assert!(!params.iter().any(|p| p.starts_with("root=UUID=")));
    }

    #[test]
    fn kernel_params_requires_zfs_root_dataset() {
        let mut scheme = PartitionScheme { device: "/dev/sda".to_string(), is_efi: true, partitions: vec![] };
        scheme.partitions.push(Partition {
            device: "/dev/sda1".to_string(),
            fstype: Filesystem::Zfs,
            mountpoint: "/".to_string(),
            uuid: Some("z".to_string()),
            ..Default::default()
        });
        let result = get_kernel_params(&scheme, "", None);
        assert!(result.is_err());
        let ok = get_kernel_params(&scheme, "", Some("zroot/ROOT/default"));
        assert!(ok.unwrap().contains(&"root=ZFS=zroot/ROOT/default".to_string()));
    }

    #[test]
    fn kernel_params_fails_without_root_uuid() {
        let scheme = PartitionScheme { device: "/dev/sda".to_string(), is_efi: false, partitions: vec![] };
        let result = get_kernel_params(&scheme, "", None);
        assert!(result.is_err());
    }

    #[test]
    fn locale_writes_twelve_assignments() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        // SAFETY: test-only dry-run toggle.
        unsafe {
            std::env::set_var("DIRTY_CMD_RUN", "1");
        }
        set_locale("en_US.UTF-8", dir.path(), &dir.path().join("install.log")).unwrap();
        unsafe {
            std::env::remove_var("DIRTY_CMD_RUN");
        }
        let content = fs::read_to_string(dir.path().join("etc/locale.conf")).unwrap();
        assert_eq!(content.lines().count(), 12);
        assert!(content.contains("LANG=en_US.UTF-8"));
    }

    #[test]
    fn hostname_writes_hosts_with_loopback_aliases() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        set_hostname("testbox", dir.path()).unwrap();
        let hosts = fs::read_to_string(dir.path().join("etc/hosts")).unwrap();
        assert!(hosts.contains("127.0.0.1\tlocalhost"));
        assert!(hosts.contains("testbox"));
    }
}
