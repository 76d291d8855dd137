//! initrd (`mkinitcpio.conf`) configuration builder.
//!
//! Parses `MODULES`/`FILES`/`HOOKS` assignments out of an on-disk
//! mkinitcpio config, mutates them in memory, and rewrites the file
//! preserving every other line verbatim. Grounded on `gucc`'s
//! `Initcpio` class (`initcpio.hpp`/`initcpio.cpp`): same parenthesized,
//! space-separated parsing; same no-op-on-duplicate semantics for
//! appends/inserts.

use std::fs;
use std::path::Path;

use crate::error::{InstallError, Result};

/// `{modules, files, hooks}` — the initrd builder's mutable config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitcpioConfig {
    pub modules: Vec<String>,
    pub files: Vec<String>,
    pub hooks: Vec<String>,
    /// Every line from the source file, unparsed, for round-tripping
    /// comments and any directive this builder doesn't know about.
    lines: Vec<String>,
}

fn parse_parenthesized(line: &str) -> Vec<String> {
    let open = match line.find('(') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let close = match line.find(')') {
        Some(i) => i,
        None => return Vec::new(),
    };
    if close <= open {
        return Vec::new();
    }
    line[open + 1..close]
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

impl InitcpioConfig {
    /// Parse `path` into an `InitcpioConfig`.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();

        let mut config = Self { lines, ..Default::default() };
        for line in &config.lines.clone() {
            if line.starts_with("MODULES") {
                config.modules = parse_parenthesized(line);
            } else if line.starts_with("FILES") {
                config.files = parse_parenthesized(line);
            } else if line.starts_with("HOOKS") {
                config.hooks = parse_parenthesized(line);
            }
        }
        Ok(config)
    }

    /// Rewrite `path`, substituting the `MODULES`/`FILES`/`HOOKS` lines and
    /// preserving everything else verbatim.
    pub fn write(&self, path: &Path) -> Result<()> {
        let rewritten: Vec<String> = self
            .lines
            .iter()
            .map(|line| {
                if line.starts_with("MODULES") {
                    format!("MODULES=({})", self.modules.join(" "))
                } else if line.starts_with("FILES") {
                    format!("FILES=({})", self.files.join(" "))
                } else if line.starts_with("HOOKS") {
                    format!("HOOKS=({})", self.hooks.join(" "))
                } else {
                    line.clone()
                }
            })
            .collect();
        fs::write(path, rewritten.join("\n") + "\n").map_err(InstallError::from)
    }

    /// Append `module`; no-op (returns `false`) if already present.
    pub fn append_module(&mut self, module: &str) -> bool {
        if self.modules.iter().any(|m| m == module) {
            return false;
        }
        self.modules.push(module.to_string());
        true
    }

    /// Append `file`; no-op if already present.
    pub fn append_file(&mut self, file: &str) -> bool {
        if self.files.iter().any(|f| f == file) {
            return false;
        }
        self.files.push(file.to_string());
        true
    }

    /// Append `hook`; no-op if already present.
    pub fn append_hook(&mut self, hook: &str) -> bool {
        if self.hooks.iter().any(|h| h == hook) {
            return false;
        }
        self.hooks.push(hook.to_string());
        true
    }

    /// Append every hook in `hooks` not already present. No-op (returns
    /// `false`) if none were new.
    pub fn append_hooks(&mut self, hooks: &[&str]) -> bool {
        let fresh: Vec<String> =
            hooks.iter().filter(|h| !self.hooks.iter().any(|existing| existing == *h)).map(|h| h.to_string()).collect();
        if fresh.is_empty() {
            return false;
        }
        self.hooks.extend(fresh);
        true
    }

    /// Insert `hook` immediately before `needle`; no-op if `hook` is
    /// already present (regardless of whether `needle` is found).
    pub fn insert_hook(&mut self, needle: &str, hook: &str) -> bool {
        if self.hooks.iter().any(|h| h == hook) {
            return false;
        }
        let pos = self.hooks.iter().position(|h| h == needle).unwrap_or(self.hooks.len());
        self.hooks.insert(pos, hook.to_string());
        true
    }

    /// Insert every hook in `hooks` not already present, immediately
    /// before `needle`.
    pub fn insert_hooks(&mut self, needle: &str, hooks: &[&str]) -> bool {
        let fresh: Vec<String> =
            hooks.iter().filter(|h| !self.hooks.iter().any(|existing| existing == *h)).map(|h| h.to_string()).collect();
        if fresh.is_empty() {
            return false;
        }
        let pos = self.hooks.iter().position(|h| h == needle).unwrap_or(self.hooks.len());
        for (offset, hook) in fresh.into_iter().enumerate() {
            self.hooks.insert(pos + offset, hook);
        }
        true
    }

    /// Remove `module`; no-op if absent.
    pub fn remove_module(&mut self, module: &str) -> bool {
        let before = self.modules.len();
        self.modules.retain(|m| m != module);
        self.modules.len() != before
    }

    /// Remove `hook`; no-op if absent.
    pub fn remove_hook(&mut self, hook: &str) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|h| h != hook);
        self.hooks.len() != before
    }

    /// Replace one hook with another in-place, preserving its position
    /// (used for the ZFS policy: `filesystems` → `zfs`).
    pub fn replace_hook(&mut self, old: &str, new: &str) -> bool {
        if let Some(pos) = self.hooks.iter().position(|h| h == old) {
            self.hooks[pos] = new.to_string();
            true
        } else {
            false
        }
    }
}

/// Composer policy (spec §4.5): apply the hook-composition rules implied
/// by the storage layering in effect.
///
/// - btrfs root ⇒ ensure module `crc32c-intel`; hook `btrfs`.
/// - LVM ⇒ hook `lvm2` before `filesystems`.
/// - LUKS ⇒ hook `encrypt` before `filesystems` (`sd-encrypt` if the
///   `systemd` hook is present).
/// - ZFS ⇒ replace `filesystems` with `zfs`.
pub struct HookPolicy {
    pub btrfs_root: bool,
    pub lvm: bool,
    pub luks: bool,
    pub zfs: bool,
}

impl InitcpioConfig {
    pub fn apply_hook_policy(&mut self, policy: &HookPolicy) {
        if policy.btrfs_root {
            self.append_module("crc32c-intel");
            self.append_hook("btrfs");
        }
        if policy.lvm {
            self.insert_hook("filesystems", "lvm2");
        }
        if policy.luks {
            let encrypt_hook = if self.hooks.iter().any(|h| h == "systemd") { "sd-encrypt" } else { "encrypt" };
            self.insert_hook("filesystems", encrypt_hook);
        }
        if policy.zfs {
            self.replace_hook("filesystems", "zfs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sample(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("mkinitcpio.conf");
        fs::write(
            &path,
            "# vim:set ft=sh\nMODULES=()\nFILES=()\nHOOKS=(base udev autodetect modconf block filesystems fsck)\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn parses_hooks_and_preserves_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let config = InitcpioConfig::parse_file(&path).unwrap();
        assert_eq!(config.hooks, vec!["base", "udev", "autodetect", "modconf", "block", "filesystems", "fsck"]);
        assert!(config.lines[0].starts_with('#'));
    }

    #[test]
    fn append_hook_is_noop_on_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let mut config = InitcpioConfig::parse_file(&path).unwrap();
        assert!(!config.append_hook("base"));
        assert!(config.append_hook("keyboard"));
    }

    #[test]
    fn insert_hook_places_before_needle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let mut config = InitcpioConfig::parse_file(&path).unwrap();
        assert!(config.insert_hook("filesystems", "lvm2"));
        let pos_lvm = config.hooks.iter().position(|h| h == "lvm2").unwrap();
        let pos_fs = config.hooks.iter().position(|h| h == "filesystems").unwrap();
        assert!(pos_lvm < pos_fs);
    }

    #[test]
    fn luks_policy_uses_sd_encrypt_when_systemd_hook_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let mut config = InitcpioConfig::parse_file(&path).unwrap();
        config.replace_hook("udev", "systemd");
        config.apply_hook_policy(&HookPolicy { btrfs_root: false, lvm: false, luks: true, zfs: false });
        assert!(config.hooks.contains(&"sd-encrypt".to_string()));
        assert!(!config.hooks.contains(&"encrypt".to_string()));
    }

    #[test]
    fn zfs_policy_replaces_filesystems_hook() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let mut config = InitcpioConfig::parse_file(&path).unwrap();
        config.apply_hook_policy(&HookPolicy { btrfs_root: false, lvm: false, luks: false, zfs: true });
        assert!(!config.hooks.contains(&"filesystems".to_string()));
        assert!(config.hooks.contains(&"zfs".to_string()));
    }

    #[test]
    fn btrfs_policy_adds_module_and_hook() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let mut config = InitcpioConfig::parse_file(&path).unwrap();
        config.apply_hook_policy(&HookPolicy { btrfs_root: true, lvm: false, luks: false, zfs: false });
        assert!(config.modules.contains(&"crc32c-intel".to_string()));
        assert!(config.hooks.contains(&"btrfs".to_string()));
    }

    #[test]
    fn write_round_trips_mutated_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let mut config = InitcpioConfig::parse_file(&path).unwrap();
        config.append_hook("keyboard");
        config.write(&path).unwrap();

        let reparsed = InitcpioConfig::parse_file(&path).unwrap();
        assert!(reparsed.hooks.contains(&"keyboard".to_string()));
        assert!(reparsed.lines[0].starts_with('#'));
    }
}
