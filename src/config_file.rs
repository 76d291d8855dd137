//! Declarative installer configuration (spec §6): `settings.json`.
//!
//! Grounded on the teacher's `config_file.rs` (serde-derived struct,
//! JSON load/save, a dedicated `validate()` pass). `headless_mode`
//! enforcement is a post-deserialize validation pass returning a
//! `ConfigError` naming the first missing required field, mirroring the
//! teacher's own `validate()`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InstallError, Result};
use crate::types::PartitionType;

/// One entry of the `partitions` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub name: String,
    pub mountpoint: String,
    pub size: String,
    #[serde(default)]
    pub fs_name: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: PartitionType,
}

/// Top-level `settings.json` schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// No `#[serde(default)]`: spec §8 requires a `ConfigError` when this
    /// key is absent, not a silent fallback.
    pub menus: i32,
    #[serde(default)]
    pub headless_mode: bool,
    #[serde(default)]
    pub server_mode: bool,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub fs_name: Option<String>,
    #[serde(default)]
    pub partitions: Vec<PartitionEntry>,
    #[serde(default)]
    pub mount_opts: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub xkbmap: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_pass: Option<String>,
    #[serde(default)]
    pub user_shell: Option<String>,
    #[serde(default)]
    pub root_pass: Option<String>,
    #[serde(default)]
    pub kernel: Option<String>,
    #[serde(default)]
    pub desktop: Option<String>,
    #[serde(default)]
    pub bootloader: Option<String>,
    #[serde(default)]
    pub post_install: Option<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            menus: 2,
            headless_mode: false,
            server_mode: false,
            device: None,
            fs_name: None,
            partitions: Vec::new(),
            mount_opts: None,
            hostname: None,
            locale: None,
            xkbmap: None,
            timezone: None,
            user_name: None,
            user_pass: None,
            user_shell: None,
            root_pass: None,
            kernel: None,
            desktop: None,
            bootloader: None,
            post_install: None,
        }
    }
}

/// Fields required when `headless_mode` is set, in the order they are
/// checked (spec §6's "headless-required" annotations).
const HEADLESS_REQUIRED_FIELDS: &[(&str, fn(&InstallerConfig) -> bool)] = &[
    ("device", |c| c.device.is_some()),
    ("hostname", |c| c.hostname.is_some()),
    ("locale", |c| c.locale.is_some()),
    ("xkbmap", |c| c.xkbmap.is_some()),
    ("timezone", |c| c.timezone.is_some()),
    ("user_name", |c| c.user_name.is_some()),
    ("user_pass", |c| c.user_pass.is_some()),
    ("user_shell", |c| c.user_shell.is_some()),
    ("root_pass", |c| c.root_pass.is_some()),
    ("kernel", |c| c.kernel.is_some()),
    ("desktop", |c| c.desktop.is_some()),
    ("bootloader", |c| c.bootloader.is_some()),
];

impl InstallerConfig {
    /// Parse `settings.json` content, returning a `Config` error naming
    /// the offending field on malformed JSON. `menus` is required: a
    /// missing key is a `ConfigError`, not a silent default.
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            if e.to_string().contains("missing field `menus`") {
                InstallError::config("'menus' field is required and must be an integer".to_string())
            } else {
                InstallError::config(e.to_string())
            }
        })
    }

    /// Load and parse `settings.json` from `path`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Save configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(InstallError::from)
    }

    /// Validate `headless_mode` field-presence requirements and
    /// per-partition `fs_name` inheritance, returning the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        if self.headless_mode {
            for (name, present) in HEADLESS_REQUIRED_FIELDS {
                if !present(self) {
                    return Err(InstallError::config(format!("'{name}' is required in headless mode")));
                }
            }
        }

        for entry in &self.partitions {
            let inherits_root_fs = entry.entry_type == PartitionType::Root && self.fs_name.is_some();
            if entry.fs_name.is_none() && !inherits_root_fs {
                return Err(InstallError::config(format!(
                    "partition '{}' has no fs_name and cannot inherit one",
                    entry.name
                )));
            }
        }

        Ok(())
    }

    /// Resolve a partition entry's effective filesystem name, inheriting
    /// the global `fs_name` when the entry is root and omits its own.
    pub fn effective_fs_name<'a>(&'a self, entry: &'a PartitionEntry) -> Option<&'a str> {
        entry.fs_name.as_deref().or_else(|| {
            if entry.entry_type == PartitionType::Root { self.fs_name.as_deref() } else { None }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_menus_field_is_a_config_error() {
        let err = InstallerConfig::parse("{}").unwrap_err();
        assert!(matches!(err, InstallError::Config(_)));
        assert!(err.to_string().contains("'menus'"));
    }

    #[test]
    fn explicit_menus_parses_and_defaults_to_non_headless() {
        let config = InstallerConfig::parse(r#"{"menus": 2}"#).unwrap();
        assert_eq!(config.menus, 2);
        assert!(!config.headless_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn headless_mode_requires_device() {
        let config = InstallerConfig { headless_mode: true, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'device'"));
    }

    #[test]
    fn headless_mode_checks_fields_in_order() {
        let config = InstallerConfig {
            headless_mode: true,
            device: Some("/dev/sda".to_string()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'hostname'"));
    }

    #[test]
    fn root_partition_inherits_global_fs_name() {
        let config = InstallerConfig {
            fs_name: Some("btrfs".to_string()),
            partitions: vec![PartitionEntry {
                name: "root".to_string(),
                mountpoint: "/".to_string(),
                size: String::new(),
                fs_name: None,
                entry_type: PartitionType::Root,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_fs_name(&config.partitions[0]), Some("btrfs"));
    }

    #[test]
    fn non_root_partition_requires_explicit_fs_name() {
        let config = InstallerConfig {
            fs_name: Some("btrfs".to_string()),
            partitions: vec![PartitionEntry {
                name: "data".to_string(),
                mountpoint: "/data".to_string(),
                size: "10GiB".to_string(),
                fs_name: None,
                entry_type: PartitionType::Additional,
            }],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'data'"));
    }

    #[test]
    fn round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let config = InstallerConfig {
            headless_mode: true,
            device: Some("/dev/nvme0n1".to_string()),
            hostname: Some("rollforge".to_string()),
            locale: Some("en_US.UTF-8".to_string()),
            xkbmap: Some("us".to_string()),
            timezone: Some("UTC".to_string()),
            user_name: Some("user".to_string()),
            user_pass: Some("hunter2".to_string()),
            user_shell: Some("/bin/bash".to_string()),
            root_pass: Some("hunter2".to_string()),
            kernel: Some("linux".to_string()),
            desktop: Some("none".to_string()),
            bootloader: Some("grub".to_string()),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = InstallerConfig::load_from_file(&path).unwrap();
        assert!(loaded.validate().is_ok());
        assert_eq!(loaded.device, config.device);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = InstallerConfig::parse("not json").unwrap_err();
        assert!(matches!(err, InstallError::Config(_)));
    }
}
