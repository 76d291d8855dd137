//! Shared session state (spec §3 `SessionState`, §9 redesign flag).
//!
//! The original carries this as a process-wide map-of-variants singleton.
//! Per the redesign flag, this is instead a plain struct constructed once
//! at entry and threaded by reference through the pipeline stages: no
//! global state, setters are explicit and caller-controlled, and tests can
//! construct a fake session directly.

use std::path::PathBuf;

use crate::bootloader::BootloaderConfig;
use crate::partition::PartitionScheme;
use crate::types::{BootFirmware, Bootloader};

/// Process-wide install context, read by every pipeline stage and
/// mutated only through its setters.
#[derive(Debug, Clone)]
pub struct SessionState {
    target_mountpoint: PathBuf,
    firmware_mode: BootFirmware,
    bootloader: Bootloader,
    partition_scheme: Option<PartitionScheme>,
    zpool_names: Vec<String>,
    swap_device: Option<String>,
    resolved_kernel: String,
    desktop_profile: Option<String>,
    network_profile_urls: Vec<String>,
    install_log_path: PathBuf,
    headless: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            target_mountpoint: PathBuf::from("/mnt"),
            firmware_mode: BootFirmware::default(),
            bootloader: Bootloader::default(),
            partition_scheme: None,
            zpool_names: Vec::new(),
            swap_device: None,
            resolved_kernel: "linux".to_string(),
            desktop_profile: None,
            network_profile_urls: Vec::new(),
            install_log_path: PathBuf::from("/var/log/rollforge-install.log"),
            headless: false,
        }
    }
}

impl SessionState {
    /// Construct a fresh session with the default target mountpoint
    /// (`/mnt`) and no partition scheme.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_mountpoint(&self) -> &std::path::Path {
        &self.target_mountpoint
    }

    pub fn set_target_mountpoint(&mut self, mountpoint: PathBuf) {
        self.target_mountpoint = mountpoint;
    }

    pub fn firmware_mode(&self) -> BootFirmware {
        self.firmware_mode
    }

    pub fn set_firmware_mode(&mut self, mode: BootFirmware) {
        self.firmware_mode = mode;
    }

    pub fn bootloader(&self) -> Bootloader {
        self.bootloader
    }

    pub fn set_bootloader(&mut self, bootloader: Bootloader) {
        self.bootloader = bootloader;
    }

    pub fn partition_scheme(&self) -> Option<&PartitionScheme> {
        self.partition_scheme.as_ref()
    }

    pub fn set_partition_scheme(&mut self, scheme: PartitionScheme) {
        self.partition_scheme = Some(scheme);
    }

    pub fn zpool_names(&self) -> &[String] {
        &self.zpool_names
    }

    pub fn add_zpool_name(&mut self, name: String) {
        self.zpool_names.push(name);
    }

    pub fn swap_device(&self) -> Option<&str> {
        self.swap_device.as_deref()
    }

    pub fn set_swap_device(&mut self, device: String) {
        self.swap_device = Some(device);
    }

    pub fn resolved_kernel(&self) -> &str {
        &self.resolved_kernel
    }

    pub fn set_resolved_kernel(&mut self, kernel: String) {
        self.resolved_kernel = kernel;
    }

    pub fn desktop_profile(&self) -> Option<&str> {
        self.desktop_profile.as_deref()
    }

    pub fn set_desktop_profile(&mut self, profile: String) {
        self.desktop_profile = Some(profile);
    }

    pub fn network_profile_urls(&self) -> &[String] {
        &self.network_profile_urls
    }

    pub fn set_network_profile_urls(&mut self, urls: Vec<String>) {
        self.network_profile_urls = urls;
    }

    pub fn install_log_path(&self) -> &std::path::Path {
        &self.install_log_path
    }

    pub fn set_install_log_path(&mut self, path: PathBuf) {
        self.install_log_path = path;
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    pub fn set_headless(&mut self, headless: bool) {
        self.headless = headless;
    }

    /// True if `is_efi` on the current partition scheme agrees with
    /// `firmware_mode`. Returns `true` (nothing to check) when no scheme
    /// has been set yet.
    pub fn firmware_matches_scheme(&self) -> bool {
        match &self.partition_scheme {
            Some(scheme) => scheme.is_efi == self.firmware_mode.is_efi(),
            None => true,
        }
    }

    /// Build the bootloader-agnostic view consumed by the generator from
    /// the session's kernel parameters and resolved device specs.
    pub fn bootloader_config(
        &self,
        kernel_params: Vec<String>,
        extra_kernel_versions: Vec<String>,
        root_device_spec: String,
        resume_device_spec: Option<String>,
        cryptdevice_spec: Option<String>,
        rootflags: Option<String>,
    ) -> BootloaderConfig {
        BootloaderConfig { kernel_params, extra_kernel_versions, root_device_spec, resume_device_spec, cryptdevice_spec, rootflags }
    }
}
