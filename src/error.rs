//! Error handling for the installer core.
//!
//! Provides a centralized error type covering each conceptual failure kind
//! from the installer's error-handling design: configuration loading,
//! device/partition probing, scheme validation, partitioning, storage-layer
//! composition (LUKS/LVM/ZFS/btrfs), in-chroot configuration writes,
//! bootloader installation, and cooperative cancellation.

use thiserror::Error;

/// Main error type for the installer core.
#[derive(Error, Debug)]
pub enum InstallError {
    /// IO errors (file operations, subprocess spawn, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed `settings.json`, invalid field value, or missing
    /// headless-required field.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure to enumerate disks or parse block-device probe output.
    #[error("device probe error: {0}")]
    Probe(String),

    /// A `PartitionScheme` violates one of the planner's invariants.
    #[error("partition scheme validation error: {0}")]
    Validation(String),

    /// Disk wipe or partitioning-tool invocation failed.
    #[error("partitioning error: {0}")]
    Partitioning(String),

    /// LUKS/LVM/ZFS/btrfs composition step failed.
    #[error("storage composition error: {0}")]
    Composer(String),

    /// In-chroot config write, mkinitcpio, or locale-gen failure.
    #[error("configuration write error: {0}")]
    ConfigWrite(String),

    /// Bootloader install or config-generation failure.
    #[error("bootloader error: {0}")]
    Bootloader(String),

    /// Cooperative cancellation requested by the caller.
    #[error("cancelled")]
    CancelledByUser,

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors (catch-all for edge cases).
    #[error("{0}")]
    General(String),
}

/// Result type alias for installer operations.
pub type Result<T> = std::result::Result<T, InstallError>;

impl InstallError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn partitioning(msg: impl Into<String>) -> Self {
        Self::Partitioning(msg.into())
    }

    pub fn composer(msg: impl Into<String>) -> Self {
        Self::Composer(msg.into())
    }

    pub fn config_write(msg: impl Into<String>) -> Self {
        Self::ConfigWrite(msg.into())
    }

    pub fn bootloader(msg: impl Into<String>) -> Self {
        Self::Bootloader(msg.into())
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = InstallError::config("missing menus field");
        assert_eq!(err.to_string(), "configuration error: missing menus field");

        let err = InstallError::validation("no root partition");
        assert_eq!(
            err.to_string(),
            "partition scheme validation error: no root partition"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: InstallError = io_err.into();
        assert!(matches!(err, InstallError::Io(_)));
    }

    #[test]
    fn cancelled_has_fixed_message() {
        assert_eq!(InstallError::CancelledByUser.to_string(), "cancelled");
    }
}
