//! Property-based tests for the round-trip/idempotence invariants named in
//! spec §8: initcpio parse/write round-trips, fstab dedup-by-device, and
//! kernel-cmdline token composition.

use proptest::prelude::*;
use tempfile::tempdir;

use rollforge::initcpio::InitcpioConfig;
use rollforge::partition::Partition;
use rollforge::types::Filesystem;

fn hook_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("base".to_string()),
        Just("udev".to_string()),
        Just("autodetect".to_string()),
        Just("modconf".to_string()),
        Just("block".to_string()),
        Just("filesystems".to_string()),
        Just("keyboard".to_string()),
        Just("fsck".to_string()),
    ]
}

proptest! {
    /// Writing an `InitcpioConfig` then re-parsing it always recovers the
    /// same modules/files/hooks, regardless of how many distinct hooks
    /// were present.
    #[test]
    fn initcpio_round_trips_through_disk(hooks in prop::collection::vec(hook_strategy(), 0..6)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mkinitcpio.conf");
        std::fs::write(&path, "MODULES=()\nFILES=()\nHOOKS=()\n").unwrap();

        let mut config = InitcpioConfig::parse_file(&path).unwrap();
        let mut expected: Vec<String> = Vec::new();
        for hook in &hooks {
            if config.append_hook(hook) {
                expected.push(hook.clone());
            }
        }
        config.write(&path).unwrap();

        let reloaded = InitcpioConfig::parse_file(&path).unwrap();
        prop_assert_eq!(reloaded.hooks, expected);
    }

    /// Appending the same hook twice is always a no-op the second time,
    /// and the config never contains a duplicate.
    #[test]
    fn initcpio_append_hook_is_idempotent(hook in hook_strategy()) {
        let mut config = InitcpioConfig::default();
        prop_assert!(config.append_hook(&hook));
        prop_assert!(!config.append_hook(&hook));
        prop_assert_eq!(config.hooks.iter().filter(|h| *h == &hook).count(), 1);
    }
}

fn fstype_strategy() -> impl Strategy<Value = Filesystem> {
    prop_oneof![
        Just(Filesystem::Ext4),
        Just(Filesystem::Btrfs),
        Just(Filesystem::Xfs),
        Just(Filesystem::Vfat),
    ]
}

fn partition_strategy() -> impl Strategy<Value = Partition> {
    (0u8..4, fstype_strategy()).prop_map(|(device_suffix, fstype)| Partition {
        device: format!("/dev/sda{device_suffix}"),
        fstype,
        mountpoint: format!("/mnt{device_suffix}"),
        mount_opts: "defaults".to_string(),
        uuid: Some(format!("uuid-{device_suffix}")),
        ..Default::default()
    })
}

proptest! {
    /// Two partitions sharing a `device` never both produce an fstab entry
    /// — dedup-by-device always leaves at most one entry per device.
    #[test]
    fn fstab_never_emits_duplicate_devices(partitions in prop::collection::vec(partition_strategy(), 0..8)) {
        let content = rollforge::configurator::generate_fstab_content(&partitions);
        let mut seen = std::collections::HashSet::new();
        for line in content.lines().filter(|l| l.starts_with("UUID=") || l.starts_with('/')) {
            let device_token = line.split_whitespace().next().unwrap_or_default().to_string();
            prop_assert!(seen.insert(device_token), "duplicate source token in fstab: {line}");
        }
    }
}
