// SPDX-License-Identifier: GPL-3.0-only

//! Ephemeral device discovery from the block-device mapping metadata

use std::path::{Path, PathBuf};

use storage_types::BlockDevice;
use tracing::{debug, info, warn};

use crate::metadata::MetadataSource;

const BLOCK_DEVICE_MAPPING: &str = "block-device-mapping/";
const EPHEMERAL_PREFIX: &str = "ephemeral";

/// Maps a device name reported by the cloud to the one the guest kernel uses
pub trait DeviceNaming: Send + Sync {
    /// Alternate path to try when `path` does not exist
    fn alternate(&self, path: &Path) -> Option<PathBuf>;
}

/// Xen exposes `sdX` disks as `xvdX` block devices
#[derive(Debug, Clone, Copy, Default)]
pub struct XenNaming;

impl DeviceNaming for XenNaming {
    fn alternate(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?.to_str()?;
        let suffix = name.strip_prefix("sd")?;
        Some(path.with_file_name(format!("xvd{suffix}")))
    }
}

/// Device names are used as reported
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenaming;

impl DeviceNaming for NoRenaming {
    fn alternate(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

pub struct DeviceLocator<'a> {
    metadata: &'a dyn MetadataSource,
    naming: Box<dyn DeviceNaming>,
    dev_root: PathBuf,
}

impl<'a> DeviceLocator<'a> {
    pub fn new(metadata: &'a dyn MetadataSource) -> Self {
        Self {
            metadata,
            naming: Box::new(XenNaming),
            dev_root: PathBuf::from("/dev"),
        }
    }

    pub fn with_naming(mut self, naming: Box<dyn DeviceNaming>) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_dev_root(mut self, dev_root: impl Into<PathBuf>) -> Self {
        self.dev_root = dev_root.into();
        self
    }

    /// Ephemeral devices present on this instance, in metadata order.
    ///
    /// Missing metadata means no devices. Devices that cannot be found
    /// under the device root are logged and skipped.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_ephemeral_devices(&self) -> Vec<BlockDevice> {
        let Some(mapping) = self.metadata.fetch(BLOCK_DEVICE_MAPPING).await else {
            info!("No block device mapping available");
            return Vec::new();
        };

        let mut devices = Vec::new();
        for name in ephemeral_names(&mapping) {
            let key = format!("{BLOCK_DEVICE_MAPPING}{name}");
            let Some(raw) = self.metadata.fetch(&key).await else {
                warn!("No device mapped for {}", name);
                continue;
            };

            match self.resolve(raw.trim()).await {
                Some(path) => {
                    debug!("{} => {}", name, path.display());
                    devices.push(BlockDevice::new(path));
                }
                None => warn!("{} ({}) doesn't exist", name, raw.trim()),
            }
        }

        devices
    }

    async fn resolve(&self, raw: &str) -> Option<PathBuf> {
        let raw = raw.strip_prefix("/dev/").unwrap_or(raw);
        if raw.is_empty() {
            return None;
        }

        let path = self.dev_root.join(raw);
        if exists(&path).await {
            return Some(path);
        }

        let alternate = self.naming.alternate(&path)?;
        debug!("{} not found, trying {}", path.display(), alternate.display());
        exists(&alternate).await.then_some(alternate)
    }
}

fn ephemeral_names(mapping: &str) -> impl Iterator<Item = &str> {
    mapping
        .lines()
        .map(str::trim)
        .filter(|name| name.starts_with(EPHEMERAL_PREFIX))
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticMetadata;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").expect("create fake device");
    }

    #[tokio::test]
    async fn absent_mapping_means_no_devices() {
        let metadata = StaticMetadata::new();
        let locator = DeviceLocator::new(&metadata);
        assert!(locator.list_ephemeral_devices().await.is_empty());
    }

    #[tokio::test]
    async fn keeps_only_ephemeral_entries() {
        let dev = tempfile::tempdir().expect("tempdir");
        touch(dev.path(), "sdb");
        touch(dev.path(), "sda1");

        let metadata = StaticMetadata::new()
            .with("block-device-mapping/", "ami\nephemeral0\nroot\n")
            .with("block-device-mapping/ami", "sda1")
            .with("block-device-mapping/root", "/dev/sda1")
            .with("block-device-mapping/ephemeral0", "sdb");
        let locator = DeviceLocator::new(&metadata).with_dev_root(dev.path());

        let devices = locator.list_ephemeral_devices().await;
        assert_eq!(devices, vec![BlockDevice::new(dev.path().join("sdb"))]);
    }

    #[tokio::test]
    async fn falls_back_to_xen_names_and_drops_missing_devices() {
        let dev = tempfile::tempdir().expect("tempdir");
        touch(dev.path(), "xvdb");
        touch(dev.path(), "sdc");

        let metadata = StaticMetadata::new()
            .with("block-device-mapping/", "ephemeral0\nephemeral1\nephemeral2")
            .with("block-device-mapping/ephemeral0", "sdb")
            .with("block-device-mapping/ephemeral1", "sdc")
            .with("block-device-mapping/ephemeral2", "sdd");
        let locator = DeviceLocator::new(&metadata).with_dev_root(dev.path());

        let devices = locator.list_ephemeral_devices().await;
        assert_eq!(
            devices,
            vec![
                BlockDevice::new(dev.path().join("xvdb")),
                BlockDevice::new(dev.path().join("sdc")),
            ]
        );
    }

    #[tokio::test]
    async fn no_renaming_skips_fallback() {
        let dev = tempfile::tempdir().expect("tempdir");
        touch(dev.path(), "xvdb");

        let metadata = StaticMetadata::new()
            .with("block-device-mapping/", "ephemeral0")
            .with("block-device-mapping/ephemeral0", "sdb");
        let locator = DeviceLocator::new(&metadata)
            .with_dev_root(dev.path())
            .with_naming(Box::new(NoRenaming));

        assert!(locator.list_ephemeral_devices().await.is_empty());
    }

    #[test]
    fn xen_naming_only_rewrites_sd_devices() {
        assert_eq!(
            XenNaming.alternate(Path::new("/dev/sdb")),
            Some(PathBuf::from("/dev/xvdb"))
        );
        assert_eq!(XenNaming.alternate(Path::new("/dev/nvme1n1")), None);
    }
}
