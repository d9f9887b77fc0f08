// SPDX-License-Identifier: GPL-3.0-only

//! Provisioner configuration
//!
//! Every setting has a built-in default matching a stock instance, so the
//! config file is optional. A file only needs the keys it overrides:
//!
//! ```toml
//! [devices]
//! naming = "none"
//!
//! [mount]
//! default_mount_point = "/scratch"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use storage_sys::fstab::ETC_FSTAB;
use storage_sys::metadata::{
    DEFAULT_ATTEMPTS, DEFAULT_BACKOFF, DEFAULT_METADATA_URL, DEFAULT_TIMEOUT,
};
use storage_sys::{DeviceNaming, MountPointSelector, NoRenaming, XenNaming};
use storage_types::VolumeLayout;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/instance-storage.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Persistent mount table to reconcile
    pub fstab: PathBuf,
    pub metadata: MetadataConfig,
    pub devices: DevicesConfig,
    pub volume: VolumeLayout,
    pub mount: MountPointSelector,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fstab: PathBuf::from(ETC_FSTAB),
            metadata: MetadataConfig::default(),
            devices: DevicesConfig::default(),
            volume: VolumeLayout::default(),
            mount: MountPointSelector::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_METADATA_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            attempts: DEFAULT_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF.as_millis() as u64,
        }
    }
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// How reported device names map onto guest device nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Naming {
    /// `sdX` may show up as `xvdX`
    #[default]
    Xen,
    /// Names are used as reported
    #[serde(rename = "none")]
    AsReported,
}

impl Naming {
    pub fn strategy(self) -> Box<dyn DeviceNaming> {
        match self {
            Naming::Xen => Box::new(XenNaming),
            Naming::AsReported => Box::new(NoRenaming),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevicesConfig {
    pub dev_root: PathBuf,
    pub naming: Naming,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            dev_root: PathBuf::from("/dev"),
            naming: Naming::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location if `None`.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw)
                .with_context(|| format!("Invalid configuration in {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                tracing::debug!("{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read configuration {}", path.display()))
            }
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
fstab = "/tmp/fstab"

[devices]
naming = "none"

[volume]
group = "scratch"
"#,
        )
        .unwrap();

        assert_eq!(config.fstab, PathBuf::from("/tmp/fstab"));
        assert_eq!(config.devices.naming, Naming::AsReported);
        assert_eq!(config.devices.dev_root, PathBuf::from("/dev"));
        assert_eq!(config.volume.group, "scratch");
        assert_eq!(config.volume.logical_volume, "local");
        assert_eq!(config.metadata, MetadataConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[mount]\nmountpoint = \"/x\"\n").is_err());
    }

    #[test]
    fn printed_config_loads_back() {
        let config = Config::default();
        let printed = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&printed).unwrap(), config);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(dir.path().join("absent.toml").as_path())).is_err());
    }

    #[test]
    fn defaults_match_stock_instance() {
        let config = Config::default();
        assert_eq!(config.metadata.timeout(), Duration::from_secs(1));
        assert_eq!(config.metadata.attempts, 3);
        assert_eq!(
            config.mount.default_mount_point,
            PathBuf::from("/mnt/instance_storage")
        );
    }
}
