// SPDX-License-Identifier: GPL-3.0-only

//! Block device and filesystem type models

use std::fmt;
use std::path::{Path, PathBuf};

/// A raw block device discovered on this boot (e.g. `/dev/xvdb`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockDevice {
    /// Device node path
    pub path: PathBuf,
}

impl BlockDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Filesystem type as reported by `blkid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesystemType {
    Ext4,
    Ext3,
    Other(String),
}

impl FilesystemType {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "ext4" => FilesystemType::Ext4,
            "ext3" => FilesystemType::Ext3,
            other => FilesystemType::Other(other.to_string()),
        }
    }

    /// Extract the filesystem type from `blkid -o udev` output.
    ///
    /// Returns `None` when no `ID_FS_TYPE=` line is present (blank device).
    pub fn from_udev_output(output: &str) -> Option<Self> {
        output
            .lines()
            .find_map(|line| line.trim().strip_prefix("ID_FS_TYPE="))
            .filter(|value| !value.is_empty())
            .map(Self::from_name)
    }

    /// ext3 and ext4 are accepted as-is and never reformatted
    pub fn is_accepted_journaling(&self) -> bool {
        matches!(self, FilesystemType::Ext4 | FilesystemType::Ext3)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FilesystemType::Ext4 => "ext4",
            FilesystemType::Ext3 => "ext3",
            FilesystemType::Other(name) => name,
        }
    }
}

impl fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fs_type_from_udev_output() {
        let output = "ID_FS_UUID=1234\nID_FS_UUID_ENC=1234\nID_FS_TYPE=ext4\nID_FS_USAGE=filesystem\n";
        assert_eq!(
            FilesystemType::from_udev_output(output),
            Some(FilesystemType::Ext4)
        );
    }

    #[test]
    fn blank_device_has_no_fs_type() {
        assert_eq!(FilesystemType::from_udev_output(""), None);
        assert_eq!(FilesystemType::from_udev_output("ID_FS_TYPE=\n"), None);
    }

    #[test]
    fn only_ext3_and_ext4_are_accepted() {
        assert!(FilesystemType::Ext3.is_accepted_journaling());
        assert!(FilesystemType::Ext4.is_accepted_journaling());
        assert!(!FilesystemType::from_name("xfs").is_accepted_journaling());
        assert!(!FilesystemType::from_name("LVM2_member").is_accepted_journaling());
    }
}
