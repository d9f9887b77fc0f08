//! LVM (Logical Volume Manager) types
//!
//! The provisioner only ever manages one volume group holding one logical
//! volume; `VolumeLayout` names that pair.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME_GROUP: &str = "vg";
pub const DEFAULT_LOGICAL_VOLUME: &str = "local";

/// Canonical volume group / logical volume names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeLayout {
    /// Volume group name
    pub group: String,

    /// Logical volume name inside `group`
    pub logical_volume: String,
}

impl Default for VolumeLayout {
    fn default() -> Self {
        Self {
            group: DEFAULT_VOLUME_GROUP.to_string(),
            logical_volume: DEFAULT_LOGICAL_VOLUME.to_string(),
        }
    }
}

impl VolumeLayout {
    pub fn new(group: impl Into<String>, logical_volume: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            logical_volume: logical_volume.into(),
        }
    }

    /// Device-mapper path of the logical volume (e.g. "/dev/mapper/vg-local")
    ///
    /// Hyphens inside either name are doubled, as device-mapper does.
    pub fn mapper_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "/dev/mapper/{}-{}",
            escape_dm_name(&self.group),
            escape_dm_name(&self.logical_volume)
        ))
    }
}

fn escape_dm_name(name: &str) -> String {
    name.replace('-', "--")
}

#[cfg(test)]
mod tests {
    use super::VolumeLayout;
    use std::path::PathBuf;

    #[test]
    fn default_layout_maps_to_vg_local() {
        assert_eq!(
            VolumeLayout::default().mapper_path(),
            PathBuf::from("/dev/mapper/vg-local")
        );
    }

    #[test]
    fn hyphens_are_escaped_in_mapper_path() {
        let layout = VolumeLayout::new("my-vg", "scratch-data");
        assert_eq!(
            layout.mapper_path(),
            PathBuf::from("/dev/mapper/my--vg-scratch--data")
        );
    }
}
