// SPDX-License-Identifier: GPL-3.0-only

//! Presence checks for the system utilities the provisioner shells out to

use which::which;

use crate::error::{Result, SysError};

/// Needed on every run that finds at least one device
pub const BASE_TOOLS: &[&str] = &["blkid", "mkfs.ext4", "mount", "readlink"];

/// Needed only when several devices are joined into one volume
pub const LVM_TOOLS: &[&str] = &[
    "pvs", "pvcreate", "vgs", "vgcreate", "vgremove", "lvs", "lvdisplay", "lvcreate", "dd",
    "swapoff", "umount",
];

/// Tools from `tools` that are not found in PATH
pub fn missing<'t>(tools: &[&'t str]) -> Vec<&'t str> {
    tools
        .iter()
        .copied()
        .filter(|tool| which(tool).is_err())
        .collect()
}

/// Error out on the first tool from `tools` that is not in PATH
pub fn require(tools: &[&str]) -> Result<()> {
    match missing(tools).first() {
        Some(tool) => Err(SysError::ToolMissing((*tool).to_string())),
        None => Ok(()),
    }
}
