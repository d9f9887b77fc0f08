// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem probing and formatting

use std::path::Path;

use storage_types::FilesystemType;
use tracing::{debug, info};

use crate::cmd::{CommandLine, CommandRunner};
use crate::error::Result;
use crate::mounts;

/// What [`format_if_needed`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    /// The device is mounted and was left alone
    SkippedMounted,
    /// The device already carries an accepted filesystem
    AlreadyFormatted(FilesystemType),
    Formatted,
}

/// Filesystem type reported by `blkid`, if any
pub async fn probe_filesystem(
    runner: &dyn CommandRunner,
    device: &Path,
) -> Result<Option<FilesystemType>> {
    let output = runner
        .try_output(&CommandLine::new("blkid").args(["-o", "udev"]).path(device))
        .await?;
    Ok(output.as_deref().and_then(FilesystemType::from_udev_output))
}

/// Format `device` as ext4 unless it is mounted or already ext3/ext4.
///
/// Formatting destroys the device's contents.
#[tracing::instrument(level = "debug", skip(runner))]
pub async fn format_if_needed(runner: &dyn CommandRunner, device: &Path) -> Result<FormatOutcome> {
    if mounts::is_mounted(runner, device).await? {
        debug!("{} is mounted: skipping formatting", device.display());
        return Ok(FormatOutcome::SkippedMounted);
    }

    match probe_filesystem(runner, device).await? {
        Some(fs_type) if fs_type.is_accepted_journaling() => {
            info!("{} no need to format: {}", device.display(), fs_type);
            Ok(FormatOutcome::AlreadyFormatted(fs_type))
        }
        found => {
            if let Some(fs_type) = found {
                debug!("{} carries {}, reformatting", device.display(), fs_type);
            }
            info!("Formatting {}", device.display());
            runner
                .run(&CommandLine::new("mkfs.ext4").path(device))
                .await?;
            Ok(FormatOutcome::Formatted)
        }
    }
}
