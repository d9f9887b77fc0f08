// SPDX-License-Identifier: GPL-3.0-only

//! Mount state queries and mount/unmount/swap helpers

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cmd::{CommandLine, CommandRunner};
use crate::error::Result;
use crate::fstab::ETC_FSTAB;

/// Whether `device` is the source of any active mount.
///
/// Compares the first field of each `mount` output line exactly, so
/// `/dev/sdb` does not match `/dev/sdb1`.
pub async fn is_mounted(runner: &dyn CommandRunner, device: &Path) -> Result<bool> {
    let output = runner.output(&CommandLine::new("mount")).await?;
    let mounted = mount_sources(&output).any(|source| Path::new(source) == device);
    debug!(
        "device: {} is {}mounted",
        device.display(),
        if mounted { "" } else { "not " }
    );
    Ok(mounted)
}

fn mount_sources(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
}

/// Path with all symlinks followed; the path itself if it can't be resolved
pub async fn real_path(runner: &dyn CommandRunner, path: &Path) -> Result<PathBuf> {
    let resolved = runner
        .try_output(&CommandLine::new("readlink").arg("-f").path(path))
        .await?
        .map(|out| out.trim().to_string())
        .filter(|out| !out.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf());
    debug!("{} => {}", path.display(), resolved.display());
    Ok(resolved)
}

/// Best-effort unmount; failures are logged and swallowed
pub async fn unmount(runner: &dyn CommandRunner, target: &Path) {
    match runner
        .run(&CommandLine::new("umount").path(target))
        .await
    {
        Ok(()) => info!("{} unmounted", target.display()),
        Err(e) => warn!("Unable to unmount {}: {}", target.display(), e),
    }
}

/// Swap must be off before a volume holding a swap file can be unmounted
pub async fn disable_swap(runner: &dyn CommandRunner) -> Result<()> {
    debug!("Disabling swap");
    runner.run(&CommandLine::new("swapoff").arg("-a")).await
}

/// Mount `device` at the location recorded for it in `fstab`.
///
/// `mount` only consults `/etc/fstab` on its own; any other table is
/// passed with `-T`.
pub async fn mount(runner: &dyn CommandRunner, device: &Path, fstab: &Path) -> Result<()> {
    info!("Mounting {}", device.display());
    let mut command = CommandLine::new("mount");
    if fstab != Path::new(ETC_FSTAB) {
        command = command.arg("-T").path(fstab);
    }
    runner.run(&command.path(device)).await
}
