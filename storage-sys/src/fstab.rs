// SPDX-License-Identifier: GPL-3.0-only

//! Persistent mount table reconciliation
//!
//! The provisioner owns exactly one fstab line, the one for its device.
//! Reconciling is idempotent: once the desired line is present, further
//! runs leave the file untouched. Removals go through a temp file in the
//! same directory that is renamed over the table, so the table is either
//! the old or the new content, never a partial write.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use storage_types::FstabEntry;
use storage_types::fstab::first_field;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cmd::CommandRunner;
use crate::error::Result;
use crate::mounts;

pub const ETC_FSTAB: &str = "/etc/fstab";

/// Result of [`Fstab::reconcile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The desired line was already present
    Unchanged,
    Appended,
    /// A different line for the device was swapped for the desired one
    Replaced,
    /// The stale line could not be removed; the table was left as it was
    RewriteFailed,
}

/// Result of [`Fstab::remove`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    NotPresent,
    /// Reading, writing or renaming failed; the table is untouched
    Failed,
}

#[derive(Debug, Clone)]
pub struct Fstab {
    path: PathBuf,
}

impl Default for Fstab {
    fn default() -> Self {
        Self::new(ETC_FSTAB)
    }
}

impl Fstab {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Line the provisioner wants for `device`
    pub fn desired_line(device: &Path, mount_point: &Path) -> String {
        desired_entry(device, mount_point).to_line()
    }

    /// Table content; a missing table reads as empty
    fn read(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            other => other,
        }
    }

    /// Lines of the table, newline-terminated
    pub fn read_lines(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .split_inclusive('\n')
            .map(str::to_string)
            .collect())
    }

    /// First non-comment line whose device field is exactly `device`
    pub fn find_line(&self, device: &str) -> Result<Option<String>> {
        let line = self
            .read_lines()?
            .into_iter()
            .find(|line| first_field(line) == Some(device));
        if let Some(line) = &line {
            debug!("{} already in {}: {}", device, self.path.display(), line.trim());
        }
        Ok(line)
    }

    /// Device field of the entry that resolves to the same device as `path`.
    ///
    /// `/dev/mapper/vg-local` and `/dev/vg/local` both link to `/dev/dm-N`,
    /// but only one of them is usually written in the table. The root
    /// filesystem and pseudo (`none`) entries are never considered.
    pub async fn find_entry_by_real_device(
        &self,
        runner: &dyn CommandRunner,
        path: &Path,
    ) -> Result<Option<String>> {
        let target = mounts::real_path(runner, path).await?;

        for line in self.read_lines()? {
            let Some(entry) = FstabEntry::parse(&line) else {
                continue;
            };
            if is_root_or_pseudo(&entry) {
                continue;
            }
            if mounts::real_path(runner, Path::new(&entry.device)).await? == target {
                debug!("{} and {} point to the same device", entry.device, path.display());
                return Ok(Some(entry.device));
            }
        }

        Ok(None)
    }

    /// Drop every line for `device`. Failures are logged, not returned.
    pub fn remove(&self, device: &str) -> Removal {
        match self.rewrite_without(device) {
            Ok(true) => {
                info!("Removed {} from {}", device, self.path.display());
                Removal::Removed
            }
            Ok(false) => {
                debug!("{} is not in {}", device, self.path.display());
                Removal::NotPresent
            }
            Err(e) => {
                warn!("Unable to rewrite {}: {}", self.path.display(), e);
                Removal::Failed
            }
        }
    }

    fn rewrite_without(&self, device: &str) -> io::Result<bool> {
        let content = self.read()?;
        let mut removed = false;
        let kept: String = content
            .split_inclusive('\n')
            .filter(|line| {
                let matches = first_field(line) == Some(device);
                removed |= matches;
                !matches
            })
            .collect();
        if !removed {
            return Ok(false);
        }

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        // Dropped (and deleted) on any early return below
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(kept.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.as_file()
            .set_permissions(fs::metadata(&self.path)?.permissions())?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        Ok(true)
    }

    fn append(&self, entry: &FstabEntry) -> Result<()> {
        let needs_newline = self.read().map(|c| !c.is_empty() && !c.ends_with('\n'))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if needs_newline {
            file.write_all(b"\n")?;
        }
        file.write_all(entry.to_line().as_bytes())?;

        info!("Added {} to {}", entry, self.path.display());
        Ok(())
    }

    /// Make the table contain the desired line for `device`, exactly once.
    #[tracing::instrument(level = "debug", skip(self), fields(fstab = %self.path.display()))]
    pub fn reconcile(&self, device: &Path, mount_point: &Path) -> Result<Reconciled> {
        let desired = desired_entry(device, mount_point);
        let Some(existing) = self.find_line(&desired.device)? else {
            self.append(&desired)?;
            return Ok(Reconciled::Appended);
        };

        if FstabEntry::parse(&existing).as_ref() == Some(&desired) {
            debug!("{} already in {}", desired, self.path.display());
            return Ok(Reconciled::Unchanged);
        }

        debug!("Replacing {}", existing.trim());
        match self.remove(&desired.device) {
            Removal::Failed => Ok(Reconciled::RewriteFailed),
            Removal::Removed | Removal::NotPresent => {
                self.append(&desired)?;
                Ok(Reconciled::Replaced)
            }
        }
    }
}

fn desired_entry(device: &Path, mount_point: &Path) -> FstabEntry {
    FstabEntry::instance_storage(
        device.to_string_lossy(),
        mount_point.to_string_lossy(),
    )
}

fn is_root_or_pseudo(entry: &FstabEntry) -> bool {
    entry.device == "LABEL=root_dev"
        || entry.mount_point == "/"
        || entry.device == "none"
        || entry.mount_point == "none"
        || entry.fs_type == "none"
}
