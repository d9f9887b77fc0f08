// SPDX-License-Identifier: GPL-3.0-only

//! Aggregation of several ephemeral devices into one LVM logical volume
//!
//! Only one group/volume pair is ever managed. A volume group found under
//! another name (left over from an older layout) is torn down, together
//! with its mount and fstab entry, before the canonical group is created.

use std::path::{Path, PathBuf};

use storage_types::{BlockDevice, VolumeLayout};
use tracing::{debug, info};

use crate::cmd::{CommandLine, CommandRunner};
use crate::error::{Result, SysError};
use crate::filesystem;
use crate::fstab::Fstab;
use crate::mounts;

fn noheadings(program: &str, field: &str) -> CommandLine {
    CommandLine::new(program).args(["--noheadings", "-o", field])
}

/// Non-empty, trimmed lines of a `--noheadings` report
fn report_rows(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct VolumeAggregator<'a> {
    runner: &'a dyn CommandRunner,
    fstab: &'a Fstab,
    layout: VolumeLayout,
}

impl<'a> VolumeAggregator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, fstab: &'a Fstab, layout: VolumeLayout) -> Self {
        Self {
            runner,
            fstab,
            layout,
        }
    }

    /// Join `devices` into the canonical logical volume and return its
    /// device-mapper path. Safe to call again on an already joined set.
    #[tracing::instrument(skip_all, fields(vg = %self.layout.group, lv = %self.layout.logical_volume))]
    pub async fn aggregate(&self, devices: &[BlockDevice]) -> Result<PathBuf> {
        if devices.is_empty() {
            return Err(SysError::InvalidArgument(
                "no devices to aggregate".to_string(),
            ));
        }

        let registered = self.physical_volumes().await?;
        for device in devices {
            if registered.iter().any(|pv| Path::new(pv) == device.path()) {
                debug!("{} is already a physical volume", device);
            } else {
                self.init_physical_volume(device).await?;
            }
        }

        let groups = self.volume_groups().await?;
        match groups.first() {
            None => self.create_group(devices).await?,
            Some(_) if groups.contains(&self.layout.group) => {
                debug!("volume group {} already exists", self.layout.group);
            }
            Some(old_group) => {
                info!(
                    "Found volume group {}, replacing it with {}",
                    old_group, self.layout.group
                );
                self.tear_down(old_group).await?;
                self.create_group(devices).await?;
            }
        }

        let lv_path = self.layout.mapper_path();
        self.ensure_logical_volume(&lv_path).await?;
        Ok(lv_path)
    }

    async fn physical_volumes(&self) -> Result<Vec<String>> {
        let output = self.runner.output(&noheadings("pvs", "pv_name")).await?;
        let rows = report_rows(&output);
        debug!("physical volumes: {:?}", rows);
        Ok(rows)
    }

    /// Volume group names; a failing `vgs` means there are none
    async fn volume_groups(&self) -> Result<Vec<String>> {
        let rows = self
            .runner
            .try_output(&noheadings("vgs", "vg_name"))
            .await?
            .map(|output| report_rows(&output))
            .unwrap_or_default();
        debug!("volume groups: {:?}", rows);
        Ok(rows)
    }

    async fn init_physical_volume(&self, device: &BlockDevice) -> Result<()> {
        info!("Clearing the partition table for {}", device);
        self.runner
            .run(
                &CommandLine::new("dd")
                    .arg("if=/dev/zero")
                    .arg(format!("of={}", device.path().display()))
                    .args(["bs=512", "count=1"]),
            )
            .await?;

        info!("Creating a new physical volume for {}", device);
        self.runner
            .run(
                &CommandLine::new("pvcreate")
                    .args(["-ff", "-y"])
                    .path(device.path()),
            )
            .await
    }

    async fn create_group(&self, devices: &[BlockDevice]) -> Result<()> {
        info!(
            "Creating volume group {} with {} devices",
            self.layout.group,
            devices.len()
        );
        let mut cmd = CommandLine::new("vgcreate").arg(&self.layout.group);
        for device in devices {
            cmd = cmd.path(device.path());
        }
        self.runner.run(&cmd).await
    }

    /// Unmount, unlist and remove `group`. Each step tolerates its target
    /// already being gone.
    async fn tear_down(&self, group: &str) -> Result<()> {
        let lv_path = self
            .runner
            .try_output(&noheadings("lvs", "lv_path").arg(group))
            .await?
            .and_then(|output| report_rows(&output).into_iter().next())
            .map(PathBuf::from);

        match lv_path {
            Some(lv_path) => {
                let entry = self
                    .fstab
                    .find_entry_by_real_device(self.runner, &lv_path)
                    .await?;
                let mounted_as = entry.as_deref().map(PathBuf::from).unwrap_or(lv_path);

                if mounts::is_mounted(self.runner, &mounted_as).await? {
                    mounts::disable_swap(self.runner).await?;
                    mounts::unmount(self.runner, &mounted_as).await;
                }
                if let Some(entry) = entry {
                    self.fstab.remove(&entry);
                }
            }
            None => debug!("volume group {} has no logical volume", group),
        }

        info!("Removing volume group {}", group);
        self.runner
            .run(&CommandLine::new("vgremove").args(["-f", group]))
            .await
    }

    async fn ensure_logical_volume(&self, lv_path: &Path) -> Result<()> {
        if self
            .runner
            .try_run(&CommandLine::new("lvdisplay").path(lv_path))
            .await?
        {
            debug!("logical volume {} already exists", lv_path.display());
            return Ok(());
        }

        info!("Creating logical volume {}", lv_path.display());
        self.runner
            .run(
                &CommandLine::new("lvcreate")
                    .args(["-l", "100%VG", "--name"])
                    .arg(&self.layout.logical_volume)
                    .arg(&self.layout.group),
            )
            .await?;
        filesystem::format_if_needed(self.runner, lv_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn devices() -> Vec<BlockDevice> {
        vec![BlockDevice::new("/dev/sdb"), BlockDevice::new("/dev/sdc")]
    }

    fn empty_fstab() -> (tempfile::TempDir, Fstab) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fstab");
        std::fs::write(&path, "LABEL=root_dev / ext4 defaults,noatime 1 1\n").unwrap();
        (dir, Fstab::new(path))
    }

    #[tokio::test]
    async fn fresh_devices_become_vg_local() {
        let (_dir, fstab) = empty_fstab();
        let runner = ScriptedRunner::new();
        runner.fail("lvdisplay");

        let lv = VolumeAggregator::new(&runner, &fstab, VolumeLayout::default())
            .aggregate(&devices())
            .await
            .unwrap();

        assert_eq!(lv, PathBuf::from("/dev/mapper/vg-local"));
        assert_eq!(
            runner.calls(),
            vec![
                "pvs --noheadings -o pv_name",
                "dd if=/dev/zero of=/dev/sdb bs=512 count=1",
                "pvcreate -ff -y /dev/sdb",
                "dd if=/dev/zero of=/dev/sdc bs=512 count=1",
                "pvcreate -ff -y /dev/sdc",
                "vgs --noheadings -o vg_name",
                "vgcreate vg /dev/sdb /dev/sdc",
                "lvdisplay /dev/mapper/vg-local",
                "lvcreate -l 100%VG --name local vg",
                "mount",
                "blkid -o udev /dev/mapper/vg-local",
                "mkfs.ext4 /dev/mapper/vg-local",
            ]
        );
    }

    #[tokio::test]
    async fn existing_canonical_group_is_reused() {
        let (_dir, fstab) = empty_fstab();
        let runner = ScriptedRunner::new();
        runner.respond("pvs", "  /dev/sdb\n  /dev/sdc\n");
        runner.respond("vgs", "  vg\n");

        let lv = VolumeAggregator::new(&runner, &fstab, VolumeLayout::default())
            .aggregate(&devices())
            .await
            .unwrap();

        assert_eq!(lv, PathBuf::from("/dev/mapper/vg-local"));
        for mutating in ["dd", "pvcreate", "vgcreate", "vgremove", "lvcreate", "mkfs"] {
            assert!(!runner.was_called(mutating), "{mutating} must not run");
        }
    }

    #[tokio::test]
    async fn foreign_group_is_torn_down_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        std::fs::write(
            &path,
            "LABEL=root_dev / ext4 defaults 1 1\n/dev/mapper/old-data /data ext4 defaults 0 0\n",
        )
        .unwrap();
        let fstab = Fstab::new(&path);

        let runner = ScriptedRunner::new();
        runner.respond("pvs", "  /dev/sdb\n  /dev/sdc\n");
        runner.respond("vgs", "  old\n");
        runner.respond("lvs --noheadings -o lv_path old", "  /dev/old/data\n");
        runner.respond("readlink -f /dev/old/data", "/dev/dm-0\n");
        runner.respond("readlink -f /dev/mapper/old-data", "/dev/dm-0\n");
        runner.respond("mount", "/dev/mapper/old-data on /data type ext4 (rw)\n");
        runner.fail("lvdisplay");

        let lv = VolumeAggregator::new(&runner, &fstab, VolumeLayout::default())
            .aggregate(&devices())
            .await
            .unwrap();
        assert_eq!(lv, PathBuf::from("/dev/mapper/vg-local"));

        let swapoff = runner.position("swapoff -a").expect("swap disabled");
        let umount = runner
            .position("umount /dev/mapper/old-data")
            .expect("old volume unmounted");
        let vgremove = runner.position("vgremove -f old").expect("old group removed");
        let vgcreate = runner
            .position("vgcreate vg /dev/sdb /dev/sdc")
            .expect("canonical group created");
        assert!(swapoff < umount && umount < vgremove && vgremove < vgcreate);

        let table = std::fs::read_to_string(&path).unwrap();
        assert_eq!(table, "LABEL=root_dev / ext4 defaults 1 1\n");
    }

    #[tokio::test]
    async fn teardown_tolerates_missing_volume_and_entry() {
        let (_dir, fstab) = empty_fstab();
        let runner = ScriptedRunner::new();
        runner.respond("pvs", "  /dev/sdb\n  /dev/sdc\n");
        runner.respond("vgs", "  old\n");
        runner.fail("lvs");
        runner.fail("lvdisplay");

        VolumeAggregator::new(&runner, &fstab, VolumeLayout::default())
            .aggregate(&devices())
            .await
            .unwrap();

        assert!(!runner.was_called("swapoff"));
        assert!(!runner.was_called("umount"));
        let vgremove = runner.position("vgremove -f old").expect("old group removed");
        let vgcreate = runner.position("vgcreate vg").expect("canonical group created");
        assert!(vgremove < vgcreate);
    }

    #[tokio::test]
    async fn unmounted_old_volume_is_not_unmounted_again() {
        let (_dir, fstab) = empty_fstab();
        let runner = ScriptedRunner::new();
        runner.respond("pvs", "  /dev/sdb\n  /dev/sdc\n");
        runner.respond("vgs", "  old\n");
        runner.respond("lvs", "  /dev/old/data\n");

        VolumeAggregator::new(&runner, &fstab, VolumeLayout::default())
            .aggregate(&devices())
            .await
            .unwrap();

        assert!(!runner.was_called("umount"));
        assert!(runner.was_called("vgremove -f old"));
    }

    #[tokio::test]
    async fn empty_device_list_is_rejected() {
        let (_dir, fstab) = empty_fstab();
        let runner = ScriptedRunner::new();
        let err = VolumeAggregator::new(&runner, &fstab, VolumeLayout::default())
            .aggregate(&[])
            .await
            .expect_err("no devices");
        assert!(matches!(err, SysError::InvalidArgument(_)));
        assert!(runner.calls().is_empty());
    }
}
