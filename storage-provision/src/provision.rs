// SPDX-License-Identifier: GPL-3.0-only

//! Boot-time provisioning workflow
//!
//! ```text
//! Start → DevicesDiscovered → SingleDeviceFormatted ┐
//!                           → DevicesAggregated     ┴→ FstabReconciled → MountEnsured → Done
//! ```
//!
//! Each step checks current host state before changing it, so re-running
//! after a partial failure converges on the same result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use storage_sys::fstab::{Fstab, Reconciled};
use storage_sys::{CommandRunner, DeviceLocator, MetadataSource, VolumeAggregator, mounts};
use storage_types::BlockDevice;
use tracing::{debug, info, warn};

use crate::config::Config;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No ephemeral devices; nothing was touched
    NothingToDo,
    Provisioned { device: PathBuf, mount_point: PathBuf },
}

#[derive(Debug)]
enum State {
    Start,
    DevicesDiscovered(Vec<BlockDevice>),
    SingleDeviceFormatted(PathBuf),
    DevicesAggregated(PathBuf),
    FstabReconciled { device: PathBuf, mount_point: PathBuf },
    MountEnsured { device: PathBuf, mount_point: PathBuf },
    Done(Outcome),
}

/// Host checks that only matter once there is something to provision
pub type Preflight<'a> = Box<dyn Fn() -> Result<()> + 'a>;

pub struct Provisioner<'a> {
    runner: &'a dyn CommandRunner,
    metadata: &'a dyn MetadataSource,
    config: &'a Config,
    fstab: Fstab,
    preflight: Option<Preflight<'a>>,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        metadata: &'a dyn MetadataSource,
        config: &'a Config,
    ) -> Self {
        Self {
            runner,
            metadata,
            config,
            fstab: Fstab::new(&config.fstab),
            preflight: None,
        }
    }

    /// Run `check` after discovery, and only if devices were found
    pub fn with_preflight(mut self, check: impl Fn() -> Result<()> + 'a) -> Self {
        self.preflight = Some(Box::new(check));
        self
    }

    pub async fn run(&self) -> Result<Outcome> {
        let mut state = State::Start;
        loop {
            state = match self.step(state).await? {
                State::Done(outcome) => return Ok(outcome),
                next => {
                    debug!("state: {:?}", next);
                    next
                }
            };
        }
    }

    async fn step(&self, state: State) -> Result<State> {
        Ok(match state {
            State::Start => State::DevicesDiscovered(self.discover().await),

            State::DevicesDiscovered(devices) if devices.is_empty() => {
                info!("No ephemeral devices found, nothing to do");
                State::Done(Outcome::NothingToDo)
            }

            State::DevicesDiscovered(devices) => {
                if let Some(check) = &self.preflight {
                    check()?;
                }

                match devices.as_slice() {
                    [device] => {
                        info!("Found device: {}", device);
                        storage_sys::format_if_needed(self.runner, device.path())
                            .await
                            .with_context(|| format!("Failed to format {device}"))?;
                        State::SingleDeviceFormatted(device.path.clone())
                    }
                    _ => {
                        info!(
                            "Found devices: {}",
                            devices
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                        let device = VolumeAggregator::new(
                            self.runner,
                            &self.fstab,
                            self.config.volume.clone(),
                        )
                        .aggregate(&devices)
                        .await
                        .context("Failed to aggregate ephemeral devices")?;
                        State::DevicesAggregated(device)
                    }
                }
            }

            State::SingleDeviceFormatted(device) | State::DevicesAggregated(device) => {
                info!("Got {}", device.display());
                let mount_point = self.config.mount.select();
                match self
                    .fstab
                    .reconcile(&device, &mount_point)
                    .with_context(|| format!("Failed to update {}", self.fstab.path().display()))?
                {
                    Reconciled::RewriteFailed => warn!(
                        "Stale {} entry for {} left in place",
                        self.fstab.path().display(),
                        device.display()
                    ),
                    result => debug!("fstab: {:?}", result),
                }
                State::FstabReconciled {
                    device,
                    mount_point,
                }
            }

            State::FstabReconciled {
                device,
                mount_point,
            } => {
                self.ensure_mounted(&device, &mount_point).await?;
                State::MountEnsured {
                    device,
                    mount_point,
                }
            }

            State::MountEnsured {
                device,
                mount_point,
            } => State::Done(Outcome::Provisioned {
                device,
                mount_point,
            }),

            State::Done(outcome) => State::Done(outcome),
        })
    }

    async fn discover(&self) -> Vec<BlockDevice> {
        DeviceLocator::new(self.metadata)
            .with_dev_root(&self.config.devices.dev_root)
            .with_naming(self.config.devices.naming.strategy())
            .list_ephemeral_devices()
            .await
    }

    async fn ensure_mounted(&self, device: &Path, mount_point: &Path) -> Result<()> {
        if mounts::is_mounted(self.runner, device).await? {
            debug!("{} is already mounted", device.display());
            return Ok(());
        }

        if !tokio::fs::try_exists(mount_point).await.unwrap_or(false) {
            debug!("Creating directory {}", mount_point.display());
            tokio::fs::create_dir_all(mount_point)
                .await
                .with_context(|| format!("Failed to create {}", mount_point.display()))?;
        }

        mounts::mount(self.runner, device, self.fstab.path())
            .await
            .with_context(|| format!("Failed to mount {}", device.display()))
    }
}
