// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for ephemeral instance storage
//!
//! This crate holds every step of the provisioning workflow that touches
//! the host:
//! - Instance metadata lookups with bounded retry
//! - External command execution behind the `CommandRunner` trait
//! - Ephemeral device discovery and platform device naming
//! - LVM aggregation, ext4 formatting, fstab reconciliation and mounting
//!
//! These operations require root and are meant to be driven once per boot
//! by the provisioning binary.

pub mod cmd;
pub mod devices;
pub mod error;
pub mod filesystem;
pub mod fstab;
pub mod lvm;
pub mod metadata;
pub mod mount_point;
pub mod mounts;
pub mod tools;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cmd::{CommandLine, CommandRunner, SystemRunner};
pub use devices::{DeviceLocator, DeviceNaming, NoRenaming, XenNaming};
pub use error::{Result, SysError};
pub use filesystem::{FormatOutcome, format_if_needed};
pub use fstab::{Fstab, Reconciled, Removal};
pub use lvm::VolumeAggregator;
pub use metadata::{MetadataClient, MetadataSource};
pub use mount_point::MountPointSelector;
