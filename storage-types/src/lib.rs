// SPDX-License-Identifier: GPL-3.0-only

//! Domain models for ephemeral instance storage provisioning
//!
//! These types are shared between the low-level operations in `storage-sys`
//! and the provisioning binary:
//!
//! - `BlockDevice` / `FilesystemType` → raw devices and what they carry
//! - `VolumeLayout` → the canonical volume group / logical volume pair
//! - `FstabEntry` → one persistent mount-table line

pub mod device;
pub mod fstab;
pub mod lvm;

pub use device::{BlockDevice, FilesystemType};
pub use fstab::FstabEntry;
pub use lvm::VolumeLayout;
