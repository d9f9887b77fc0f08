// SPDX-License-Identifier: GPL-3.0-only

//! Persistent mount table (fstab) entries

use std::fmt;

pub const EXT4: &str = "ext4";
pub const DEFAULT_OPTIONS: &str = "defaults,noatime";

/// One non-comment line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// First field: device path, `UUID=...`, `LABEL=...`, or a pseudo source
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: String,
    pub dump: u32,
    pub pass: u32,
}

impl FstabEntry {
    /// Entry the provisioner writes for its device
    pub fn instance_storage(device: impl Into<String>, mount_point: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            mount_point: mount_point.into(),
            fs_type: EXT4.to_string(),
            options: DEFAULT_OPTIONS.to_string(),
            dump: 0,
            pass: 0,
        }
    }

    /// Parse a mount table line.
    ///
    /// Comments, blank lines and lines with fewer than four fields yield
    /// `None`. Missing dump/pass columns default to 0, as mount(8) does.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut fields = line.split_whitespace();
        let device = fields.next()?.to_string();
        let mount_point = fields.next()?.to_string();
        let fs_type = fields.next()?.to_string();
        let options = fields.next()?.to_string();
        let dump = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        let pass = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);

        Some(Self {
            device,
            mount_point,
            fs_type,
            options,
            dump,
            pass,
        })
    }

    /// Rendered line, newline-terminated
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.device, self.mount_point, self.fs_type, self.options, self.dump, self.pass
        )
    }
}

/// First whitespace-separated field of a non-comment line
pub fn first_field(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    line.split_whitespace().next()
}
