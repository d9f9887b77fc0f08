// SPDX-License-Identifier: GPL-3.0-only

//! Mount point selection from local pool-membership and trust-level hints

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_MOUNT_POINT: &str = "/mnt/instance_storage";
pub const POOL_MOUNT_POINT: &str = "/builds/slave";
pub const POOL_METADATA_FILE: &str = "/etc/jacuzzi_metadata.json";
pub const TRUST_LEVEL_FILE: &str = "/etc/slave-trustlevel";
pub const TRUST_LEVEL_MARKER: &str = "try";

/// Machines dedicated to at most this many builders use the pool mount point
const MAX_POOL_BUILDERS: usize = 3;

/// Only the number of builders matters, not what each entry looks like
#[derive(Debug, Deserialize)]
struct PoolMembership {
    builders: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountPointSelector {
    pub default_mount_point: PathBuf,
    pub pool_mount_point: PathBuf,
    pub pool_metadata_file: PathBuf,
    pub trust_level_file: PathBuf,
    pub trust_level_marker: String,
}

impl Default for MountPointSelector {
    fn default() -> Self {
        Self {
            default_mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            pool_mount_point: PathBuf::from(POOL_MOUNT_POINT),
            pool_metadata_file: PathBuf::from(POOL_METADATA_FILE),
            trust_level_file: PathBuf::from(TRUST_LEVEL_FILE),
            trust_level_marker: TRUST_LEVEL_MARKER.to_string(),
        }
    }
}

impl MountPointSelector {
    pub fn select(&self) -> PathBuf {
        let builders = builders_from(&self.pool_metadata_file);
        let in_pool = (1..=MAX_POOL_BUILDERS).contains(&builders.len());
        debug!("pool member: {} ({} builders)", in_pool, builders.len());

        let trust_level = read_trust_level(&self.trust_level_file);
        let trusted = trust_level.as_deref() == Some(self.trust_level_marker.as_str());
        debug!("trust level: {:?}", trust_level);

        let mount_point = if in_pool || trusted {
            self.pool_mount_point.clone()
        } else {
            self.default_mount_point.clone()
        };
        debug!("mount point: {}", mount_point.display());
        mount_point
    }
}

/// Builders listed in the pool metadata file; empty if it is missing or malformed
fn builders_from(path: &Path) -> Vec<serde_json::Value> {
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| {
            serde_json::from_str::<PoolMembership>(&raw).map_err(|e| e.to_string())
        });

    match parsed {
        Ok(membership) => membership.builders,
        Err(e) => {
            debug!("{} unusable: {}", path.display(), e);
            Vec::new()
        }
    }
}

fn read_trust_level(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Some(raw.trim().to_string()),
        Err(e) => {
            debug!("{} unreadable: {}", path.display(), e);
            None
        }
    }
}
