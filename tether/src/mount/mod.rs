//! The node mount-table seam.
//!
//! The reconciler only ever talks to the kernel mount table through the
//! [`Mounter`] trait; [`SystemMounter`] is the production implementation,
//! shelling out to `mount(8)`/`umount(8)` and answering queries from
//! `/proc/self/mountinfo`.

mod error;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use tokio::process::Command;

pub use self::error::Error;

/// Filesystem type passed for bind mounts.
pub const BIND_FS_TYPE: &str = "none";

/// Mount options for bind mounts.
pub const BIND_OPTIONS: [&str; 1] = ["bind"];

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

pub trait Mounter: Send + Sync {
    async fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: &str,
        options: &[&str],
    ) -> Result<(), Error>;

    async fn unmount(&self, target: &Path) -> Result<(), Error>;

    /// Whether `target` is a mount point right now.
    async fn is_mounted(&self, target: &Path) -> Result<bool, Error>;

    /// Whether `target` exists on the node's filesystem.
    async fn exists(&self, target: &Path) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMounter;

impl Mounter for SystemMounter {
    async fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: &str,
        options: &[&str],
    ) -> Result<(), Error> {
        let output = Command::new("mount")
            .arg("-t")
            .arg(fs_type)
            .arg("-o")
            .arg(options.join(","))
            .arg(source)
            .arg(target)
            .output()
            .await
            .with_context(|_| error::RunMountCommandSnafu { target: target.to_path_buf() })?;
        if output.status.success() {
            Ok(())
        } else {
            error::MountFailedSnafu {
                source_path: source.to_path_buf(),
                target: target.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .fail()
        }
    }

    async fn unmount(&self, target: &Path) -> Result<(), Error> {
        let output = Command::new("umount")
            .arg(target)
            .output()
            .await
            .with_context(|_| error::RunUnmountCommandSnafu { target: target.to_path_buf() })?;
        if output.status.success() {
            Ok(())
        } else {
            error::UnmountFailedSnafu {
                target: target.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .fail()
        }
    }

    async fn is_mounted(&self, target: &Path) -> Result<bool, Error> {
        let table = tokio::fs::read_to_string(MOUNTINFO_PATH)
            .await
            .context(error::ReadMountTableSnafu)?;
        Ok(mount_points(&table).any(|mount_point| mount_point == target))
    }

    async fn exists(&self, target: &Path) -> bool {
        tokio::fs::try_exists(target).await.unwrap_or(false)
    }
}

/// Mount points currently known to the node, with matching substring, in
/// table order and deduplicated. Used by `tether recover` to find the
/// consumer targets of one volume.
pub async fn mount_points_containing(needle: &str) -> Result<Vec<PathBuf>, Error> {
    let table =
        tokio::fs::read_to_string(MOUNTINFO_PATH).await.context(error::ReadMountTableSnafu)?;
    let mut seen = HashSet::new();
    Ok(mount_points(&table)
        .filter(|mount_point| mount_point.to_string_lossy().contains(needle))
        .filter(|mount_point| seen.insert(mount_point.clone()))
        .collect())
}

/// Parses the mount points (field five) out of a mountinfo table.
fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|raw| PathBuf::from(unescape(raw)))
}

/// Reverses the octal escaping (`\040` for space and friends) that the
/// kernel applies to mountinfo path fields.
fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|byte| (b'0'..=b'7').contains(byte))
        {
            let code = u16::from(bytes[i + 1] - b'0') * 64
                + u16::from(bytes[i + 2] - b'0') * 8
                + u16::from(bytes[i + 3] - b'0');
            if let Ok(byte) = u8::try_from(code) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
