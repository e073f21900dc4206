//! Node-local path conventions for mount pod sources.
//!
//! Two conventions are in use and both must be preserved: the volume's
//! source root `base/<volume-id>` is what gets unmounted when a mount pod
//! goes away, while the bind source `base/<volume-id>/<volume-id>` is what
//! consumer targets are bind-mounted from. Changing either silently breaks
//! the collaborator relying on the other.

use std::path::{Path, PathBuf};

/// The mount point maintained by a mount pod for `volume_id`.
#[must_use]
pub fn source_root(base: &Path, volume_id: &str) -> PathBuf { base.join(volume_id) }

/// The directory inside the source root that consumer targets bind to.
#[must_use]
pub fn bind_source(base: &Path, volume_id: &str) -> PathBuf {
    base.join(volume_id).join(volume_id)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{bind_source, source_root};

    #[test]
    fn test_source_root_layout() {
        assert_eq!(source_root(Path::new("/var/mnt"), "vol-1"), Path::new("/var/mnt/vol-1"));
    }

    #[test]
    fn test_bind_source_layout() {
        assert_eq!(
            bind_source(Path::new("/var/mnt"), "vol-1"),
            Path::new("/var/mnt/vol-1/vol-1")
        );
    }
}
