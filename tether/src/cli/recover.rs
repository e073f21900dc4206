use std::path::{Path, PathBuf};

use clap::Args;
use tether_base::paths;

use crate::{
    cli::{Error, error},
    config::Config,
    consts,
    mount::{self, BIND_FS_TYPE, BIND_OPTIONS, Mounter, SystemMounter},
};

/// `stat(2)` errno reported for a mount whose backing daemon is gone.
const ENOTCONN: i32 = 107;

/// Command-line arguments for in-pod recovery.
///
/// Runs inside a restarted mount pod: once the pod's filesystem daemon
/// serves the volume again, every consumer target that still points at the
/// dead predecessor mount is re-bound to the fresh one.
#[derive(Args, Clone)]
pub struct RecoverCommand {
    /// Identifier of the volume served by this mount pod.
    #[arg(
        long = "volume-id",
        env = "TETHER_VOLUME_ID",
        help = "Identifier of the volume served by this mount pod."
    )]
    pub volume_id: String,

    /// Base directory under which this mount pod exposes its volume mount.
    #[arg(
        long = "mount-base",
        help = "Base directory under which this mount pod exposes its volume mount."
    )]
    pub mount_base: Option<PathBuf>,
}

impl RecoverCommand {
    /// Waits for the fresh mount source, then re-binds stale consumer
    /// targets.
    ///
    /// # Errors
    ///
    /// Fails when the mount source never appears or the mount table cannot
    /// be read; individual re-bind failures are logged and skipped.
    pub async fn run(self, config: Config) -> Result<(), Error> {
        let Self { volume_id, mount_base } = self;

        let mount_base = mount_base.unwrap_or_else(|| config.mount_base.clone());
        let source = paths::bind_source(&mount_base, &volume_id);
        wait_for_source(&source).await?;

        let targets = mount::mount_points_containing(&format!("{volume_id}/mount")).await?;
        if targets.is_empty() {
            tracing::info!("No consumer targets found for volume {volume_id}, nothing to recover");
            return Ok(());
        }

        let mounter = SystemMounter;
        for target in targets {
            if target == source {
                continue;
            }
            if !is_stale(&target).await {
                tracing::debug!("Target {} is still healthy, skipping", target.display());
                continue;
            }
            tracing::info!("Re-binding stale target {}", target.display());
            if let Err(err) = mounter.unmount(&target).await {
                tracing::warn!("Failed to unmount stale target {}, error: {err}", target.display());
            }
            if let Err(err) = mounter.mount(&source, &target, BIND_FS_TYPE, &BIND_OPTIONS).await {
                tracing::warn!("Failed to re-bind target {}, error: {err}", target.display());
            }
        }

        Ok(())
    }
}

/// Waits for `source` to appear, polling until the recovery deadline.
async fn wait_for_source(source: &Path) -> Result<(), Error> {
    for _ in 0..consts::RECOVER_WAIT_ATTEMPTS {
        if tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Ok(());
        }
        tokio::time::sleep(consts::RECOVER_WAIT_INTERVAL).await;
    }

    error::WaitForMountSourceSnafu {
        path: source.to_path_buf(),
        timeout_secs: consts::RECOVER_WAIT_INTERVAL.as_secs() * consts::RECOVER_WAIT_ATTEMPTS,
    }
    .fail()
}

/// Whether `target` answers `stat(2)` with `ENOTCONN`, the signature of a
/// bind mount whose source daemon died.
async fn is_stale(target: &Path) -> bool {
    match tokio::fs::metadata(target).await {
        Ok(_) => false,
        Err(err) => err.raw_os_error() == Some(ENOTCONN),
    }
}
