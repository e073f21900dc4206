use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to run mount for {}, error: {source}", target.display()))]
    RunMountCommand { target: PathBuf, source: std::io::Error },

    #[snafu(display(
        "mount {} -> {} failed: {stderr}", source_path.display(), target.display()
    ))]
    MountFailed { source_path: PathBuf, target: PathBuf, stderr: String },

    #[snafu(display("Failed to run umount for {}, error: {source}", target.display()))]
    RunUnmountCommand { target: PathBuf, source: std::io::Error },

    #[snafu(display("umount {} failed: {stderr}", target.display()))]
    UnmountFailed { target: PathBuf, stderr: String },

    #[snafu(display("Failed to read the mount table, error: {source}"))]
    ReadMountTable { source: std::io::Error },
}
