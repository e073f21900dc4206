use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Configuration { source: crate::config::Error },

    #[snafu(display("{source}"))]
    Reconcile { source: crate::reconciler::Error },

    #[snafu(display("{source}"))]
    Pods { source: crate::pods::Error },

    #[snafu(display("{source}"))]
    Mount { source: crate::mount::Error },

    #[snafu(display("Failed to initialize Kubernetes client, error: {source}"))]
    KubeConfig { source: kube::Error },

    #[snafu(display("Failed to write to stdout, error: {source}"))]
    WriteStdout { source: std::io::Error },

    #[snafu(display("Could not create tokio runtime, error: {source}"))]
    InitializeTokioRuntime { source: std::io::Error },

    #[snafu(display(
        "Mount source {} did not appear within {timeout_secs} seconds", path.display()
    ))]
    WaitForMountSource { path: PathBuf, timeout_secs: u64 },
}

impl From<crate::config::Error> for Error {
    fn from(source: crate::config::Error) -> Self { Self::Configuration { source } }
}

impl From<crate::reconciler::Error> for Error {
    fn from(source: crate::reconciler::Error) -> Self { Self::Reconcile { source } }
}

impl From<crate::pods::Error> for Error {
    fn from(source: crate::pods::Error) -> Self { Self::Pods { source } }
}

impl From<crate::mount::Error> for Error {
    fn from(source: crate::mount::Error) -> Self { Self::Mount { source } }
}
