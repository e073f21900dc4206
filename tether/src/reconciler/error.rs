use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}"))]
    Pods { source: crate::pods::Error },

    #[snafu(display("{source}"))]
    Mount { source: crate::mount::Error },

    #[snafu(display("Failed to watch mount pods, error: {source}"))]
    WatchPods {
        #[snafu(source(from(kube::runtime::watcher::Error, Box::new)))]
        source: Box<kube::runtime::watcher::Error>,
    },
}

impl From<crate::pods::Error> for Error {
    fn from(source: crate::pods::Error) -> Self { Self::Pods { source } }
}

impl From<crate::mount::Error> for Error {
    fn from(source: crate::mount::Error) -> Self { Self::Mount { source } }
}
