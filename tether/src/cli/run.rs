use std::{path::PathBuf, sync::Arc};

use clap::Args;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use sigfinn::{ExitStatus, LifecycleManager};
use snafu::ResultExt;

use crate::{
    cli::{Error, error},
    config::Config,
    mount::SystemMounter,
    pods::KubePodClient,
    reconciler::{Reconciler, WatchRunner},
};

/// Command-line arguments for the long-running controller.
#[derive(Args, Clone)]
pub struct RunCommand {
    /// Kubernetes namespace whose mount pods are watched. If not specified,
    /// mount pods in all namespaces are watched.
    #[arg(
        short,
        long,
        help = "Kubernetes namespace whose mount pods are watched. If not specified, mount pods \
                in all namespaces are watched."
    )]
    pub namespace: Option<String>,

    /// Base directory under which mount pods expose their volume mounts.
    #[arg(
        long = "mount-base",
        help = "Base directory under which mount pods expose their volume mounts."
    )]
    pub mount_base: Option<PathBuf>,
}

impl RunCommand {
    /// Watches mount pods and reconciles each one until interrupted.
    ///
    /// # Errors
    ///
    /// Fails when the Kubernetes client cannot be built or the watch stream
    /// breaks; per-pod reconciliation failures are logged and retried
    /// instead.
    pub async fn run(self, config: Config) -> Result<(), Error> {
        let Self { namespace, mount_base } = self;

        let kube_client = kube::Client::try_default().await.context(error::KubeConfigSnafu)?;

        let namespace = namespace.or_else(|| config.namespace.clone());
        let api = match &namespace {
            Some(namespace) => Api::<Pod>::namespaced(kube_client.clone(), namespace),
            None => Api::<Pod>::all(kube_client.clone()),
        };

        let mount_base = mount_base.unwrap_or_else(|| config.mount_base.clone());
        let driver = Arc::new(Reconciler::new(
            KubePodClient::new(kube_client),
            SystemMounter,
            mount_base,
        ));

        let lifecycle_manager = LifecycleManager::<Error>::new();
        let runner = WatchRunner::new(driver, api, config.requeue_delay());
        let _handle = lifecycle_manager.spawn("controller", move |shutdown_signal| async move {
            match runner.run(shutdown_signal).await {
                Ok(()) => ExitStatus::Success,
                Err(err) => ExitStatus::Error(Error::from(err)),
            }
        });

        tracing::info!(
            "Controller started, watching mount pods in {}. Use Ctrl+C to stop.",
            namespace.as_deref().unwrap_or("all namespaces")
        );

        if let Ok(Err(err)) = lifecycle_manager.serve().await {
            tracing::error!("{err}");
            Err(err)
        } else {
            Ok(())
        }
    }
}
