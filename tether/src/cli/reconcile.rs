use std::{io::Write, path::PathBuf};

use clap::Args;
use snafu::ResultExt;

use crate::{
    cli::{Error, error},
    config::Config,
    mount::SystemMounter,
    pods::{KubePodClient, PodClient},
    reconciler::Reconciler,
};

/// Command-line arguments for a single reconciliation pass.
#[derive(Args, Clone)]
pub struct ReconcileCommand {
    /// Name of the mount pod to reconcile.
    #[arg(help = "Name of the mount pod to reconcile.")]
    pub pod_name: String,

    /// Kubernetes namespace of the mount pod. If not specified, the default
    /// namespace will be used.
    #[arg(
        short,
        long,
        help = "Kubernetes namespace of the mount pod. If not specified, the default namespace \
                will be used."
    )]
    pub namespace: Option<String>,

    /// Base directory under which mount pods expose their volume mounts.
    #[arg(
        long = "mount-base",
        help = "Base directory under which mount pods expose their volume mounts."
    )]
    pub mount_base: Option<PathBuf>,
}

impl ReconcileCommand {
    /// Reads the pod, runs one reconciliation pass, and prints the outcome.
    ///
    /// # Errors
    ///
    /// Fails when the Kubernetes client cannot be built, the pod cannot be
    /// read, or the pass itself fails.
    pub async fn run(self, config: Config) -> Result<(), Error> {
        let Self { pod_name, namespace, mount_base } = self;

        let kube_client = kube::Client::try_default().await.context(error::KubeConfigSnafu)?;
        let namespace = namespace
            .or_else(|| config.namespace.clone())
            .unwrap_or_else(|| kube_client.default_namespace().to_string());

        let pods = KubePodClient::new(kube_client);
        let snapshot = pods.get(&namespace, &pod_name).await?;

        let mount_base = mount_base.unwrap_or_else(|| config.mount_base.clone());
        let driver = Reconciler::new(pods, SystemMounter, mount_base);
        let outcome = driver.run(snapshot.as_ref()).await?;

        let mut stdout = std::io::stdout();
        writeln!(stdout, "state: {:?}", outcome.state).context(error::WriteStdoutSnafu)?;
        writeln!(stdout, "requeue: {}", outcome.requeue).context(error::WriteStdoutSnafu)?;
        for failure in &outcome.failures {
            writeln!(stdout, "failed step {:?}: {}", failure.step, failure.error)
                .context(error::WriteStdoutSnafu)?;
        }

        Ok(())
    }
}
