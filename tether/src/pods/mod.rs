//! The pod-resource seam.
//!
//! All persisted pod state flows through the [`PodClient`] trait; the
//! reconciler itself never mutates anything in place. [`KubePodClient`] is
//! the production implementation over the Kubernetes API.

mod error;

use k8s_openapi::api::core::v1::Pod;
use kube::{
    Api,
    api::{DeleteParams, PostParams},
};
use snafu::ResultExt;

pub use self::error::Error;

pub trait PodClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error>;

    /// Persists metadata changes; fails with a conflict if the stored
    /// version changed concurrently.
    async fn update(&self, pod: &Pod) -> Result<(), Error>;

    async fn delete(&self, pod: &Pod) -> Result<(), Error>;

    /// Rejected by the API server when the supplied object still carries a
    /// stale resource version; callers clear it before recreation.
    async fn create(&self, pod: &Pod) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct KubePodClient {
    client: kube::Client,
}

impl KubePodClient {
    #[must_use]
    pub const fn new(client: kube::Client) -> Self { Self { client } }

    fn api_for(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl PodClient for KubePodClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error> {
        self.api_for(namespace).get_opt(name).await.with_context(|_| error::GetPodSnafu {
            namespace: namespace.to_string(),
            pod_name: name.to_string(),
        })
    }

    async fn update(&self, pod: &Pod) -> Result<(), Error> {
        let (namespace, pod_name) = (namespace(pod), name(pod));
        self.api_for(namespace)
            .replace(pod_name, &PostParams::default(), pod)
            .await
            .map(|_pod| ())
            .with_context(|_| error::UpdatePodSnafu {
                namespace: namespace.to_string(),
                pod_name: pod_name.to_string(),
            })
    }

    async fn delete(&self, pod: &Pod) -> Result<(), Error> {
        let (namespace, pod_name) = (namespace(pod), name(pod));
        self.api_for(namespace)
            .delete(pod_name, &DeleteParams::default())
            .await
            .map(|_status| ())
            .with_context(|_| error::DeletePodSnafu {
                namespace: namespace.to_string(),
                pod_name: pod_name.to_string(),
            })
    }

    async fn create(&self, pod: &Pod) -> Result<(), Error> {
        let (namespace, pod_name) = (namespace(pod), name(pod));
        self.api_for(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map(|_pod| ())
            .with_context(|_| error::CreatePodSnafu {
                namespace: namespace.to_string(),
                pod_name: pod_name.to_string(),
            })
    }
}

#[must_use]
pub fn name(pod: &Pod) -> &str { pod.metadata.name.as_deref().unwrap_or_default() }

#[must_use]
pub fn namespace(pod: &Pod) -> &str { pod.metadata.namespace.as_deref().unwrap_or("default") }

/// Adds `finalizer` to the pod's finalizer list with set semantics.
pub fn add_finalizer(pod: &mut Pod, finalizer: &str) {
    let finalizers = pod.metadata.finalizers.get_or_insert_with(Vec::new);
    if !finalizers.iter().any(|existing| existing == finalizer) {
        finalizers.push(finalizer.to_string());
    }
}

/// Removes `finalizer` from the pod's finalizer list; absent entries are a
/// no-op.
pub fn remove_finalizer(pod: &mut Pod, finalizer: &str) {
    if let Some(finalizers) = &mut pod.metadata.finalizers {
        finalizers.retain(|existing| existing != finalizer);
        if finalizers.is_empty() {
            pod.metadata.finalizers = None;
        }
    }
}
