use k8s_openapi::api::core::v1::Pod;
use tether_base::consts::k8s::{annotations, finalizers};

/// Container waiting reasons treated as an error condition.
const ERROR_WAITING_REASONS: [&str; 4] =
    ["CrashLoopBackOff", "Error", "ErrImagePull", "ImagePullBackOff"];

pub trait PodExt {
    /// Whether a deletion has been requested for this pod.
    fn deletion_requested(&self) -> bool;

    /// Whether at least one container is in a crash or error condition.
    fn container_errored(&self) -> bool;

    /// Whether the pod is running and passing readiness.
    fn is_ready(&self) -> bool;

    /// Whether the pod carries the sentinel mount finalizer.
    fn has_mount_finalizer(&self) -> bool;

    /// The logical volume identifier this mount pod serves, if annotated.
    fn volume_id(&self) -> Option<String>;

    /// Consumer target paths registered on this pod.
    ///
    /// An annotation pair `(k, v)` is a reference exactly when `k` equals
    /// the derived key of `v`; every other annotation is ignored.
    fn reference_targets(&self) -> Vec<String>;
}

impl PodExt for Pod {
    fn deletion_requested(&self) -> bool { self.metadata.deletion_timestamp.is_some() }

    fn container_errored(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        if matches!(status.phase.as_deref(), Some("Failed" | "Unknown")) {
            return true;
        }
        status.container_statuses.iter().flatten().any(|container| {
            container
                .state
                .as_ref()
                .and_then(|state| state.waiting.as_ref())
                .and_then(|waiting| waiting.reason.as_deref())
                .is_some_and(|reason| ERROR_WAITING_REASONS.contains(&reason))
        })
    }

    fn is_ready(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        if status.phase.as_deref() != Some("Running") {
            return false;
        }
        status
            .conditions
            .iter()
            .flatten()
            .any(|condition| condition.type_ == "Ready" && condition.status == "True")
    }

    fn has_mount_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .iter()
            .flatten()
            .any(|finalizer| finalizer == finalizers::MOUNT.as_str())
    }

    fn volume_id(&self) -> Option<String> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(annotations::VOLUME_ID.as_str()))
            .cloned()
    }

    fn reference_targets(&self) -> Vec<String> {
        self.metadata
            .annotations
            .iter()
            .flatten()
            .filter(|(key, value)| **key == annotations::reference_key(value))
            .map(|(_, value)| value.clone())
            .collect()
    }
}
