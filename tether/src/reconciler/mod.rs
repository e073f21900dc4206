//! The mount pod lifecycle reconciler.
//!
//! One call to [`Reconciler::run`] takes an immutable pod snapshot,
//! classifies it into a [`PodState`], and drives the matching handler.
//! Handlers only act through the [`PodClient`](crate::pods::PodClient) and
//! [`Mounter`](crate::mount::Mounter) seams and are safe to invoke
//! arbitrarily many times for overlapping or stale snapshots: every mutation
//! is guarded by an idempotent check (`is_mounted`, path existence,
//! finalizer presence) rather than by locks.

mod error;
mod outcome;
mod state;
mod watch;

use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::Pod;
use tether_base::{consts::k8s::finalizers, paths};

pub use self::{
    error::Error,
    outcome::{Reconciliation, Step, StepFailure},
    state::PodState,
    watch::WatchRunner,
};
use crate::{
    ext::PodExt,
    mount::{BIND_FS_TYPE, BIND_OPTIONS, Mounter},
    pods::{self, PodClient},
};

pub struct Reconciler<P, M> {
    pods: P,
    mounter: M,
    mount_base: PathBuf,
}

impl<P, M> Reconciler<P, M>
where
    P: PodClient,
    M: Mounter,
{
    pub fn new(pods: P, mounter: M, mount_base: impl Into<PathBuf>) -> Self {
        Self { pods, mounter, mount_base: mount_base.into() }
    }

    /// Runs one reconciliation pass for `pod`.
    ///
    /// # Errors
    ///
    /// Fails only when removing the sentinel finalizer could not be
    /// persisted; an un-removed finalizer blocks the pod from disappearing,
    /// so that failure must reach the caller's retry machinery. Every other
    /// collaborator failure is absorbed into the returned
    /// [`Reconciliation`].
    pub async fn run(&self, pod: Option<&Pod>) -> Result<Reconciliation, Error> {
        let state = PodState::classify(pod);
        let Some(pod) = pod else {
            // Nothing exists to correct; the next event starts fresh.
            return Ok(Reconciliation::new(state));
        };
        match state {
            PodState::Error => Ok(self.handle_error(pod).await),
            PodState::Deleted => self.handle_deleted(pod).await,
            PodState::Ready => Ok(self.handle_ready(pod).await),
            PodState::Running => Ok(Reconciliation::requeued(state)),
        }
    }

    /// An errored mount pod is removed so a fresh one can take its place.
    /// Deletion failure is absorbed; the pod is re-evaluated on the next
    /// event rather than via an explicit retry loop.
    async fn handle_error(&self, pod: &Pod) -> Reconciliation {
        let mut outcome = Reconciliation::new(PodState::Error);
        let (namespace, name) = (pods::namespace(pod), pods::name(pod));
        tracing::info!("Mount pod {name} in namespace {namespace} is errored, deleting it");
        if let Err(err) = self.pods.delete(pod).await {
            tracing::warn!("Failed to delete errored mount pod {name}, error: {err}");
            outcome.record(Step::DeleteErrored, err);
        }
        outcome
    }

    /// A deletion-requested mount pod releases its source mount and, while
    /// consumers still reference the volume, is recreated in place.
    async fn handle_deleted(&self, pod: &Pod) -> Result<Reconciliation, Error> {
        let mut outcome = Reconciliation::new(PodState::Deleted);
        let (namespace, name) = (pods::namespace(pod), pods::name(pod));
        if !pod.has_mount_finalizer() {
            // Someone else's pod to clean up.
            return Ok(outcome);
        }

        tracing::info!("Removing mount finalizer of pod {name} in namespace {namespace}");
        let mut updated = pod.clone();
        pods::remove_finalizer(&mut updated, finalizers::MOUNT.as_str());
        self.pods.update(&updated).await.map_err(Error::from)?;

        // Recovery decisions read the snapshot taken before the finalizer
        // removal; the stored object may already be gone.
        let Some(volume_id) = pod.volume_id() else {
            return Ok(outcome);
        };

        let source = paths::source_root(&self.mount_base, &volume_id);
        tracing::info!("Unmounting volume source {}", source.display());
        if let Err(err) = self.mounter.unmount(&source).await {
            tracing::warn!("Failed to unmount {}, error: {err}", source.display());
            outcome.record(Step::UnmountSource, err);
        }

        let targets = pod.reference_targets();
        if targets.is_empty() {
            return Ok(outcome);
        }

        tracing::info!(
            "Mount pod {name} still has {} consumer target(s), recreating it",
            targets.len()
        );
        let mut replacement = pod.clone();
        pods::add_finalizer(&mut replacement, finalizers::MOUNT.as_str());
        replacement.metadata.resource_version = None;
        replacement.metadata.uid = None;
        replacement.metadata.creation_timestamp = None;
        replacement.metadata.deletion_timestamp = None;
        replacement.metadata.deletion_grace_period_seconds = None;
        replacement.metadata.managed_fields = None;
        if let Err(err) = self.pods.create(&replacement).await {
            tracing::warn!("Failed to recreate mount pod {name}, error: {err}");
            outcome.record(Step::Recreate, err);
        }
        Ok(outcome)
    }

    /// A ready mount pod must have every registered consumer target
    /// bind-mounted to its source; targets torn down by a container
    /// restart are re-bound here, each one best-effort.
    async fn handle_ready(&self, pod: &Pod) -> Reconciliation {
        let mut outcome = Reconciliation::new(PodState::Ready);
        let Some(volume_id) = pod.volume_id() else {
            return outcome;
        };
        let source = paths::bind_source(&self.mount_base, &volume_id);

        for target in pod.reference_targets() {
            let target = Path::new(&target);
            if !self.mounter.exists(target).await {
                tracing::debug!("Target {} does not exist, nothing to rebind", target.display());
                continue;
            }
            match self.mounter.is_mounted(target).await {
                Ok(true) => {
                    tracing::debug!("Target {} is already bound", target.display());
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        "Failed to probe mount state of {}, error: {err}",
                        target.display()
                    );
                    outcome.record(Step::ProbeTarget, err);
                    continue;
                }
            }
            tracing::info!("Binding {} onto {}", source.display(), target.display());
            if let Err(err) = self.mounter.mount(&source, target, BIND_FS_TYPE, &BIND_OPTIONS).await
            {
                tracing::warn!("Failed to bind {}, error: {err}", target.display());
                outcome.record(Step::BindTarget, err);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashSet},
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use k8s_openapi::{
        api::core::v1::{Pod, PodCondition, PodStatus},
        apimachinery::pkg::apis::meta::v1::Time,
    };
    use kube::core::{response::StatusSummary, Status};
    use tether_base::consts::k8s::{annotations, finalizers};

    use super::{PodState, Reconciler, Step};
    use crate::{
        ext::PodExt,
        mount::{self, Mounter},
        pods::{self, PodClient},
    };

    const MOUNT_BASE: &str = "/base";

    #[derive(Clone, Debug, PartialEq)]
    enum PodCall {
        Update(Pod),
        Delete(String),
        Create(Pod),
    }

    #[derive(Default)]
    struct FakePods {
        calls: Mutex<Vec<PodCall>>,
        fail_update: bool,
        fail_delete: bool,
    }

    impl FakePods {
        fn calls(&self) -> Vec<PodCall> { self.calls.lock().expect("fake lock").clone() }

        fn conflict(namespace: &str, pod_name: &str) -> pods::Error {
            pods::Error::UpdatePod {
                namespace: namespace.to_string(),
                pod_name: pod_name.to_string(),
                source: Box::new(kube::Error::Api(Box::new(Status {
                    status: Some(StatusSummary::Failure),
                    message: "the object has been modified".to_string(),
                    reason: "Conflict".to_string(),
                    code: 409,
                    metadata: None,
                    details: None,
                }))),
            }
        }
    }

    impl PodClient for &FakePods {
        async fn get(&self, _namespace: &str, _name: &str) -> Result<Option<Pod>, pods::Error> {
            Ok(None)
        }

        async fn update(&self, pod: &Pod) -> Result<(), pods::Error> {
            self.calls.lock().expect("fake lock").push(PodCall::Update(pod.clone()));
            if self.fail_update {
                return Err(FakePods::conflict(pods::namespace(pod), pods::name(pod)));
            }
            Ok(())
        }

        async fn delete(&self, pod: &Pod) -> Result<(), pods::Error> {
            self.calls.lock().expect("fake lock").push(PodCall::Delete(pods::name(pod).to_string()));
            if self.fail_delete {
                return Err(FakePods::conflict(pods::namespace(pod), pods::name(pod)));
            }
            Ok(())
        }

        async fn create(&self, pod: &Pod) -> Result<(), pods::Error> {
            self.calls.lock().expect("fake lock").push(PodCall::Create(pod.clone()));
            Ok(())
        }
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    enum MountCall {
        Mount { source: PathBuf, target: PathBuf, fs_type: String, options: Vec<String> },
        Unmount(PathBuf),
    }

    #[derive(Default)]
    struct FakeMounter {
        calls: Mutex<Vec<MountCall>>,
        mounted: Mutex<HashSet<PathBuf>>,
        existing: Mutex<HashSet<PathBuf>>,
    }

    impl FakeMounter {
        fn with_existing<const N: usize>(paths: [&str; N]) -> Self {
            let this = Self::default();
            this.existing
                .lock()
                .expect("fake lock")
                .extend(paths.iter().map(PathBuf::from));
            this
        }

        fn mark_mounted(&self, path: &str) {
            let inserted = self.mounted.lock().expect("fake lock").insert(PathBuf::from(path));
            assert!(inserted);
        }

        fn calls(&self) -> Vec<MountCall> { self.calls.lock().expect("fake lock").clone() }

        fn mount_calls(&self) -> Vec<MountCall> {
            self.calls()
                .into_iter()
                .filter(|call| matches!(call, MountCall::Mount { .. }))
                .collect()
        }
    }

    impl Mounter for &FakeMounter {
        async fn mount(
            &self,
            source: &Path,
            target: &Path,
            fs_type: &str,
            options: &[&str],
        ) -> Result<(), mount::Error> {
            self.calls.lock().expect("fake lock").push(MountCall::Mount {
                source: source.to_path_buf(),
                target: target.to_path_buf(),
                fs_type: fs_type.to_string(),
                options: options.iter().map(ToString::to_string).collect(),
            });
            let _newly_mounted =
                self.mounted.lock().expect("fake lock").insert(target.to_path_buf());
            Ok(())
        }

        async fn unmount(&self, target: &Path) -> Result<(), mount::Error> {
            self.calls.lock().expect("fake lock").push(MountCall::Unmount(target.to_path_buf()));
            let _was_mounted = self.mounted.lock().expect("fake lock").remove(target);
            Ok(())
        }

        async fn is_mounted(&self, target: &Path) -> Result<bool, mount::Error> {
            Ok(self.mounted.lock().expect("fake lock").contains(target))
        }

        async fn exists(&self, target: &Path) -> bool {
            self.existing.lock().expect("fake lock").contains(target)
                || self.mounted.lock().expect("fake lock").contains(target)
        }
    }

    fn mount_pod(volume_id: Option<&str>, targets: &[&str]) -> Pod {
        let mut annotations_map = BTreeMap::new();
        if let Some(volume_id) = volume_id {
            let _previous =
                annotations_map.insert(annotations::VOLUME_ID.clone(), volume_id.to_string());
        }
        for target in targets {
            let _previous =
                annotations_map.insert(annotations::reference_key(target), (*target).to_string());
        }
        let mut pod = Pod::default();
        pod.metadata.name = Some("tether-mount-vol-1".to_string());
        pod.metadata.namespace = Some("tether-system".to_string());
        pod.metadata.annotations = Some(annotations_map);
        pod
    }

    fn deleted_pod(volume_id: Option<&str>, targets: &[&str], finalizer: bool) -> Pod {
        let mut pod = mount_pod(volume_id, targets);
        pod.metadata.deletion_timestamp = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        pod.metadata.resource_version = Some("42".to_string());
        pod.metadata.uid = Some("8e9d3b9f".to_string());
        if finalizer {
            pods::add_finalizer(&mut pod, finalizers::MOUNT.as_str());
        }
        pod
    }

    fn ready_pod(volume_id: Option<&str>, targets: &[&str]) -> Pod {
        let mut pod = mount_pod(volume_id, targets);
        pod.status = Some(PodStatus {
            phase: Some("Running".to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..PodCondition::default()
            }]),
            ..PodStatus::default()
        });
        pod
    }

    #[tokio::test]
    async fn test_missing_pod_yields_terminal_error_state_without_calls() {
        let pods = FakePods::default();
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let outcome = driver.run(None).await.expect("run never fails without a pod");

        assert_eq!(outcome.state, PodState::Error);
        assert!(!outcome.requeue);
        assert!(pods.calls().is_empty());
        assert!(mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_running_pod_requeues_without_calls() {
        let pods = FakePods::default();
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = mount_pod(Some("vol-1"), &[]);
        let outcome = driver.run(Some(&pod)).await.expect("running pods never fail");

        assert_eq!(outcome.state, PodState::Running);
        assert!(outcome.requeue);
        assert!(outcome.fully_succeeded());
        assert!(pods.calls().is_empty());
        assert!(mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_errored_pod_is_deleted() {
        let pods = FakePods::default();
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let mut pod = mount_pod(Some("vol-1"), &[]);
        pod.status =
            Some(PodStatus { phase: Some("Failed".to_string()), ..PodStatus::default() });
        let outcome = driver.run(Some(&pod)).await.expect("delete failures are absorbed");

        assert_eq!(outcome.state, PodState::Error);
        assert!(!outcome.requeue);
        assert_eq!(pods.calls(), vec![PodCall::Delete("tether-mount-vol-1".to_string())]);
    }

    #[tokio::test]
    async fn test_errored_pod_delete_failure_is_absorbed() {
        let pods = FakePods { fail_delete: true, ..FakePods::default() };
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let mut pod = mount_pod(Some("vol-1"), &[]);
        pod.status =
            Some(PodStatus { phase: Some("Failed".to_string()), ..PodStatus::default() });
        let outcome = driver.run(Some(&pod)).await.expect("delete failures are absorbed");

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].step, Step::DeleteErrored);
    }

    #[tokio::test]
    async fn test_deleted_pod_without_finalizer_is_a_no_op() {
        let pods = FakePods::default();
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = deleted_pod(Some("vol-1"), &["/targets/t1"], false);
        let outcome = driver.run(Some(&pod)).await.expect("no-op never fails");

        assert_eq!(outcome.state, PodState::Deleted);
        assert!(pods.calls().is_empty());
        assert!(mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_finalizer_update_failure_propagates() {
        let pods = FakePods { fail_update: true, ..FakePods::default() };
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = deleted_pod(Some("vol-1"), &["/targets/t1"], true);
        let result = driver.run(Some(&pod)).await;

        assert!(result.is_err());
        // nothing past the finalizer update may run
        assert!(mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_pod_without_consumers_is_cleaned_up_but_not_recreated() {
        let pods = FakePods::default();
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = deleted_pod(Some("vol-1"), &[], true);
        let outcome = driver.run(Some(&pod)).await.expect("cleanup succeeds");
        assert!(outcome.fully_succeeded());

        let pod_calls = pods.calls();
        assert_eq!(pod_calls.len(), 1);
        let PodCall::Update(updated) = &pod_calls[0] else {
            panic!("expected the finalizer-removal update, got {pod_calls:?}");
        };
        assert!(!updated.has_mount_finalizer());

        assert_eq!(mounter.calls(), vec![MountCall::Unmount(PathBuf::from("/base/vol-1"))]);
    }

    #[tokio::test]
    async fn test_deleted_pod_without_volume_id_is_released_silently() {
        let pods = FakePods::default();
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = deleted_pod(None, &[], true);
        let outcome = driver.run(Some(&pod)).await.expect("cleanup succeeds");
        assert!(outcome.fully_succeeded());

        assert_eq!(pods.calls().len(), 1);
        assert!(mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recreation_preserves_bindings() {
        let pods = FakePods::default();
        let mounter = FakeMounter::default();
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = deleted_pod(Some("vol-1"), &["/targets/t1", "/targets/t2"], true);
        let outcome = driver.run(Some(&pod)).await.expect("recreation failures are absorbed");
        assert!(outcome.fully_succeeded());

        assert_eq!(mounter.calls(), vec![MountCall::Unmount(PathBuf::from("/base/vol-1"))]);

        let pod_calls = pods.calls();
        assert_eq!(pod_calls.len(), 2);
        assert!(matches!(pod_calls[0], PodCall::Update(_)));
        let PodCall::Create(replacement) = &pod_calls[1] else {
            panic!("expected a create call, got {pod_calls:?}");
        };
        assert!(replacement.has_mount_finalizer());
        assert_eq!(replacement.metadata.resource_version, None);
        assert_eq!(replacement.metadata.uid, None);
        assert_eq!(replacement.metadata.annotations, pod.metadata.annotations);
        let mut recreated_targets = replacement.reference_targets();
        recreated_targets.sort();
        assert_eq!(recreated_targets, vec!["/targets/t1", "/targets/t2"]);
    }

    #[tokio::test]
    async fn test_ready_handler_skip_rules() {
        let pods = FakePods::default();
        let mounter = FakeMounter::with_existing(["/targets/t2", "/targets/t3"]);
        mounter.mark_mounted("/targets/t2");
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = ready_pod(Some("vol-1"), &["/targets/t1", "/targets/t2", "/targets/t3"]);
        let outcome = driver.run(Some(&pod)).await.expect("bind failures are absorbed");
        assert!(outcome.fully_succeeded());

        assert_eq!(
            mounter.mount_calls(),
            vec![MountCall::Mount {
                source: PathBuf::from("/base/vol-1/vol-1"),
                target: PathBuf::from("/targets/t3"),
                fs_type: "none".to_string(),
                options: vec!["bind".to_string()],
            }]
        );
        assert!(pods.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ready_handler_is_idempotent() {
        let pods = FakePods::default();
        let mounter = FakeMounter::with_existing(["/targets/t1"]);
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = ready_pod(Some("vol-1"), &["/targets/t1"]);
        let first = driver.run(Some(&pod)).await.expect("bind failures are absorbed");
        let second = driver.run(Some(&pod)).await.expect("bind failures are absorbed");

        assert!(first.fully_succeeded());
        assert!(second.fully_succeeded());
        // the second pass sees the target already bound and stays quiet
        assert_eq!(mounter.mount_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_ready_pod_without_volume_id_is_ignored() {
        let pods = FakePods::default();
        let mounter = FakeMounter::with_existing(["/targets/t1"]);
        let driver = Reconciler::new(&pods, &mounter, MOUNT_BASE);

        let pod = ready_pod(None, &["/targets/t1"]);
        let outcome = driver.run(Some(&pod)).await.expect("no-op never fails");

        assert!(outcome.fully_succeeded());
        assert!(mounter.calls().is_empty());
    }
}
