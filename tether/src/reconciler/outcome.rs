use super::{Error, PodState};

/// The result of one reconciliation pass.
///
/// Best-effort sub-steps never abort a handler; when one fails, the failure
/// is logged and recorded here so callers (and tests) can observe it
/// without parsing log output. Only a finalizer-update failure is surfaced
/// as an `Err` from [`Reconciler::run`](super::Reconciler::run).
#[derive(Debug)]
pub struct Reconciliation {
    /// The lifecycle state the pod snapshot was classified into.
    pub state: PodState,

    /// Whether the caller should schedule another reconciliation.
    pub requeue: bool,

    /// Absorbed failures, in the order the steps ran.
    pub failures: Vec<StepFailure>,
}

impl Reconciliation {
    pub(super) fn new(state: PodState) -> Self {
        Self { state, requeue: false, failures: Vec::new() }
    }

    pub(super) fn requeued(state: PodState) -> Self { Self { requeue: true, ..Self::new(state) } }

    pub(super) fn record(&mut self, step: Step, error: impl Into<Error>) {
        self.failures.push(StepFailure { step, error: error.into() });
    }

    /// Whether every attempted sub-step succeeded.
    #[must_use]
    pub fn fully_succeeded(&self) -> bool { self.failures.is_empty() }
}

/// A best-effort sub-step that failed and was absorbed.
#[derive(Debug)]
pub struct StepFailure {
    pub step: Step,
    pub error: Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Deleting a pod classified as errored.
    DeleteErrored,
    /// Unmounting the volume source root of a deletion-requested pod.
    UnmountSource,
    /// Recreating a deletion-requested pod that still has consumers.
    Recreate,
    /// Probing whether a consumer target is currently mounted.
    ProbeTarget,
    /// Bind-mounting a consumer target back onto its source.
    BindTarget,
}
