use k8s_openapi::api::core::v1::Pod;

use crate::ext::PodExt;

/// The lifecycle states a mount pod snapshot can be in.
///
/// The set is closed; dispatch over it is an exhaustive `match`, so a new
/// state cannot be added without the compiler pointing at every handler
/// table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PodState {
    Error,
    Deleted,
    Ready,
    Running,
}

impl PodState {
    /// Maps an observed pod snapshot to exactly one lifecycle state.
    ///
    /// Deletion takes priority over every other signal because cleanup must
    /// proceed regardless of container health, and an error preempts
    /// readiness so a flapping container is never treated as healthy.
    #[must_use]
    pub fn classify(pod: Option<&Pod>) -> Self {
        let Some(pod) = pod else {
            return Self::Error;
        };
        if pod.deletion_requested() {
            return Self::Deleted;
        }
        if pod.container_errored() {
            return Self::Error;
        }
        if pod.is_ready() {
            return Self::Ready;
        }
        Self::Running
    }
}
