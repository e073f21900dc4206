//! The event-delivery shim around the reconciler.
//!
//! A `watcher` stream over mount pods feeds every applied snapshot into the
//! driver. Requeues (and propagated reconciliation errors) are serviced by
//! a per-pod background task that re-reads the pod and runs the driver
//! again after a delay; at most one such task exists per pod identity, so
//! the reconciler is never invoked concurrently for the same pod.

use std::{
    collections::HashSet,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{FutureExt, StreamExt, TryStreamExt, pin_mut};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Api,
    runtime::{WatchStreamExt, watcher},
};
use snafu::IntoError;
use tether_base::{PROJECT_NAME, consts::k8s::labels};

use super::{Error, Reconciler, error};
use crate::{
    mount::SystemMounter,
    pods::{self, KubePodClient},
};

type Driver = Reconciler<KubePodClient, SystemMounter>;

pub struct WatchRunner {
    driver: Arc<Driver>,
    api: Api<Pod>,
    requeue_delay: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl WatchRunner {
    #[must_use]
    pub fn new(driver: Arc<Driver>, api: Api<Pod>, requeue_delay: Duration) -> Self {
        Self { driver, api, requeue_delay, in_flight: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Watches mount pods until the stream ends or `shutdown_signal`
    /// resolves.
    ///
    /// # Errors
    ///
    /// Fails when the watch stream itself breaks; individual
    /// reconciliation failures are logged and retried, never fatal.
    pub async fn run(
        self,
        shutdown_signal: impl Future<Output = ()> + Send + Unpin + 'static,
    ) -> Result<(), Error> {
        let config = watcher::Config::default()
            .labels(&format!("{}={PROJECT_NAME}", labels::MANAGED_BY));
        let stream = watcher(self.api.clone(), config).applied_objects();
        pin_mut!(stream);
        let mut shutdown_signal = shutdown_signal.into_stream();

        loop {
            let maybe_pod = tokio::select! {
                _ = shutdown_signal.next() => break,
                pod = stream.try_next() => pod,
            };
            match maybe_pod {
                Ok(Some(pod)) => self.dispatch(pod),
                Ok(None) => break,
                Err(source) => return Err(error::WatchPodsSnafu.into_error(source)),
            }
        }
        Ok(())
    }

    /// Hands one pod snapshot to a background reconciliation task, unless
    /// the pod is already being reconciled.
    fn dispatch(&self, pod: Pod) {
        let key = format!("{}/{}", pods::namespace(&pod), pods::name(&pod));
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight set is never poisoned");
            if !in_flight.insert(key.clone()) {
                tracing::debug!("Pod {key} is already being reconciled, dropping event");
                return;
            }
        }

        let driver = Arc::clone(&self.driver);
        let api = self.api.clone();
        let delay = self.requeue_delay;
        let in_flight = Arc::clone(&self.in_flight);
        let name = pods::name(&pod).to_string();

        drop(tokio::spawn(async move {
            let mut snapshot = Some(pod);
            loop {
                let requeue = match driver.run(snapshot.as_ref()).await {
                    Ok(outcome) => outcome.requeue,
                    Err(err) => {
                        tracing::error!("Reconciliation of pod {name} failed, error: {err}");
                        true
                    }
                };
                if !requeue {
                    break;
                }
                tokio::time::sleep(delay).await;
                snapshot = match api.get_opt(&name).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        tracing::warn!("Failed to re-read pod {name}, error: {err}");
                        break;
                    }
                };
            }
            let _was_tracked =
                in_flight.lock().expect("in-flight set is never poisoned").remove(&key);
        }));
    }
}
