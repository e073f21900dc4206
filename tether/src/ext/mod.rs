//! Extensions to Kubernetes API types.
//!
//! The reconciler never inspects raw pod metadata directly; the traits here
//! extend `k8s_openapi` types with the derived signals and annotation-schema
//! accessors it works with.

mod pod;

pub use self::pod::PodExt;
