//! Definitions shared with the provisioning collaborator.
//!
//! Both the controller and the component that creates mount pods read and
//! write the annotation schema defined here. Keeping one definition in this
//! crate prevents the two sides from drifting apart.

pub mod k8s {
    pub mod labels {
        pub const NAME: &str = "app.kubernetes.io/name";
        pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    }

    pub mod annotations {
        use std::sync::LazyLock;

        use sha2::{Digest, Sha256};

        use crate::PROJECT_NAME;

        /// Kubernetes caps annotation key names at 63 characters.
        pub const MAX_KEY_LEN: usize = 63;

        /// The annotation holding the logical volume identifier served by a
        /// mount pod.
        pub static VOLUME_ID: LazyLock<String> =
            LazyLock::new(|| format!("{PROJECT_NAME}.storage/volume-id"));

        /// Derives the annotation key recording that `target` consumes a
        /// mount pod's volume.
        ///
        /// A reference annotation stores the consumer target path verbatim
        /// as its value, keyed by this deterministic encoding of that path.
        /// An annotation pair `(k, v)` is a reference exactly when
        /// `k == reference_key(v)`; both the writer (the provisioner) and
        /// the controller rely on that test.
        #[must_use]
        pub fn reference_key(target: &str) -> String {
            let digest = Sha256::digest(target.as_bytes());
            let mut key = format!("{PROJECT_NAME}-{digest:x}");
            key.truncate(MAX_KEY_LEN);
            key
        }
    }

    pub mod finalizers {
        use std::sync::LazyLock;

        use crate::PROJECT_NAME;

        /// The sentinel finalizer marking a mount pod whose source mount
        /// must be released before the pod may disappear.
        pub static MOUNT: LazyLock<String> =
            LazyLock::new(|| format!("{PROJECT_NAME}.storage/finalizer"));
    }
}

#[cfg(test)]
mod tests {
    use super::k8s::annotations::{MAX_KEY_LEN, reference_key};

    #[test]
    fn test_reference_key_is_deterministic() {
        let target = "/var/lib/kubelet/pods/uid/volumes/kubernetes.io~csi/vol-1/mount";
        assert_eq!(reference_key(target), reference_key(target));
    }

    #[test]
    fn test_reference_key_fits_annotation_name_limit() {
        let key = reference_key("/some/very/long/target/path/that/kubelet/would/hand/us");
        assert_eq!(key.len(), MAX_KEY_LEN);
        assert!(key.starts_with("tether-"));
    }

    #[test]
    fn test_reference_key_distinguishes_targets() {
        assert_ne!(reference_key("/target/a"), reference_key("/target/b"));
    }
}
