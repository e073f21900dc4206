use std::time::Duration;

/// Base directory under which mount pods expose their volume mounts on the
/// node, unless overridden by configuration.
pub const DEFAULT_MOUNT_BASE: &str = "/var/lib/tether/volumes";

/// Delay before a pod classified as still-converging is reconciled again.
pub const DEFAULT_REQUEUE_DELAY_SECS: u64 = 10;

/// How often `tether recover` probes for the bind source to appear.
pub const RECOVER_WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// How many probes `tether recover` makes before giving up.
pub const RECOVER_WAIT_ATTEMPTS: u64 = 30;
