mod error;
mod log;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use resolve_path::PathResolveExt;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

pub use self::{error::Error, log::LogConfig};
use crate::consts;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Namespace whose mount pods are watched; all namespaces when unset.
    pub namespace: Option<String>,

    /// Base directory under which mount pods expose their volume mounts.
    #[serde(default = "default_mount_base")]
    pub mount_base: PathBuf,

    /// Delay, in seconds, before a still-converging pod is reconciled
    /// again.
    #[serde(default = "default_requeue_delay_secs")]
    pub requeue_delay_secs: u64,

    #[serde(default = "LogConfig::default")]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            mount_base: default_mount_base(),
            requeue_delay_secs: default_requeue_delay_secs(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn search_config_file_path() -> PathBuf {
        let paths = vec![Self::default_path()]
            .into_iter()
            .chain(tether_base::fallback_project_config_directories().into_iter().map(
                |mut path| {
                    path.push(tether_base::CLI_CONFIG_NAME);
                    path
                },
            ))
            .collect::<Vec<_>>();
        for path in paths {
            let Ok(exists) = path.try_exists() else {
                continue;
            };
            if exists {
                return path;
            }
        }
        Self::default_path()
    }

    #[inline]
    pub fn default_path() -> PathBuf {
        [tether_base::PROJECT_CONFIG_DIR.to_path_buf(), PathBuf::from(tether_base::CLI_CONFIG_NAME)]
            .into_iter()
            .collect()
    }

    /// Loads the configuration from `path`, resolving `~` style prefixes.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be resolved, read, or parsed.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut config: Self = {
            let path =
                path.as_ref().try_resolve().map(|path| path.to_path_buf()).with_context(|_| {
                    error::ResolveFilePathSnafu { file_path: path.as_ref().to_path_buf() }
                })?;
            let data =
                std::fs::read(&path).context(error::OpenConfigSnafu { filename: path.clone() })?;
            serde_yaml::from_slice(&data).context(error::ParseConfigSnafu { filename: path })?
        };

        config.log.file_path = match config.log.file_path.map(|path| {
            path.try_resolve()
                .map(|path| path.to_path_buf())
                .with_context(|_| error::ResolveFilePathSnafu { file_path: path.clone() })
        }) {
            Some(Ok(path)) => Some(path),
            Some(Err(err)) => return Err(err),
            None => None,
        };

        Ok(config)
    }

    /// The default configuration rendered as YAML.
    #[must_use]
    pub fn template_basic() -> Vec<u8> {
        serde_yaml::to_string(&Self::default()).map_or_else(|_| Vec::new(), String::into_bytes)
    }

    #[must_use]
    pub const fn requeue_delay(&self) -> Duration { Duration::from_secs(self.requeue_delay_secs) }
}

fn default_mount_base() -> PathBuf { PathBuf::from(consts::DEFAULT_MOUNT_BASE) }

const fn default_requeue_delay_secs() -> u64 { consts::DEFAULT_REQUEUE_DELAY_SECS }
