//! The `tether` command line interface.
//!
//! ```bash
//! # Run the controller against the current cluster context
//! tether run
//!
//! # Reconcile a single mount pod once and print the outcome
//! tether reconcile --namespace tether-system tether-mount-vol-1
//!
//! # From inside a mount pod: re-bind stale consumer targets
//! tether recover --volume-id vol-1
//! ```

pub mod error;
mod reconcile;
mod recover;
mod run;

use std::{io::Write, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use snafu::ResultExt;
use tokio::runtime::Runtime;

pub use self::error::Error;
use self::{reconcile::ReconcileCommand, recover::RecoverCommand, run::RunCommand};
use crate::config::Config;

#[derive(Parser)]
#[command(
    name = tether_base::CLI_PROGRAM_NAME,
    author,
    version,
    about = "Tether: keeps workload bind mounts tethered to their mount pods.",
    color = clap::ColorChoice::Always
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Option<Commands>,

    /// Path to the configuration file.
    #[clap(
        long = "config",
        short = 'c',
        env = "TETHER_CONFIG_FILE_PATH",
        help = "Specify a configuration file. Defaults to ~/.config/tether/config.yaml or \
                TETHER_CONFIG_FILE_PATH env var."
    )]
    config_file: Option<PathBuf>,

    /// Overrides the configured logging level.
    #[clap(
        long = "log-level",
        env = "TETHER_LOG_LEVEL",
        help = "Set the logging level (e.g., info, debug, trace)."
    )]
    log_level: Option<tracing::Level>,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Displays version information.
    #[command(about = "Display version information")]
    Version,

    /// Generates a shell completion script.
    #[command(about = "Generate shell completion script for the specified shell (bash, zsh, fish)")]
    Completions { shell: clap_complete::Shell },

    /// Outputs the default configuration in YAML format.
    #[command(about = "Output the default configuration in YAML format")]
    DefaultConfig,

    /// Runs the mount pod controller.
    #[command(alias = "r", about = "Watch mount pods and keep their consumer bind mounts intact")]
    Run(RunCommand),

    /// Reconciles a single mount pod once.
    #[command(about = "Reconcile a single mount pod once and print the outcome")]
    Reconcile(ReconcileCommand),

    /// Re-binds stale consumer targets from inside a mount pod.
    #[command(about = "Re-bind stale consumer targets of a volume from inside its mount pod")]
    Recover(RecoverCommand),
}

impl Default for Cli {
    fn default() -> Self { Self::parse() }
}

impl Cli {
    fn load_config(&self) -> Result<Config, Error> {
        let mut config =
            Config::load(self.config_file.clone().unwrap_or_else(Config::search_config_file_path))?;

        if let Some(log_level) = self.log_level {
            config.log.level = log_level;
        }

        Ok(config)
    }

    /// Dispatches the parsed subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error when configuration loading, runtime setup, or the
    /// selected subcommand fails.
    pub fn run(self) -> Result<i32, Error> {
        match self.commands {
            Some(Commands::Version) => {
                std::io::stdout()
                    .write_all(Self::command().render_long_version().as_bytes())
                    .context(error::WriteStdoutSnafu)?;
                return Ok(0);
            }
            Some(Commands::Completions { shell }) => {
                let mut app = Self::command();
                let bin_name = app.get_name().to_string();
                clap_complete::generate(shell, &mut app, bin_name, &mut std::io::stdout());
                return Ok(0);
            }
            Some(Commands::DefaultConfig) => {
                std::io::stdout()
                    .write_all(Config::template_basic().as_slice())
                    .context(error::WriteStdoutSnafu)?;
                return Ok(0);
            }
            _ => {}
        }

        let config = self.load_config()?;
        config.log.init_global();

        let fut = async move {
            match self.commands {
                Some(Commands::Run(cmd)) => cmd.run(config).await?,
                Some(Commands::Reconcile(cmd)) => cmd.run(config).await?,
                Some(Commands::Recover(cmd)) => cmd.run(config).await?,
                _ => {
                    let help = Self::command().render_long_help().ansi().to_string();
                    std::io::stderr()
                        .write_all(help.as_bytes())
                        .context(error::WriteStdoutSnafu)?;
                    return Ok(-1);
                }
            }

            Ok(0)
        };

        Runtime::new().context(error::InitializeTokioRuntimeSnafu)?.block_on(fut)
    }
}
