//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{AirpodsError, Result};
use crate::orchestrator::{CleanOptions, CleanTargets, StartOptions, StopOptions};

/// airpods - Local AI services on rootless Podman.
#[derive(Parser, Debug)]
#[command(name = "airpods")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file (`AIRPODS_CONFIG` takes precedence).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start services (all enabled services if none are named).
    Start {
        /// Services to start.
        services: Vec<String>,

        /// Write the default configuration first if none exists.
        #[arg(long)]
        init: bool,

        /// Replace outdated containers without asking.
        #[arg(short, long)]
        force: bool,

        /// Pull images one at a time.
        #[arg(long)]
        sequential: bool,

        /// Use CPU images and attach no GPU.
        #[arg(long)]
        cpu: bool,

        /// Pull images even if present.
        #[arg(long)]
        pull: bool,
    },

    /// Stop services.
    Stop {
        /// Services to stop.
        services: Vec<String>,

        /// Remove pods after stopping them.
        #[arg(short, long)]
        remove: bool,

        /// Skip the removal confirmation.
        #[arg(short, long)]
        force: bool,

        /// Grace period in seconds.
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Show service status.
    Status {
        /// Services to show.
        services: Vec<String>,
    },

    /// Remove airpods resources (at least one category is required).
    Clean {
        /// Everything below.
        #[arg(short, long)]
        all: bool,

        /// Pods and containers.
        #[arg(long)]
        pods: bool,

        /// Volumes and bind directories.
        #[arg(long)]
        volumes: bool,

        /// Service images.
        #[arg(long)]
        images: bool,

        /// The shared network.
        #[arg(long)]
        network: bool,

        /// Configuration file and shared secret.
        #[arg(long)]
        configs: bool,

        /// Skip confirmations.
        #[arg(short, long)]
        force: bool,

        /// Show what would be removed.
        #[arg(long)]
        dry_run: bool,

        /// Do not back up config.toml before removing it.
        #[arg(long)]
        no_backup_config: bool,
    },

    /// Show container logs.
    Logs {
        /// Service name.
        service: String,

        /// Number of lines to show.
        #[arg(short = 'n', long)]
        tail: Option<u32>,
    },

    /// Inspect the resolved configuration.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Check tools, engine and GPU detection.
    Doctor,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigCommands {
    /// Print the merged, template-expanded configuration.
    Show,

    /// Print the path of the loaded configuration file.
    Path,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Commands {
    /// Builds start options from `start` flags.
    #[must_use]
    pub const fn start_options(force: bool, pull: bool, sequential: bool) -> StartOptions {
        StartOptions {
            force,
            always_pull: pull,
            sequential,
        }
    }

    /// Builds stop options from `stop` flags.
    #[must_use]
    pub const fn stop_options(remove: bool, force: bool, timeout: Option<u64>) -> StopOptions {
        StopOptions {
            remove,
            force,
            timeout,
        }
    }

    /// Builds clean options from `clean` flags; `--all` selects every
    /// category.
    ///
    /// # Errors
    ///
    /// Returns [`AirpodsError::NoCleanTargets`] when neither `--all` nor any
    /// category flag is given.
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn clean_options(
        all: bool,
        targets: CleanTargets,
        force: bool,
        dry_run: bool,
        no_backup_config: bool,
    ) -> Result<CleanOptions> {
        let targets = if all { CleanTargets::all() } else { targets };
        if targets.categories().is_empty() {
            return Err(AirpodsError::NoCleanTargets);
        }
        Ok(CleanOptions {
            targets,
            force,
            dry_run,
            backup_config: !no_backup_config,
        })
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        let cli = Cli::try_parse_from(["airpods", "start", "ollama", "webui", "--cpu", "--force"]).unwrap();
        match cli.command {
            Commands::Start { services, cpu, force, init, .. } => {
                assert_eq!(services, ["ollama", "webui"]);
                assert!(cpu);
                assert!(force);
                assert!(!init);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_clean_requires_a_category() {
        let cli = Cli::try_parse_from(["airpods", "clean", "--force"]).unwrap();
        let Commands::Clean { all, force, dry_run, no_backup_config, .. } = cli.command else {
            panic!("expected clean");
        };
        let result = Commands::clean_options(all, CleanTargets::default(), force, dry_run, no_backup_config);
        assert!(matches!(result, Err(AirpodsError::NoCleanTargets)));
    }

    #[test]
    fn test_clean_selected_categories() {
        let options = Commands::clean_options(true, CleanTargets::default(), false, true, false).unwrap();
        assert_eq!(options.targets, CleanTargets::all());
        assert!(options.backup_config);

        let volumes = CleanTargets {
            volumes: true,
            ..CleanTargets::default()
        };
        let options = Commands::clean_options(false, volumes, true, false, true).unwrap();
        assert_eq!(options.targets, volumes);
        assert!(!options.backup_config);
    }

    #[test]
    fn test_config_flag_is_only_the_flag() {
        let cli = Cli::try_parse_from(["airpods", "status"]).unwrap();
        assert!(cli.config.is_none());

        let cli = Cli::try_parse_from(["airpods", "--config", "/etc/airpods.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/airpods.toml")));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["airpods", "status", "--output", "json", "-v"]).unwrap();
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(cli.verbose);
    }
}
