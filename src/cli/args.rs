//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{parse_duration, Config};

#[derive(Parser, Debug)]
#[command(name = "idlewatch")]
#[command(author, version, about = "Stop an idle container and clear its cache", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Path to a TOML config file (default: ./idlewatch.toml if present)
    #[arg(long, short, global = true, env = "IDLEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "IDLEWATCH_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Container to watch
    #[arg(long, global = true, env = "IDLEWATCH_CONTAINER")]
    pub container: Option<String>,

    /// Inactivity before stopping (e.g. 15m, 1h30m, 900)
    #[arg(long, global = true, value_parser = parse_duration, env = "IDLEWATCH_THRESHOLD")]
    pub threshold: Option<Duration>,

    /// Time between checks (e.g. 60s, 1m)
    #[arg(long, global = true, value_parser = parse_duration, env = "IDLEWATCH_INTERVAL")]
    pub interval: Option<Duration>,

    /// Directory whose contents are removed after a stop
    #[arg(long, global = true, env = "IDLEWATCH_CACHE_TARGET")]
    pub cache_target: Option<PathBuf>,

    /// Docker daemon address (unix:///var/run/docker.sock, tcp://host:2375)
    #[arg(long, global = true, env = "IDLEWATCH_DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Match the first container whose name contains --container
    #[arg(long, global = true, env = "IDLEWATCH_MATCH_SUBSTRING")]
    pub match_substring: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Watch the container until it disappears or Ctrl+C
    Run {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },

    /// Inspect the container and classify its recent output without acting
    Check,

    /// Classify log lines from a file (or stdin) with the configured signatures
    Classify {
        /// Log file to read; stdin when omitted
        file: Option<PathBuf>,
    },

    /// Clear the cache target now
    Clean {
        /// Show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration
    Config,
}

impl Args {
    /// Flags (and their env vars) win over the config file
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref name) = self.container {
            config.container_name = name.clone();
        }
        if let Some(threshold) = self.threshold {
            config.inactivity_threshold = threshold;
        }
        if let Some(interval) = self.interval {
            config.poll_interval = interval;
        }
        if let Some(ref target) = self.cache_target {
            config.cache_target = Some(target.clone());
        }
        if let Some(ref host) = self.docker_host {
            config.runtime.host = Some(host.clone());
        }
        if self.match_substring {
            config.runtime.match_substring = true;
        }
    }
}
