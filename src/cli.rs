//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

use crate::config::{FailurePolicy, MirrorConfig};
use crate::orchestrator::RunMode;

/// Back up emulator saves and configuration from a handheld
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// TOML configuration file (endpoints, profiles, archive naming)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Phases to run
    #[arg(long, value_enum, default_value_t = RunMode::Full)]
    pub mode: RunMode,

    /// Local mirror root (wiped at the start of every download)
    #[arg(long)]
    pub mirror_root: Option<PathBuf>,

    /// Directory on the backup host that receives the timestamped archives
    #[arg(long)]
    pub archive_base: Option<String>,

    /// Source label used in archive directory names
    #[arg(long)]
    pub label: Option<String>,

    /// What to do when a single download fails
    #[arg(long, value_enum)]
    pub download_failures: Option<FailurePolicy>,

    /// What to do when a single upload fails
    #[arg(long, value_enum)]
    pub upload_failures: Option<FailurePolicy>,

    /// Append a line per transfer to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Debug-level console logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the configured profiles and exit
    #[arg(long)]
    pub list_profiles: bool,
}

impl Args {
    /// Flags take precedence over the file and the environment
    pub fn apply(&self, config: &mut MirrorConfig) {
        if let Some(root) = &self.mirror_root {
            config.mirror_root = root.clone();
        }
        if let Some(base) = &self.archive_base {
            config.archive_base = base.clone();
        }
        if let Some(label) = &self.label {
            config.archive_label = label.clone();
        }
        if let Some(policy) = self.download_failures {
            config.download_failures = policy;
        }
        if let Some(policy) = self.upload_failures {
            config.upload_failures = policy;
        }
    }
}
