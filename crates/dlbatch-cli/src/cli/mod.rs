//! CLI for the dlbatch batch downloader.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use dlbatch_core::config::{self, BatchConfig};
use std::path::{Path, PathBuf};

use commands::{run_batch, run_completions, run_show_config};

/// Exit code after a run stopped by Ctrl+C / SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Top-level CLI for the dlbatch batch downloader.
#[derive(Debug, Parser)]
#[command(name = "dlbatch")]
#[command(about = "dlbatch: run a list of downloads through a pool of downloader processes", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/dlbatch/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Per-run overrides of config keys.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Job list (one URL per line).
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,
    /// Directory the downloader writes into.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
    /// Concurrent workers.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
    /// Per-job timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Pause after each job and between worker launches, in seconds.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<f64>,
    /// Cookie file handed to the downloader.
    #[arg(long, value_name = "PATH")]
    pub cookies: Option<PathBuf>,
    /// Print the commands that would run and exit.
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Apply overrides on top of the loaded config and re-validate.
    pub fn apply(&self, cfg: &mut BatchConfig) -> Result<()> {
        if let Some(input) = &self.input {
            cfg.input_file = input.clone();
        }
        if let Some(dir) = &self.download_dir {
            cfg.download_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            cfg.worker_count = workers;
        }
        if let Some(timeout) = self.timeout {
            cfg.job_timeout_secs = timeout;
        }
        if let Some(interval) = self.interval {
            cfg.check_interval_secs = interval;
        }
        if let Some(cookies) = &self.cookies {
            cfg.cookies_file = cookies.clone();
        }
        cfg.validate()?;
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every URL in the job list, then retry the failures once.
    Run(RunArgs),

    /// Show the config file path and the effective configuration.
    Config,

    /// Print a shell completion script to stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn load_config(path: Option<&Path>) -> Result<BatchConfig> {
    match path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    }
}

impl CliCommand {
    /// Returns the process exit code.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run(args) => {
                let mut cfg = load_config(cli.config.as_deref())?;
                args.apply(&mut cfg)?;
                tracing::debug!("effective config: {:?}", cfg);
                return run_batch(cfg, args.dry_run).await;
            }
            CliCommand::Config => {
                let cfg = load_config(cli.config.as_deref())?;
                run_show_config(cli.config.as_deref(), &cfg)?;
            }
            CliCommand::Completions { shell } => run_completions(shell),
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests;
