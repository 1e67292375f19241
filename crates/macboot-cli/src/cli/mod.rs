//! CLI for macboot.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use macboot_core::config::{self, MacbootConfig};

use commands::{run_check, run_checksum, run_plan, RunArgs};

/// Top-level CLI for the macboot provisioning runner.
#[derive(Debug, Parser)]
#[command(name = "macboot")]
#[command(about = "macboot: provision a fresh macOS machine from a phased plan", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run every phase of the plan, then apply config files and preferences.
    Run {
        /// Plan file (default: plan_path from config, else ~/.config/macboot/plan.toml).
        #[arg(long, value_name = "PATH")]
        plan: Option<PathBuf>,
        /// Print what each job would do without changing anything.
        #[arg(long)]
        dry_run: bool,
        /// Run up to N jobs of a batch at once, overriding every batch's own cap.
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
        /// Re-run jobs whose target is already present.
        #[arg(long)]
        force: bool,
        /// Also write the run report as JSON to this path.
        #[arg(long, value_name = "PATH")]
        report_json: Option<PathBuf>,
    },

    /// Load and validate the plan, then list its phases and jobs.
    Check {
        /// Plan file (same default as `run`).
        #[arg(long, value_name = "PATH")]
        plan: Option<PathBuf>,
    },

    /// Compute SHA-256 of a file (for the `sha256` field of download jobs).
    Checksum {
        /// Path to the file.
        path: String,
    },
}

impl CliCommand {
    /// Parse arguments, dispatch, and return the process exit code.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run {
                plan,
                dry_run,
                concurrency,
                force,
                report_json,
            } => {
                let cfg = if dry_run {
                    config::load_or_default()?
                } else {
                    config::load_or_init()?
                };
                tracing::debug!("loaded config: {:?}", cfg);
                let plan_path = resolve_plan_path(plan, &cfg)?;
                let args = RunArgs {
                    plan_path,
                    dry_run,
                    concurrency,
                    force,
                    report_json,
                };
                run_plan(&cfg, &args).await
            }
            CliCommand::Check { plan } => {
                let cfg = config::load_or_default()?;
                let plan_path = resolve_plan_path(plan, &cfg)?;
                run_check(&plan_path)?;
                Ok(0)
            }
            CliCommand::Checksum { path } => {
                run_checksum(Path::new(&path))?;
                Ok(0)
            }
        }
    }
}

/// `--plan` wins, then `plan_path` from config, then the XDG default.
fn resolve_plan_path(flag: Option<PathBuf>, cfg: &MacbootConfig) -> Result<PathBuf> {
    match flag.or_else(|| cfg.plan_path.clone()) {
        Some(p) => Ok(p),
        None => config::default_plan_path(),
    }
}

#[cfg(test)]
mod tests;
