//! `macboot run`: execute the plan's phases, then the post-run steps.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use macboot_core::adapters::{BashShell, Defaults, Hdiutil, Homebrew, PlaceholderTemplater};
use macboot_core::config::MacbootConfig;
use macboot_core::dmg::DmgInstaller;
use macboot_core::environment::Environment;
use macboot_core::fetcher::{FetchOptions, FetchTimeouts, RetryingFetcher};
use macboot_core::plan::Plan;
use macboot_core::post::PostRun;
use macboot_core::runner::{
    BatchExecutor, DryRunRunner, JobRunner, PhaseRunner, ProvisionRunner, RunReport, RunSettings,
};

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub plan_path: PathBuf,
    pub dry_run: bool,
    pub concurrency: Option<usize>,
    pub force: bool,
    pub report_json: Option<PathBuf>,
}

/// Returns the process exit code: 0 unless an abort-on-failure phase failed.
pub async fn run_plan(cfg: &MacbootConfig, args: &RunArgs) -> Result<i32> {
    let plan = Plan::load(&args.plan_path)
        .with_context(|| format!("load plan {}", args.plan_path.display()))?;
    tracing::info!(
        plan = %args.plan_path.display(),
        phases = plan.phases.len(),
        jobs = plan.job_count(),
        dry_run = args.dry_run,
        "starting run"
    );

    let env = Environment::from_process();
    let runner: Arc<dyn JobRunner> = if args.dry_run {
        Arc::new(DryRunRunner)
    } else {
        Arc::new(provision_runner(cfg, args.force))
    };
    let phases = PhaseRunner::new(BatchExecutor::new(runner), cfg.concurrency)
        .with_cap_override(args.concurrency);
    let (mut report, env) = phases.run(&plan.phases, env).await;

    if report.aborted() {
        tracing::warn!("run aborted; skipping config files, preferences and restarts");
    } else {
        let post = PostRun::new(
            Arc::new(PlaceholderTemplater),
            Arc::new(Defaults::default()),
            Arc::new(BashShell::default()),
        )
        .dry_run(args.dry_run);
        report.push_steps(post.apply(&plan, &env));
    }

    print!("{}", report.render());
    if let Some(path) = &args.report_json {
        write_report_json(&report, path)?;
    }

    let code = report.exit_code();
    tracing::info!(exit_code = code, "run finished");
    Ok(code)
}

fn provision_runner(cfg: &MacbootConfig, force: bool) -> ProvisionRunner {
    let brew = Arc::new(Homebrew::new(cfg.brew_path.clone(), cfg.effective_app_dirs()));
    let fetcher = RetryingFetcher::curl();
    let dmg = DmgInstaller::new(fetcher.clone(), Arc::new(Hdiutil::default()), brew.clone());
    let settings = RunSettings {
        install_dir: cfg.install_dir.clone(),
        fetch: FetchOptions {
            retry: cfg.retry.policy(),
            timeouts: FetchTimeouts {
                connect: cfg.timeouts.connect(),
                total: cfg.timeouts.total(),
            },
        },
        force,
    };
    ProvisionRunner::new(brew, Arc::new(BashShell::default()), fetcher, dmg, settings)
}

fn write_report_json(report: &RunReport, path: &std::path::Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("write report {}", path.display()))?;
    tracing::info!("wrote JSON report to {}", path.display());
    Ok(())
}
