//! `macboot check`: validate the plan and list what a run would do.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use macboot_core::plan::Plan;

pub fn run_check(plan_path: &Path) -> Result<()> {
    let plan =
        Plan::load(plan_path).with_context(|| format!("load plan {}", plan_path.display()))?;
    print!("{}", describe_plan(&plan));
    println!("plan OK: {}", plan_path.display());
    Ok(())
}

pub(crate) fn describe_plan(plan: &Plan) -> String {
    let mut out = String::new();
    for phase in &plan.phases {
        let policy = if phase.abort_on_failure {
            "abort on failure"
        } else {
            "continue on failure"
        };
        let _ = writeln!(out, "phase {} ({}, {} jobs)", phase.name, policy, phase.job_count());
        for (i, batch) in phase.batches.iter().enumerate() {
            let cap = batch
                .concurrency
                .map(|c| c.to_string())
                .unwrap_or_else(|| "default".to_string());
            let _ = writeln!(out, "  batch {} (concurrency {})", i + 1, cap);
            for job in &batch.jobs {
                let _ = writeln!(out, "    {:<9} {:<28} {}", job.kind().to_string(), job.name, job.describe());
            }
        }
        for dir in &phase.path_prepend {
            let _ = writeln!(out, "  then PATH += {}", dir.display());
        }
    }
    for cfg in &plan.configs {
        let _ = writeln!(out, "config {} -> {}", cfg.name, cfg.destination.display());
    }
    for pref in &plan.preferences {
        let (flag, value) = pref.value.to_defaults_args();
        let _ = writeln!(out, "pref {} {} {} {}", pref.domain, pref.key, flag, value);
    }
    for app in &plan.restart {
        let _ = writeln!(out, "restart {}", app);
    }
    out
}
