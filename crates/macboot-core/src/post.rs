//! Post-run steps: config files, preferences, and restarting apps so they pick
//! up new preferences. These run once after the phases, outside the batch model.

use std::sync::Arc;

use crate::adapters::{write_config_file, AdapterError, PreferenceStore, ShellRunner, Templater};
use crate::environment::Environment;
use crate::job::JobOutcome;
use crate::plan::{ConfigFile, Plan, Preference};
use crate::runner::{StepKind, StepRecord};

pub struct PostRun {
    templater: Arc<dyn Templater>,
    preferences: Arc<dyn PreferenceStore>,
    shell: Arc<dyn ShellRunner>,
    dry_run: bool,
}

impl PostRun {
    pub fn new(
        templater: Arc<dyn Templater>,
        preferences: Arc<dyn PreferenceStore>,
        shell: Arc<dyn ShellRunner>,
    ) -> Self {
        Self {
            templater,
            preferences,
            shell,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Configs, then preferences, then restarts. One record per step; failures don't stop later steps.
    pub fn apply(&self, plan: &Plan, env: &Environment) -> Vec<StepRecord> {
        let mut records = self.apply_configs(&plan.configs);
        records.extend(self.apply_preferences(&plan.preferences, env));
        records.extend(self.restart_apps(&plan.restart, env));
        records
    }

    pub fn apply_configs(&self, configs: &[ConfigFile]) -> Vec<StepRecord> {
        configs
            .iter()
            .map(|cfg| {
                let name = format!("{} -> {}", cfg.name, cfg.destination.display());
                if self.dry_run {
                    return dry_run_record(StepKind::Config, name);
                }
                let res = write_config_file(
                    self.templater.as_ref(),
                    &cfg.template,
                    &cfg.values,
                    &cfg.destination,
                );
                record(StepKind::Config, name, res)
            })
            .collect()
    }

    pub fn apply_preferences(&self, prefs: &[Preference], env: &Environment) -> Vec<StepRecord> {
        prefs
            .iter()
            .map(|p| {
                let (flag, text) = p.value.to_defaults_args();
                let name = format!("{} {} {} {}", p.domain, p.key, flag, text);
                if self.dry_run {
                    return dry_run_record(StepKind::Preference, name);
                }
                let res = self
                    .preferences
                    .set_preference(&p.domain, &p.key, &p.value, env);
                record(StepKind::Preference, name, res)
            })
            .collect()
    }

    pub fn restart_apps(&self, apps: &[String], env: &Environment) -> Vec<StepRecord> {
        apps.iter()
            .map(|app| {
                if self.dry_run {
                    return dry_run_record(StepKind::Restart, app.clone());
                }
                let cmd = format!("killall {}", shell_quote(app));
                match self.shell.run(&cmd, env) {
                    // killall exits 1 when no process matched.
                    Err(AdapterError::Exit { code: Some(1), .. }) => StepRecord {
                        kind: StepKind::Restart,
                        name: app.clone(),
                        outcome: JobOutcome::Skipped,
                        error: None,
                        note: Some("not running".to_string()),
                    },
                    other => record(StepKind::Restart, app.clone(), other.map(|_| ())),
                }
            })
            .collect()
    }
}

fn record(kind: StepKind, name: String, res: Result<(), AdapterError>) -> StepRecord {
    match res {
        Ok(()) => {
            tracing::info!(step = %name, "post-run step applied");
            StepRecord {
                kind,
                name,
                outcome: JobOutcome::Success,
                error: None,
                note: None,
            }
        }
        Err(e) => {
            tracing::warn!(step = %name, "post-run step failed: {}", e);
            StepRecord {
                kind,
                name,
                outcome: JobOutcome::Failed,
                error: Some(e.to_string()),
                note: None,
            }
        }
    }
}

fn dry_run_record(kind: StepKind, name: String) -> StepRecord {
    StepRecord {
        kind,
        name,
        outcome: JobOutcome::Skipped,
        error: None,
        note: Some("dry run".to_string()),
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
