//! TOML plan: phases of job batches, config files, preferences and app restarts.
//!
//! ```toml
//! [values]
//! font_family = "JetBrains Mono"
//!
//! [[phases]]
//! name = "package-manager"
//! abort_on_failure = true
//! path_prepend = ["/opt/homebrew/bin"]
//!
//! [[phases.batches]]
//! jobs = [{ name = "homebrew", kind = "shell", command = "...", creates = "/opt/homebrew/bin/brew" }]
//!
//! [[phases]]
//! name = "tools"
//!
//! [[phases.batches]]
//! concurrency = 4
//! packages = ["git", "ripgrep"]
//! casks = ["iterm2"]
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::PreferenceValue;
use crate::job::{Job, JobSpec};
use crate::runner::{Batch, Phase};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("read plan {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse plan: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("plan has no phases")]
    NoPhases,
    #[error("phase #{0} has no name")]
    UnnamedPhase(usize),
    #[error("phase `{0}` is declared twice")]
    DuplicatePhase(String),
    #[error("phase `{phase}`: batch concurrency must be at least 1")]
    ZeroConcurrency { phase: String },
    #[error("job name `{0}` is used twice")]
    DuplicateJob(String),
    #[error("jobs `{first}` and `{second}` both write {}", destination.display())]
    DuplicateDestination {
        first: String,
        second: String,
        destination: PathBuf,
    },
    #[error("job `{job}`: {detail}")]
    InvalidJob { job: String, detail: String },
    #[error("config `{name}`: {detail}")]
    InvalidConfig { name: String, detail: String },
    #[error("preference {domain} {key}: {detail}")]
    InvalidPreference {
        domain: String,
        key: String,
        detail: String,
    },
}

/// A rendered config file written after the phases.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub name: String,
    pub destination: PathBuf,
    pub template: String,
    /// Plan-wide `[values]` merged with the file's own values (file wins).
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Preference {
    pub domain: String,
    pub key: String,
    pub value: PreferenceValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub phases: Vec<Phase>,
    pub configs: Vec<ConfigFile>,
    pub preferences: Vec<Preference>,
    /// Processes restarted (`killall`) once preferences are written, e.g. `Dock`.
    pub restart: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    phases: Vec<RawPhase>,
    #[serde(default)]
    configs: Vec<RawConfig>,
    #[serde(default)]
    preferences: Vec<Preference>,
    #[serde(default)]
    restart: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPhase {
    #[serde(default)]
    name: String,
    #[serde(default)]
    abort_on_failure: bool,
    #[serde(default)]
    path_prepend: Vec<PathBuf>,
    #[serde(default)]
    batches: Vec<RawBatch>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBatch {
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    packages: Vec<String>,
    #[serde(default)]
    casks: Vec<String>,
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    name: String,
    destination: PathBuf,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    template_file: Option<PathBuf>,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl Plan {
    /// Read, expand and validate the plan at `path`.
    /// Relative `template_file` entries resolve against the plan's directory.
    pub fn load(path: &Path) -> Result<Plan, PlanError> {
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Plan::from_toml_str(&text, base)
    }

    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Plan, PlanError> {
        let raw: RawPlan = toml::from_str(text)?;
        let home = home_dir();
        let home = home.as_deref();

        let phases = raw
            .phases
            .into_iter()
            .map(|p| Phase {
                name: p.name,
                abort_on_failure: p.abort_on_failure,
                path_prepend: p.path_prepend.iter().map(|d| expand_tilde(d, home)).collect(),
                batches: p.batches.into_iter().map(|b| expand_batch(b, home)).collect(),
            })
            .collect();

        let configs = raw
            .configs
            .into_iter()
            .map(|c| resolve_config(c, &raw.values, base_dir, home))
            .collect::<Result<Vec<_>, _>>()?;

        let plan = Plan {
            phases,
            configs,
            preferences: raw.preferences,
            restart: raw.restart,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn job_count(&self) -> usize {
        self.phases.iter().map(Phase::job_count).sum()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.phases
            .iter()
            .flat_map(|p| p.batches.iter())
            .flat_map(|b| b.jobs.iter())
    }

    fn validate(&self) -> Result<(), PlanError> {
        if self.phases.is_empty() {
            return Err(PlanError::NoPhases);
        }
        let mut phase_names = HashSet::new();
        for (i, phase) in self.phases.iter().enumerate() {
            if phase.name.trim().is_empty() {
                return Err(PlanError::UnnamedPhase(i + 1));
            }
            if !phase_names.insert(phase.name.as_str()) {
                return Err(PlanError::DuplicatePhase(phase.name.clone()));
            }
            if phase.batches.iter().any(|b| b.concurrency == Some(0)) {
                return Err(PlanError::ZeroConcurrency {
                    phase: phase.name.clone(),
                });
            }
        }

        let mut job_names = HashSet::new();
        let mut destinations: HashMap<PathBuf, &str> = HashMap::new();
        for job in self.jobs() {
            if !job_names.insert(job.name.as_str()) {
                return Err(PlanError::DuplicateJob(job.name.clone()));
            }
            validate_job(job).map_err(|detail| PlanError::InvalidJob {
                job: job.name.clone(),
                detail,
            })?;
            if let Some(dest) = destination_key(job) {
                if let Some(first) = destinations.insert(dest.clone(), job.name.as_str()) {
                    return Err(PlanError::DuplicateDestination {
                        first: first.to_string(),
                        second: job.name.clone(),
                        destination: dest,
                    });
                }
            }
        }

        for pref in &self.preferences {
            if pref.domain.trim().is_empty() || pref.key.trim().is_empty() {
                return Err(PlanError::InvalidPreference {
                    domain: pref.domain.clone(),
                    key: pref.key.clone(),
                    detail: "domain and key must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn expand_batch(raw: RawBatch, home: Option<&Path>) -> Batch {
    let mut jobs: Vec<Job> = raw.packages.iter().map(|p| Job::package(p)).collect();
    jobs.extend(raw.casks.iter().map(|c| Job::cask(c)));
    jobs.extend(raw.jobs.into_iter().map(|j| expand_job(j, home)));
    Batch {
        concurrency: raw.concurrency,
        jobs,
    }
}

fn expand_job(mut job: Job, home: Option<&Path>) -> Job {
    match &mut job.spec {
        JobSpec::Download { destination, .. } => *destination = expand_tilde(destination, home),
        JobSpec::Dmg {
            install_dir: Some(dir),
            ..
        } => *dir = expand_tilde(dir, home),
        JobSpec::Shell {
            creates: Some(path),
            ..
        } => *path = expand_tilde(path, home),
        _ => {}
    }
    job
}

fn resolve_config(
    raw: RawConfig,
    shared: &BTreeMap<String, String>,
    base_dir: &Path,
    home: Option<&Path>,
) -> Result<ConfigFile, PlanError> {
    let invalid = |detail: String| PlanError::InvalidConfig {
        name: raw.name.clone(),
        detail,
    };
    let template = match (&raw.template, &raw.template_file) {
        (Some(t), None) => t.clone(),
        (None, Some(file)) => {
            let file = expand_tilde(file, home);
            let file = if file.is_relative() {
                base_dir.join(file)
            } else {
                file
            };
            std::fs::read_to_string(&file)
                .map_err(|e| invalid(format!("read template {}: {}", file.display(), e)))?
        }
        (Some(_), Some(_)) => {
            return Err(invalid(
                "set either `template` or `template_file`, not both".to_string(),
            ))
        }
        (None, None) => return Err(invalid("missing `template` or `template_file`".to_string())),
    };

    let mut values = shared.clone();
    values.extend(raw.values.clone());
    Ok(ConfigFile {
        name: raw.name.clone(),
        destination: expand_tilde(&raw.destination, home),
        template,
        values,
    })
}

fn validate_job(job: &Job) -> Result<(), String> {
    if job.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    match &job.spec {
        JobSpec::Package { package } if package.trim().is_empty() => {
            Err("package must not be empty".to_string())
        }
        JobSpec::Cask { cask, .. } if cask.trim().is_empty() => {
            Err("cask must not be empty".to_string())
        }
        JobSpec::Download {
            urls,
            sha256,
            max_attempts,
            backoff_secs,
            ..
        } => {
            if urls.is_empty() {
                return Err("download needs at least one URL".to_string());
            }
            for u in urls {
                check_url(u)?;
            }
            if *max_attempts == Some(0) {
                return Err("max_attempts must be at least 1".to_string());
            }
            if backoff_secs.is_some_and(|b| !b.is_finite() || b < 0.0) {
                return Err("backoff_secs must be a non-negative number".to_string());
            }
            if let Some(sum) = sha256 {
                if sum.len() != 64 || !sum.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err("sha256 must be 64 hex characters".to_string());
                }
            }
            Ok(())
        }
        JobSpec::Dmg { url, label, app, .. } => {
            check_url(url)?;
            if label.trim().is_empty() {
                return Err("label must not be empty".to_string());
            }
            if app.trim().is_empty() || app.contains('/') {
                return Err(format!("app must be a bundle name, got `{}`", app));
            }
            Ok(())
        }
        JobSpec::Shell { command, .. } if command.trim().is_empty() => {
            Err("command must not be empty".to_string())
        }
        _ => Ok(()),
    }
}

/// Path a job writes to. Disk images without `install_dir` go to the
/// configured install dir, keyed here by a placeholder prefix.
fn destination_key(job: &Job) -> Option<PathBuf> {
    match &job.spec {
        JobSpec::Download { destination, .. } => Some(destination.clone()),
        JobSpec::Dmg {
            app, install_dir, ..
        } => Some(
            install_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("<install_dir>"))
                .join(app),
        ),
        _ => None,
    }
}

fn check_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("invalid URL `{}`: {}", raw, e))?;
    match parsed.scheme() {
        "http" | "https" | "file" => Ok(()),
        other => Err(format!("unsupported URL scheme `{}` in `{}`", other, raw)),
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// `~` and `~/x` become paths under `home`; anything else is returned as is.
pub fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return path.to_path_buf();
    };
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home.to_path_buf(),
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    const PLAN: &str = r#"
        restart = ["Dock"]

        [values]
        font_family = "JetBrains Mono"
        font_size = "13"

        [[phases]]
        name = "package-manager"
        abort_on_failure = true
        path_prepend = ["/opt/homebrew/bin"]

        [[phases.batches]]
        jobs = [
            { name = "homebrew", kind = "shell", command = "install-brew", creates = "/opt/homebrew/bin/brew" },
        ]

        [[phases]]
        name = "apps"

        [[phases.batches]]
        concurrency = 2
        packages = ["git", "ripgrep"]
        casks = ["iterm2"]

        [[phases.batches.jobs]]
        name = "firefox"
        kind = "dmg"
        url = "https://download.mozilla.org/?product=firefox-latest&os=osx"
        label = "Firefox"
        app = "Firefox.app"

        [[phases.batches.jobs]]
        name = "wallpaper"
        kind = "download"
        urls = ["https://a.example/w.jpg", "https://mirror.example/w.jpg"]
        destination = "~/Pictures/w.jpg"

        [[configs]]
        name = "alacritty"
        destination = "~/.config/alacritty/alacritty.toml"
        template = "family = \"{{font_family}}\"\nsize = {{font_size}}\n"
        values = { font_size = "15" }

        [[preferences]]
        domain = "com.apple.dock"
        key = "autohide"
        value = true

        [[preferences]]
        domain = "com.apple.dock"
        key = "tilesize"
        value = 36
    "#;

    fn load(text: &str) -> Result<Plan, PlanError> {
        Plan::from_toml_str(text, Path::new("/nonexistent"))
    }

    #[test]
    fn parses_full_plan() {
        let plan = load(PLAN).unwrap();
        assert_eq!(plan.phases.len(), 2);
        assert!(plan.phases[0].abort_on_failure);
        assert_eq!(plan.phases[0].path_prepend, vec![PathBuf::from("/opt/homebrew/bin")]);
        assert_eq!(plan.job_count(), 6);

        let apps = &plan.phases[1].batches[0];
        assert_eq!(apps.concurrency, Some(2));
        let kinds: Vec<JobKind> = apps.jobs.iter().map(Job::kind).collect();
        assert_eq!(
            kinds,
            vec![
                JobKind::PackageInstall,
                JobKind::PackageInstall,
                JobKind::CaskInstall,
                JobKind::DmgInstall,
                JobKind::Download
            ]
        );

        assert_eq!(plan.configs.len(), 1);
        assert_eq!(plan.configs[0].values["font_family"], "JetBrains Mono");
        assert_eq!(plan.configs[0].values["font_size"], "15");
        assert_eq!(plan.preferences[1].value, PreferenceValue::Int(36));
        assert_eq!(plan.restart, vec!["Dock".to_string()]);
    }

    #[test]
    fn tilde_expansion() {
        let home = Path::new("/Users/dev");
        assert_eq!(
            expand_tilde(Path::new("~/.config/x"), Some(home)),
            PathBuf::from("/Users/dev/.config/x")
        );
        assert_eq!(expand_tilde(Path::new("~"), Some(home)), home.to_path_buf());
        assert_eq!(
            expand_tilde(Path::new("/etc/hosts"), Some(home)),
            PathBuf::from("/etc/hosts")
        );
        assert_eq!(
            expand_tilde(Path::new("~/x"), None),
            PathBuf::from("~/x")
        );
    }

    #[test]
    fn duplicate_job_names_rejected() {
        let err = load(
            r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            packages = ["git"]
            [[phases]]
            name = "b"
            [[phases.batches]]
            casks = ["git"]
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateJob(ref n) if n == "git"));
    }

    #[test]
    fn shared_download_destination_rejected() {
        let err = load(
            r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            [[phases.batches.jobs]]
            name = "x"
            kind = "download"
            urls = ["https://example.com/x.bin"]
            destination = "/tmp/same.bin"
            [[phases.batches.jobs]]
            name = "y"
            kind = "download"
            urls = ["https://example.com/y.bin"]
            destination = "/tmp/same.bin"
        "#,
        )
        .unwrap_err();
        match err {
            PlanError::DuplicateDestination {
                first,
                second,
                destination,
            } => {
                assert_eq!((first.as_str(), second.as_str()), ("x", "y"));
                assert_eq!(destination, PathBuf::from("/tmp/same.bin"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dmg_jobs_installing_same_app_rejected() {
        let err = load(
            r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            [[phases.batches.jobs]]
            name = "firefox"
            kind = "dmg"
            url = "https://example.com/firefox.dmg"
            label = "Firefox"
            app = "Firefox.app"
            [[phases]]
            name = "b"
            [[phases.batches]]
            [[phases.batches.jobs]]
            name = "firefox-beta"
            kind = "dmg"
            url = "https://example.com/beta.dmg"
            label = "Firefox"
            app = "Firefox.app"
        "#,
        )
        .unwrap_err();
        assert!(
            matches!(err, PlanError::DuplicateDestination { ref second, .. } if second == "firefox-beta")
        );
    }

    #[test]
    fn dmg_same_app_in_different_dirs_allowed() {
        load(
            r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            [[phases.batches.jobs]]
            name = "tool"
            kind = "dmg"
            url = "https://example.com/tool.dmg"
            label = "Tool"
            app = "Tool.app"
            [[phases.batches.jobs]]
            name = "tool-user"
            kind = "dmg"
            url = "https://example.com/tool.dmg"
            label = "Tool"
            app = "Tool.app"
            install_dir = "/Users/me/Applications"
        "#,
        )
        .unwrap();
    }

    #[test]
    fn download_without_urls_rejected() {
        let err = load(
            r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            [[phases.batches.jobs]]
            name = "font"
            kind = "download"
            urls = []
            destination = "/tmp/font.zip"
        "#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "job `font`: download needs at least one URL"
        );
    }

    #[test]
    fn bad_url_and_zero_attempts_rejected() {
        let bad_scheme = r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            [[phases.batches.jobs]]
            name = "x"
            kind = "download"
            urls = ["ftp://example.com/x"]
            destination = "/tmp/x"
        "#;
        assert!(load(bad_scheme)
            .unwrap_err()
            .to_string()
            .contains("unsupported URL scheme"));

        let zero = r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            [[phases.batches.jobs]]
            name = "x"
            kind = "download"
            urls = ["https://example.com/x"]
            destination = "/tmp/x"
            max_attempts = 0
        "#;
        assert!(load(zero)
            .unwrap_err()
            .to_string()
            .contains("max_attempts must be at least 1"));
    }

    #[test]
    fn empty_plan_and_zero_concurrency_rejected() {
        assert!(matches!(load("").unwrap_err(), PlanError::NoPhases));
        let err = load(
            r#"
            [[phases]]
            name = "a"
            [[phases.batches]]
            concurrency = 0
            packages = ["git"]
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::ZeroConcurrency { .. }));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = load(
            r#"
            [[phases]]
            name = "a"
            abort_on_fail = true
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::Parse(_)));
    }

    #[test]
    fn template_file_resolves_against_plan_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/gitconfig"), "name = {{user}}").unwrap();
        let plan_path = dir.path().join("plan.toml");
        std::fs::write(
            &plan_path,
            r#"
            [[phases]]
            name = "a"

            [[configs]]
            name = "git"
            destination = "/tmp/gitconfig"
            template_file = "templates/gitconfig"
            values = { user = "dev" }
        "#,
        )
        .unwrap();
        let plan = Plan::load(&plan_path).unwrap();
        assert_eq!(plan.configs[0].template, "name = {{user}}");
    }

    #[test]
    fn config_needs_exactly_one_template_source() {
        let err = load(
            r#"
            [[phases]]
            name = "a"
            [[configs]]
            name = "git"
            destination = "/tmp/gitconfig"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidConfig { .. }));
    }
}
