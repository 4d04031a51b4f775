use crate::error::{Result, TriageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TASKCLUSTER_ROOT_URL: &str = "https://firefox-ci-tc.services.mozilla.com";
pub const DEFAULT_TREEHERDER_URL: &str = "https://treeherder.mozilla.org";

/// Default config location, relative to the home directory.
pub const CONFIG_FILE: &str = ".config/sheriff-triage/config.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TaskclusterConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskclusterConfig {
    #[serde(default = "default_root_url")]
    pub root_url: String,
}

fn default_root_url() -> String {
    DEFAULT_TASKCLUSTER_ROOT_URL.to_string()
}

impl Default for TaskclusterConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
        }
    }
}

// ---------------------------------------------------------------------------
// TreeherderConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeherderConfig {
    #[serde(default = "default_treeherder_url")]
    pub url: String,
    /// Reference branches searched for the same failure.
    #[serde(default = "default_production_branches")]
    pub production_branches: Vec<String>,
    /// Repos searched, in order, for the task's sheriff classification.
    #[serde(default = "default_classification_repos")]
    pub classification_repos: Vec<String>,
    /// How many recent pushes per branch the cross-branch search inspects.
    #[serde(default = "default_push_limit")]
    pub push_limit: u32,
}

fn default_treeherder_url() -> String {
    DEFAULT_TREEHERDER_URL.to_string()
}

fn default_production_branches() -> Vec<String> {
    vec!["autoland".to_string(), "mozilla-central".to_string()]
}

fn default_classification_repos() -> Vec<String> {
    vec![
        "autoland".to_string(),
        "mozilla-central".to_string(),
        "try".to_string(),
    ]
}

fn default_push_limit() -> u32 {
    50
}

impl Default for TreeherderConfig {
    fn default() -> Self {
        Self {
            url: default_treeherder_url(),
            production_branches: default_production_branches(),
            classification_repos: default_classification_repos(),
            push_limit: default_push_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Total attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * backoff_ms` before retrying.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_timeout() -> u64 {
    20
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub taskcluster: TaskclusterConfig,
    #[serde(default)]
    pub treeherder: TreeherderConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Worker-pool name suffixes that mark a staging/alpha pool.
    #[serde(default = "default_alpha_suffixes")]
    pub alpha_suffixes: Vec<String>,
}

fn default_alpha_suffixes() -> Vec<String> {
    ["-alpha", "-staging", "-test", "-beta"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            taskcluster: TaskclusterConfig::default(),
            treeherder: TreeherderConfig::default(),
            http: HttpConfig::default(),
            alpha_suffixes: default_alpha_suffixes(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// `~/.config/sheriff-triage/config.yaml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        home::home_dir().map(|h| h.join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            TriageError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&data)
    }

    /// Load `path` if given, otherwise the default location if it exists,
    /// otherwise built-in defaults. An explicit path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }
        match Self::default_path() {
            Some(p) if p.is_file() => Self::load(&p),
            _ => Ok(Self::new()),
        }
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        // An empty file parses as YAML null.
        if data.trim().is_empty() {
            return Ok(Self::new());
        }
        let cfg: Config = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    /// Map an alpha pool to its production counterpart by stripping the
    /// first matching suffix. Non-alpha pools map to themselves.
    pub fn production_pool<'a>(&self, pool: &'a str) -> &'a str {
        self.alpha_suffixes
            .iter()
            .find_map(|suffix| pool.strip_suffix(suffix.as_str()))
            .unwrap_or(pool)
    }

    pub fn is_alpha_pool(&self, pool: &str) -> bool {
        self.alpha_suffixes.iter().any(|s| pool.ends_with(s.as_str()))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        for (name, url) in [
            ("taskcluster.root_url", &self.taskcluster.root_url),
            ("treeherder.url", &self.treeherder.url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                error(format!("{name} must be an http(s) URL, got '{url}'"));
            }
        }

        if self.treeherder.production_branches.is_empty() {
            error("treeherder.production_branches must not be empty".to_string());
        }

        if self.http.max_attempts == 0 {
            error("http.max_attempts must be at least 1".to_string());
        }

        if !(1..=300).contains(&self.http.timeout_seconds) {
            error(format!(
                "http.timeout_seconds={} is outside 1..=300",
                self.http.timeout_seconds
            ));
        }

        if self.treeherder.push_limit == 0 {
            error("treeherder.push_limit must be at least 1".to_string());
        }

        if self.http.max_attempts > 5 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "http.max_attempts={} (>5 is unusual)",
                    self.http.max_attempts
                ),
            });
        }

        if self.treeherder.push_limit > 200 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "treeherder.push_limit={} issues one request per push per branch",
                    self.treeherder.push_limit
                ),
            });
        }

        if self.alpha_suffixes.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "alpha_suffixes is empty: no pool will be treated as alpha".to_string(),
            });
        }

        warnings
    }

    /// Fail on the first error-level warning.
    pub fn ensure_valid(&self) -> Result<Vec<ConfigWarning>> {
        let warnings = self.validate();
        if let Some(e) = warnings.iter().find(|w| w.level == WarnLevel::Error) {
            return Err(TriageError::Config(e.message.clone()));
        }
        Ok(warnings)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
