//! Runtime configuration.

use crate::core::RequestLimits;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "VIDFLOW_";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info,vidflow=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// Top-level configuration for the job runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VidflowConfig {
    /// Orchestrators allowed to run at once. `1` runs jobs one after another.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Shortest accepted video duration.
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u32,
    /// Longest accepted video duration.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
    /// Duration used when a request leaves it unset.
    #[serde(default = "default_duration")]
    pub default_duration_secs: u32,
    /// How long terminal records are kept before eviction.
    #[serde(default = "default_retention")]
    pub terminal_retention_secs: u64,
    /// Directory for the JSON job store; `None` keeps records in memory.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_min_duration() -> u32 {
    60
}

fn default_max_duration() -> u32 {
    600
}

fn default_duration() -> u32 {
    60
}

fn default_retention() -> u64 {
    24 * 60 * 60
}

impl Default for VidflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
            default_duration_secs: default_duration(),
            terminal_retention_secs: default_retention(),
            store_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl VidflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs;
        self
    }

    /// Sets the JSON store directory.
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Loads a JSON configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the values
    /// are inconsistent.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `VIDFLOW_*` environment variables on top of this config.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparsable value or the result
    /// fails validation.
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary `VIDFLOW_*` lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::with_env_overrides`].
    pub fn with_overrides<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("MAX_CONCURRENT_JOBS") {
            self.max_concurrent_jobs = parse_var("MAX_CONCURRENT_JOBS", &v)?;
        }
        if let Some(v) = var("MIN_DURATION_SECS") {
            self.min_duration_secs = parse_var("MIN_DURATION_SECS", &v)?;
        }
        if let Some(v) = var("MAX_DURATION_SECS") {
            self.max_duration_secs = parse_var("MAX_DURATION_SECS", &v)?;
        }
        if let Some(v) = var("DEFAULT_DURATION_SECS") {
            self.default_duration_secs = parse_var("DEFAULT_DURATION_SECS", &v)?;
        }
        if let Some(v) = var("TERMINAL_RETENTION_SECS") {
            self.terminal_retention_secs = parse_var("TERMINAL_RETENTION_SECS", &v)?;
        }
        if let Some(v) = var("STORE_DIR") {
            self.store_dir = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = var("LOG") {
            self.logging.filter = v;
        }
        if let Some(v) = var("LOG_JSON") {
            self.logging.json = parse_var("LOG_JSON", &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks that the values are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be at least 1");
        }
        if self.min_duration_secs > self.max_duration_secs {
            bail!(
                "min_duration_secs ({}) exceeds max_duration_secs ({})",
                self.min_duration_secs,
                self.max_duration_secs
            );
        }
        if !(self.min_duration_secs..=self.max_duration_secs).contains(&self.default_duration_secs) {
            bail!(
                "default_duration_secs ({}) is outside {}..={}",
                self.default_duration_secs,
                self.min_duration_secs,
                self.max_duration_secs
            );
        }
        Ok(())
    }

    /// Request bounds derived from this configuration.
    #[must_use]
    pub fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            min_duration_secs: self.min_duration_secs,
            max_duration_secs: self.max_duration_secs,
            default_duration_secs: self.default_duration_secs,
            ..RequestLimits::default()
        }
    }

    /// Retention as a [`Duration`].
    #[must_use]
    pub const fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }
}

fn parse_var<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value {value:?} for {ENV_PREFIX}{name}"))
}
