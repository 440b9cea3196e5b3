//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the external extraction utility is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorSettings {
    /// Executable to launch.
    pub program: String,
    /// Arguments placed before everything else (e.g. `-m spotdl`).
    pub base_args: Vec<String>,
    /// Output audio format.
    pub format: String,
    /// Output bitrate.
    pub bitrate: String,
    /// Parallelism hint for the utility itself.
    pub threads: Option<u32>,
    /// Stderr substrings that fail a job even when the exit code is 0.
    pub error_markers: Vec<String>,
    /// Upper bound for the `--version` probe.
    pub probe_timeout: Duration,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            base_args: vec!["-m".to_string(), "spotdl".to_string()],
            format: "mp3".to_string(),
            bitrate: "320k".to_string(),
            threads: None,
            error_markers: default_error_markers(),
            probe_timeout: Duration::from_secs(15),
        }
    }
}

fn default_error_markers() -> Vec<String> {
    ["Traceback (most recent call last)", "AudioProviderError", "LookupError"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Top-level configuration for the conversion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiplineConfig {
    /// Root of the output store; one subdirectory per job.
    pub output_root: PathBuf,
    /// URL prefix the static file layer serves the output store under.
    pub public_prefix: String,
    /// Maximum number of jobs holding a worker slot.
    pub max_concurrent: usize,
    /// Wall-clock limit per job.
    pub job_timeout: Duration,
    /// Period of the retention sweep.
    pub sweep_interval: Duration,
    /// Entries older than this are deleted by the sweep.
    pub retention: Duration,
    pub extractor: ExtractorSettings,
}

impl Default for RiplineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./downloads"),
            public_prefix: "/downloads".to_string(),
            max_concurrent: 2,
            job_timeout: Duration::from_secs(240),
            sweep_interval: Duration::from_secs(60),
            retention: Duration::from_secs(300),
            extractor: ExtractorSettings::default(),
        }
    }
}

impl RiplineConfig {
    /// Build a config from environment variables.
    ///
    /// Every variable is optional; unset or blank values fall back to the defaults.
    ///
    /// - `RIPLINE_OUTPUT_DIR` (default: `./downloads`)
    /// - `RIPLINE_PUBLIC_PREFIX` (default: `/downloads`)
    /// - `RIPLINE_MAX_CONCURRENT` (default: 2)
    /// - `RIPLINE_JOB_TIMEOUT_SECS` (default: 240)
    /// - `RIPLINE_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `RIPLINE_RETENTION_SECS` (default: 300)
    /// - `RIPLINE_EXTRACTOR_PROGRAM` (default: `python`)
    /// - `RIPLINE_EXTRACTOR_ARGS` (whitespace separated, default: `-m spotdl`)
    /// - `RIPLINE_AUDIO_FORMAT` (default: `mp3`), `RIPLINE_AUDIO_BITRATE` (default: `320k`)
    /// - `RIPLINE_EXTRACTOR_THREADS` (optional)
    /// - `RIPLINE_ERROR_MARKERS` (`|` separated)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let extractor_defaults = defaults.extractor.clone();

        let extractor = ExtractorSettings {
            program: read_env("RIPLINE_EXTRACTOR_PROGRAM").unwrap_or(extractor_defaults.program),
            base_args: read_env("RIPLINE_EXTRACTOR_ARGS")
                .map(|v| v.split_whitespace().map(String::from).collect())
                .unwrap_or(extractor_defaults.base_args),
            format: read_env("RIPLINE_AUDIO_FORMAT").unwrap_or(extractor_defaults.format),
            bitrate: read_env("RIPLINE_AUDIO_BITRATE").unwrap_or(extractor_defaults.bitrate),
            threads: parse_env::<u32>("RIPLINE_EXTRACTOR_THREADS")?,
            error_markers: read_env("RIPLINE_ERROR_MARKERS")
                .map(|v| split_markers(&v))
                .unwrap_or(extractor_defaults.error_markers),
            probe_timeout: extractor_defaults.probe_timeout,
        };

        let cfg = Self {
            output_root: read_env("RIPLINE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            public_prefix: read_env("RIPLINE_PUBLIC_PREFIX").unwrap_or(defaults.public_prefix),
            max_concurrent: parse_env("RIPLINE_MAX_CONCURRENT")?
                .unwrap_or(defaults.max_concurrent),
            job_timeout: parse_secs("RIPLINE_JOB_TIMEOUT_SECS")?.unwrap_or(defaults.job_timeout),
            sweep_interval: parse_secs("RIPLINE_SWEEP_INTERVAL_SECS")?
                .unwrap_or(defaults.sweep_interval),
            retention: parse_secs("RIPLINE_RETENTION_SECS")?.unwrap_or(defaults.retention),
            extractor,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the runtime cannot honor.
    ///
    /// The retention sweep knows nothing about live jobs, so the retention
    /// window must outlast the longest a job may run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.job_timeout.is_zero() || self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "job timeout and sweep interval must be non-zero".into(),
            ));
        }
        if self.retention <= self.job_timeout {
            return Err(ConfigError::Invalid(format!(
                "retention ({}s) must exceed the job timeout ({}s)",
                self.retention.as_secs(),
                self.job_timeout.as_secs()
            )));
        }
        if self.extractor.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "extractor program must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_env(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().and_then(non_empty)
}

fn parse_env<T>(var_name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match read_env(var_name) {
        None => Ok(None),
        Some(v) => v.parse::<T>().map(Some).map_err(|e| {
            ConfigError::Invalid(format!("invalid value for {var_name}={v}: {e}"))
        }),
    }
}

fn parse_secs(var_name: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_env::<u64>(var_name)?.map(Duration::from_secs))
}

fn split_markers(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}
