//! Pipeline configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! job_timeout_secs = 900
//!
//! [retry]
//! max_retries = 5
//!
//! [worker]
//! workers = 8
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Imagery search windows and collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub optical_collection: String,
    pub sar_collection: String,
    /// Half-width of the optical search window around each target date
    pub optical_window_days: i64,
    /// Half-width of the SAR search window around each target date
    pub sar_window_days: i64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            optical_collection: "sentinel-2-l2a".into(),
            sar_collection: "sentinel-1-grd".into(),
            optical_window_days: 7,
            sar_window_days: 10,
        }
    }
}

/// Retry policy for transient catalog errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = no retries, run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Minimum fraction of valid samples an input raster must carry
    pub min_valid_fraction: f64,
    /// Percentile of the difference distribution mapped to probability 1.0
    pub fallback_percentile: f64,
    /// Confidence above which a region is classified as new construction
    pub new_construction_confidence: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            min_valid_fraction: 0.8,
            fallback_percentile: 0.95,
            new_construction_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: usize,
    /// Idle sleep between empty dequeues (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 250,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock budget for one job run (seconds)
    pub job_timeout_secs: u64,
    pub selector: SelectorConfig,
    pub retry: RetryPolicy,
    pub inference: InferenceConfig,
    pub worker: WorkerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: 3600,
            selector: SelectorConfig::default(),
            retry: RetryPolicy::default(),
            inference: InferenceConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::Invalid("job_timeout_secs must be > 0".into()));
        }
        if self.selector.optical_window_days < 0 || self.selector.sar_window_days < 0 {
            return Err(ConfigError::Invalid("search windows must be >= 0 days".into()));
        }
        let inf = &self.inference;
        if !(0.0..=1.0).contains(&inf.min_valid_fraction) {
            return Err(ConfigError::Invalid("min_valid_fraction must be in [0, 1]".into()));
        }
        if !(inf.fallback_percentile > 0.0 && inf.fallback_percentile <= 1.0) {
            return Err(ConfigError::Invalid("fallback_percentile must be in (0, 1]".into()));
        }
        if self.worker.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".into()));
        }
        Ok(())
    }
}
