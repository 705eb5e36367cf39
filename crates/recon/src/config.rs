use std::time::Duration;

use serde::Deserialize;

use crate::backoff::RetryPolicy;
use crate::error::ReconError;
use crate::model::StoreSide;
use crate::pool::DEFAULT_CONCURRENCY;

/// Worker counts above this usually exceed backend request quotas.
pub const CONCURRENCY_WARN_THRESHOLD: usize = 256;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Worker threads. The only admission-control knob.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deadline for both counts of one identifier.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub store_a: StoreConfig,
    pub store_b: StoreConfig,
    #[serde(default)]
    pub enumerate: EnumerateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_name() -> String {
    "recon".into()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_timeout_secs() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Bucket name (`gcs`) or base directory (`fs`).
    pub bucket: String,
    /// Path under which identifiers live, e.g. `CompositePreProcessing/v2/`.
    #[serde(default)]
    pub root: String,
    /// Appended after `<root>/<identifier>/`, e.g. `compositeRecording`.
    #[serde(default)]
    pub suffix: Option<String>,
    /// API base URL override (`gcs` only).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding a bearer token (`gcs` only).
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Gcs,
    Fs,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gcs => write!(f, "gcs"),
            Self::Fs => write!(f, "fs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Enumerate + Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnumerateConfig {
    /// Store whose root is listed to discover identifiers.
    #[serde(default)]
    pub from: StoreSide,
}

/// Retry knobs. Interval and elapsed limits are independent; `0` disables
/// either one.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default)]
    pub max_elapsed_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Also retry whole comparisons on transient count failures.
    #[serde(default)]
    pub comparisons: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_interval_ms() -> u64 {
    200
}

fn default_max_interval_ms() -> u64 {
    2000
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_ms: 0,
            jitter: default_jitter(),
            comparisons: false,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let limit = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: limit(self.max_interval_ms),
            max_elapsed: limit(self.max_elapsed_ms),
            jitter: self.jitter,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: RunConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.concurrency == 0 {
            return Err(ReconError::ConfigValidation(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.concurrency > CONCURRENCY_WARN_THRESHOLD {
            log::warn!(
                "concurrency {} is likely to saturate backend request quotas",
                self.concurrency
            );
        }

        if self.timeout_secs == 0 {
            return Err(ReconError::ConfigValidation(
                "timeout_secs must be at least 1".into(),
            ));
        }

        for (side, store) in [(StoreSide::A, &self.store_a), (StoreSide::B, &self.store_b)] {
            if store.bucket.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "store_{side}: bucket must not be empty"
                )));
            }
            if store.kind == StoreKind::Fs && (store.endpoint.is_some() || store.token_env.is_some()) {
                return Err(ReconError::ConfigValidation(format!(
                    "store_{side}: endpoint/token_env only apply to kind = \"gcs\""
                )));
            }
        }

        let retry = &self.retry;
        if !retry.jitter.is_finite() || !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ReconError::ConfigValidation(format!(
                "retry.jitter must be between 0 and 1, got {}",
                retry.jitter
            )));
        }
        if retry.max_attempts > 0 && retry.initial_interval_ms == 0 {
            return Err(ReconError::ConfigValidation(
                "retry.initial_interval_ms must be positive when retries are enabled".into(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn store(&self, side: StoreSide) -> &StoreConfig {
        match side {
            StoreSide::A => &self.store_a,
            StoreSide::B => &self.store_b,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
