//! Run configuration from environment variables
//!
//! The orphan grace window and the fuzzy-match confidence threshold have no
//! defaults: both materially change published metrics, so they must be
//! supplied explicitly and are versioned into the `runs` table with every
//! snapshot.

use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVariable(&'static str),
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "jsonl")]
    Jsonl,
}

/// Configuration for one reconciliation run
///
/// Serialized verbatim into the published snapshot's run row, so every
/// metric can be traced back to the parameters that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Path to the SQLite metrics store (or the JSONL output directory)
    pub output_path: String,

    /// Output backend selection
    pub backend: BackendType,

    /// Hours a payment/order may wait for its counterpart before it is an orphan.
    /// Required, no default.
    pub orphan_grace_hours: i64,

    /// Minimum fuzzy-match score (0.0-1.0) for attaching a B2B source key to
    /// an existing entity. Required, no default.
    pub fuzzy_match_threshold: f64,

    /// Window within which two sources reporting the same entity/amount are
    /// candidates for duplicate collapse
    pub duplicate_window_hours: i64,

    /// Relative amount difference below which matched events are duplicates
    /// rather than conflicts
    pub conflict_epsilon: f64,

    /// Days after acquisition in which an engagement event counts as activation
    pub activation_window_days: i64,

    /// Days an entity must be old before it enters conversion-rate denominators
    pub funnel_maturity_days: i64,

    /// Optional JSON file mapping product_id -> COGS rate (fraction of gross)
    pub cogs_rates_path: Option<String>,

    /// Channel buffer size for raw record ingestion
    pub channel_buffer: usize,
}

impl RunConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ORPHAN_GRACE_HOURS` (required)
    /// - `FUZZY_MATCH_THRESHOLD` (required, 0.0-1.0)
    /// - `REVFLOW_OUTPUT_PATH` (default: ./revflow.db)
    /// - `OUTPUT_BACKEND` (sqlite|jsonl, default: sqlite)
    /// - `DUPLICATE_WINDOW_HOURS` (default: 24)
    /// - `CONFLICT_EPSILON` (default: 0.01)
    /// - `ACTIVATION_WINDOW_DAYS` (default: 30)
    /// - `FUNNEL_MATURITY_DAYS` (default: 30)
    /// - `COGS_RATES_PATH` (optional)
    /// - `INGEST_CHANNEL_BUFFER` (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let orphan_grace_hours = env::var("ORPHAN_GRACE_HOURS")
            .map_err(|_| ConfigError::MissingVariable("ORPHAN_GRACE_HOURS"))?
            .parse::<i64>()
            .map_err(|_| {
                ConfigError::InvalidValue("ORPHAN_GRACE_HOURS must be an integer".to_string())
            })?;

        let fuzzy_match_threshold = env::var("FUZZY_MATCH_THRESHOLD")
            .map_err(|_| ConfigError::MissingVariable("FUZZY_MATCH_THRESHOLD"))?
            .parse::<f64>()
            .map_err(|_| {
                ConfigError::InvalidValue("FUZZY_MATCH_THRESHOLD must be a number".to_string())
            })?;

        if !(0.0..=1.0).contains(&fuzzy_match_threshold) {
            return Err(ConfigError::InvalidValue(
                "FUZZY_MATCH_THRESHOLD must be within 0.0-1.0".to_string(),
            ));
        }

        let backend = match env::var("OUTPUT_BACKEND").as_deref() {
            Ok("jsonl") => BackendType::Jsonl,
            Ok("sqlite") | Err(_) => BackendType::Sqlite,
            Ok(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "OUTPUT_BACKEND must be sqlite or jsonl, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            output_path: env::var("REVFLOW_OUTPUT_PATH")
                .unwrap_or_else(|_| "./revflow.db".to_string()),

            backend,
            orphan_grace_hours,
            fuzzy_match_threshold,

            duplicate_window_hours: env::var("DUPLICATE_WINDOW_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(24),

            conflict_epsilon: env::var("CONFLICT_EPSILON")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.01),

            activation_window_days: env::var("ACTIVATION_WINDOW_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            funnel_maturity_days: env::var("FUNNEL_MATURITY_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            cogs_rates_path: env::var("COGS_RATES_PATH").ok(),

            channel_buffer: env::var("INGEST_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
        })
    }

    pub fn orphan_grace_secs(&self) -> i64 {
        self.orphan_grace_hours * 3600
    }

    pub fn duplicate_window_secs(&self) -> i64 {
        self.duplicate_window_hours * 3600
    }

    pub fn activation_window_secs(&self) -> i64 {
        self.activation_window_days * 86_400
    }

    pub fn funnel_maturity_secs(&self) -> i64 {
        self.funnel_maturity_days * 86_400
    }
}

/// Fixed configuration for unit tests across the crate
#[cfg(test)]
pub(crate) fn test_config() -> RunConfig {
    RunConfig {
        output_path: "./revflow.db".to_string(),
        backend: BackendType::Sqlite,
        orphan_grace_hours: 48,
        fuzzy_match_threshold: 0.8,
        duplicate_window_hours: 24,
        conflict_epsilon: 0.01,
        activation_window_days: 30,
        funnel_maturity_days: 30,
        cogs_rates_path: None,
        channel_buffer: 10_000,
    }
}
