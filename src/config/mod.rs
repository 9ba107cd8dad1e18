//! Configuration loading and validation.
//!
//! Loads configuration from `$TRUSTGATE_CONFIG_PATH` or
//! `~/.trustgate/config.toml`. Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::governance::UsageMetric;

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrustgateConfig {
    /// Usage classification thresholds.
    pub thresholds: UsageThresholds,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Trust-chain fixture settings.
    pub store: StoreConfig,
}

impl TrustgateConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the file does not exist, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting thresholds are inconsistent.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), but reads `path` instead of the default
    /// location when one is given.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path_with(|key| std::env::var(key).ok())?,
        };
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: TrustgateConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Check that the loaded values are usable.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistent threshold.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()
    }

    /// Resolve config path using a custom env resolver.
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        if let Some(p) = env("TRUSTGATE_CONFIG_PATH") {
            return Ok(PathBuf::from(p));
        }
        Ok(config_dir()?.join("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests avoid mutating process env.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let thresholds = [
            (
                "TRUSTGATE_NEAR_LIMIT_PERCENT",
                &mut self.thresholds.near_limit_percent,
            ),
            (
                "TRUSTGATE_BUDGET_OVER_LIMIT_PERCENT",
                &mut self.thresholds.budget_over_limit_percent,
            ),
            (
                "TRUSTGATE_RATE_OVER_LIMIT_PERCENT",
                &mut self.thresholds.rate_over_limit_percent,
            ),
        ];
        for (var, slot) in thresholds {
            if let Some(v) = env(var) {
                match v.parse() {
                    Ok(n) => *slot = n,
                    Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
                }
            }
        }

        if let Some(v) = env("TRUSTGATE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("TRUSTGATE_LOG_DIR") {
            self.logging.json_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env("TRUSTGATE_STORE_PATH") {
            self.store.path = Some(PathBuf::from(v));
        }
    }
}

/// Resolve the default config directory (`~/.trustgate/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".trustgate"))
}

// ── Thresholds ──────────────────────────────────────────────────

/// Percent-of-limit thresholds for usage classification.
///
/// Usage above `near_limit_percent` and at or below the metric's over-limit
/// threshold is near-limit; above the over-limit threshold it is over-limit.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct UsageThresholds {
    /// Lower (exclusive) bound of the near-limit band.
    pub near_limit_percent: f64,
    /// Over-limit threshold for the budget metric.
    pub budget_over_limit_percent: f64,
    /// Over-limit threshold for request-rate metrics.
    pub rate_over_limit_percent: f64,
}

impl Default for UsageThresholds {
    fn default() -> Self {
        Self {
            near_limit_percent: 80.0,
            budget_over_limit_percent: 90.0,
            rate_over_limit_percent: 95.0,
        }
    }
}

impl UsageThresholds {
    /// Over-limit threshold that applies to `metric`.
    pub fn over_limit_percent(&self, metric: UsageMetric) -> f64 {
        match metric {
            UsageMetric::Budget => self.budget_over_limit_percent,
            UsageMetric::RequestsPerMinute
            | UsageMetric::RequestsPerHour
            | UsageMetric::RequestsPerDay => self.rate_over_limit_percent,
        }
    }

    /// Check every threshold is finite and non-negative, and that the
    /// near-limit band sits below both over-limit thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending threshold.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("near_limit_percent", self.near_limit_percent),
            ("budget_over_limit_percent", self.budget_over_limit_percent),
            ("rate_over_limit_percent", self.rate_over_limit_percent),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("threshold {name} must be a non-negative number, got {value}");
            }
        }
        if self.near_limit_percent >= self.budget_over_limit_percent {
            anyhow::bail!(
                "near_limit_percent ({}) must be below budget_over_limit_percent ({})",
                self.near_limit_percent,
                self.budget_over_limit_percent
            );
        }
        if self.near_limit_percent >= self.rate_over_limit_percent {
            anyhow::bail!(
                "near_limit_percent ({}) must be below rate_over_limit_percent ({})",
                self.near_limit_percent,
                self.rate_over_limit_percent
            );
        }
        Ok(())
    }
}

// ── Logging ─────────────────────────────────────────────────────

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rotated JSON logs. Console only when unset.
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json_dir: None,
        }
    }
}

// ── Store ───────────────────────────────────────────────────────

/// Trust-chain fixture settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON document loaded into the in-memory trust store.
    pub path: Option<PathBuf>,
}

// ── Tests ───────────────────────────────────────────────────────
