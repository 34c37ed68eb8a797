use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::OrchestratorConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid ewma_alpha: {0}. Must be in (0, 1]")]
    InvalidEwmaAlpha(f64),

    #[error("Invalid failure_threshold: {0}. Must be at least 1")]
    InvalidFailureThreshold(u32),

    #[error("Invalid refresh_ahead_fraction: {0}. Must be in (0, 1]")]
    InvalidRefreshFraction(f64),

    #[error("Invalid max_entries_per_tenant: {0}. Must be at least 1")]
    InvalidCacheCap(usize),

    #[error("Activation poll_delays_ms cannot be empty")]
    EmptyPollDelays,

    #[error("Invalid batch_size: {0}. Must be at least 1")]
    InvalidBatchSize(usize),

    #[error("Invalid requests_per_second: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error("Gateway base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. edgeflow.yaml (project config)
    /// 3. edgeflow.local.yaml (local overrides, optional)
    /// 4. Environment variables (EDGEFLOW_* prefix, highest priority)
    pub fn load() -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file("edgeflow.yaml"))
            .merge(Yaml::file("edgeflow.local.yaml"))
            .merge(Env::prefixed("EDGEFLOW_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
        if config.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.retry.ewma_alpha <= 0.0 || config.retry.ewma_alpha > 1.0 {
            return Err(ConfigError::InvalidEwmaAlpha(config.retry.ewma_alpha));
        }

        if config.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold(
                config.breaker.failure_threshold,
            ));
        }

        if config.cache.refresh_ahead_fraction <= 0.0 || config.cache.refresh_ahead_fraction > 1.0
        {
            return Err(ConfigError::InvalidRefreshFraction(
                config.cache.refresh_ahead_fraction,
            ));
        }

        if config.cache.max_entries_per_tenant == 0 {
            return Err(ConfigError::InvalidCacheCap(
                config.cache.max_entries_per_tenant,
            ));
        }

        if config.activation.poll_delays_ms.is_empty() {
            return Err(ConfigError::EmptyPollDelays);
        }

        if config.bulk.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(config.bulk.batch_size));
        }

        if config.gateway.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                config.gateway.requests_per_second,
            ));
        }

        if config.gateway.base_url.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
