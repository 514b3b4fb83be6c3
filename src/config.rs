//! Configuration file handling.
//!
//! Settings come from `student-insights.toml` (or the file given with
//! `--config`). `--database-url` / `DATABASE_URL` wins over the file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsOptions;
use crate::grading::DEFAULT_ELIGIBILITY_THRESHOLD;

pub const DEFAULT_CONFIG_FILE: &str = "student-insights.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Minimum aggregate for placement eligibility.
    #[serde(default = "default_eligibility_threshold")]
    pub eligibility_threshold: f64,

    #[serde(flatten)]
    pub options: AnalyticsOptions,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            eligibility_threshold: default_eligibility_threshold(),
            options: AnalyticsOptions::default(),
        }
    }
}

fn default_eligibility_threshold() -> f64 {
    DEFAULT_ELIGIBILITY_THRESHOLD
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load the explicit path, else the default file if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let options = &self.analytics.options;
        if options.bucket_width == 0 || options.bucket_width > 100 {
            anyhow::bail!(
                "analytics.bucket_width must be between 1 and 100, got {}",
                options.bucket_width
            );
        }
        if !(0.0..=100.0).contains(&self.analytics.eligibility_threshold) {
            anyhow::bail!(
                "analytics.eligibility_threshold must be a percentage, got {}",
                self.analytics.eligibility_threshold
            );
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<String> {
        self.database
            .url
            .clone()
            .context("DATABASE_URL must be set or database.url configured")
    }

    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to render default config")
    }
}
