//! Configuration loading.
//!
//! Priority order, highest first:
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables
//! 3. TOML config file
//! 4. Compiled defaults

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "REFURB_PRICER_DB";
pub const ENV_MARKET_DATA: &str = "REFURB_PRICER_MARKET_DATA";
pub const ENV_SEED: &str = "REFURB_PRICER_SEED";
pub const ENV_LOG_LEVEL: &str = "REFURB_PRICER_LOG";

pub const DEFAULT_CONFIG_FILE: &str = "refurb_pricer.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// JSON file replacing the built-in market reference table
    pub market_data_path: Option<PathBuf>,
    /// Seed for velocity-day jitter; random per run when absent
    pub seed: Option<u64>,
    pub max_devices_per_run: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("refurb_pricer.db"),
            market_data_path: None,
            seed: None,
            max_devices_per_run: 10,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the given file, or `refurb_pricer.toml` in the working
    /// directory if it exists, or the defaults. Environment overrides are
    /// applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("cannot read {}: {}", p.display(), e)))?;
                Self::from_toml_str(&text)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_toml_str(&std::fs::read_to_string(default_path)?)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process env in practice).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(market) = lookup(ENV_MARKET_DATA) {
            self.market_data_path = Some(PathBuf::from(market));
        }
        if let Some(seed) = lookup(ENV_SEED) {
            let seed = seed
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} must be an unsigned integer, got '{}'", ENV_SEED, seed)))?;
            self.seed = Some(seed);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_devices_per_run == 0 {
            return Err(Error::Config("max_devices_per_run must be at least 1".to_string()));
        }
        Ok(())
    }
}
