// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Configuration management for the competition engine

pub mod engine_config;

use crate::constants::{defaults, env_config};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use engine_config::EngineConfig;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Workout data provider to pull interval distances from
    #[serde(default = "default_provider")]
    pub workout_provider: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite:./data/competitions.db` or `sqlite::memory:`
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
        }
    }
}

fn default_provider() -> String {
    defaults::WORKOUT_PROVIDER.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            database: DatabaseConfig::default(),
            workout_provider: default_provider(),
        }
    }
}

fn default_config_path() -> String {
    dirs::config_dir()
        .map(|p| p.join("streak-engine/config.toml"))
        .unwrap_or_else(|| "config.toml".into())
        .to_string_lossy()
        .to_string()
}

impl Config {
    /// Load from a TOML file, or from the environment when no file exists
    pub fn load(path: Option<String>) -> Result<Self> {
        let config_path = path.unwrap_or_else(default_config_path);

        if Path::new(&config_path).exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&content)
                .context("Failed to parse config file")?;
            config.engine.clone().validated()?;
            Ok(config)
        } else {
            dotenv::dotenv().ok();

            let mut config = Config::default();
            if let Some(url) = env_config::database_url() {
                config.database.url = url;
            }
            if let Some(provider) = env_config::workout_provider() {
                config.workout_provider = provider;
            }
            if let Some(weekday) = env_config::first_weekday() {
                config.engine.first_weekday = weekday;
            }
            Ok(config)
        }
    }

    pub fn save(&self, path: Option<String>) -> Result<()> {
        let config_path = path.unwrap_or_else(default_config_path);

        let parent = Path::new(&config_path).parent()
            .context("Invalid config path")?;
        fs::create_dir_all(parent)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        Ok(())
    }
}
