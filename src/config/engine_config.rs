// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Rule knobs for the competition engine

use crate::constants::defaults;
use crate::engine::ranking::{PlacementPolicy, TieBreak};
use anyhow::{Context, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine configuration shared by scoring, ranking and lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// First day of a weekly interval
    pub first_weekday: Weekday,
    /// Ordering among equal scores
    pub tie_break: TieBreak,
    /// Placement numbering for equal final scores
    pub placement_policy: PlacementPolicy,
    /// Accepted participants needed before a competition may start
    pub min_participants: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            first_weekday: defaults::FIRST_WEEKDAY,
            tie_break: TieBreak::default(),
            placement_policy: PlacementPolicy::default(),
            min_participants: defaults::MIN_PARTICIPANTS,
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from file or use defaults
    pub fn load(path: Option<String>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::load_from_file(&config_path);
        }

        if Path::new(defaults::ENGINE_CONFIG_FILE).exists() {
            return Self::load_from_file(defaults::ENGINE_CONFIG_FILE);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config file: {}", path))?;

        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse engine config file: {}", path))?;

        config.validated()
    }

    /// Reject settings the rules can't honour
    pub fn validated(self) -> Result<Self> {
        if self.min_participants < 2 {
            anyhow::bail!(
                "min_participants must be at least 2, got {}",
                self.min_participants
            );
        }
        Ok(self)
    }
}
