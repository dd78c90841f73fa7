// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use async_trait::async_trait;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use crate::models::{ActivityKind, DailyDistance};

pub mod in_memory;

/// Source of per-day workout distances
#[async_trait]
pub trait WorkoutDataProvider: Send + Sync {
    /// Distance in meters per UTC calendar day, for days in `from..=to` with
    /// at least one matching workout. An empty filter set matches every kind.
    async fn daily_distances(
        &self,
        user_id: &str,
        filters: &BTreeSet<ActivityKind>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyDistance>>;

    fn provider_name(&self) -> &'static str;
}

pub fn create_provider(provider_type: &str) -> Result<Box<dyn WorkoutDataProvider>> {
    match provider_type.to_lowercase().as_str() {
        "memory" | "in_memory" => Ok(Box::new(in_memory::InMemoryWorkoutProvider::new())),
        _ => Err(anyhow::anyhow!("Unknown provider: {}. Currently supported: memory", provider_type)),
    }
}
