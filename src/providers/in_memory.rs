// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use async_trait::async_trait;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use crate::models::{ActivityKind, DailyDistance, Workout};
use super::WorkoutDataProvider;

/// Workouts held in process memory, keyed by user
#[derive(Default)]
pub struct InMemoryWorkoutProvider {
    workouts: RwLock<HashMap<String, Vec<Workout>>>,
}

impl InMemoryWorkoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_workout(&self, user_id: &str, workout: Workout) {
        debug!(
            user.id = %user_id,
            workout.kind = ?workout.kind,
            workout.distance_meters = workout.distance_meters,
            "Recording workout"
        );
        self.workouts
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(workout);
    }
}

#[async_trait]
impl WorkoutDataProvider for InMemoryWorkoutProvider {
    async fn daily_distances(
        &self,
        user_id: &str,
        filters: &BTreeSet<ActivityKind>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyDistance>> {
        let workouts = self.workouts.read().await;
        let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();

        for workout in workouts.get(user_id).into_iter().flatten() {
            let day = workout.start_date.date_naive();
            if day < from || day > to {
                continue;
            }
            if !filters.is_empty() && !filters.contains(&workout.kind) {
                continue;
            }
            *per_day.entry(day).or_insert(0.0) += workout.distance_meters;
        }

        Ok(per_day
            .into_iter()
            .map(|(date, distance_meters)| DailyDistance { date, distance_meters })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
