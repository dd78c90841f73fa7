// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Life-based elimination
//!
//! Streaks participants lose a life for every closed interval below the goal.
//! The server settles lives asynchronously; until it reports, the client
//! derives the same figure from the interval history. A reported value always
//! wins over the derived one.

use super::interval::{IntervalCalendar, IntervalKey};
use crate::models::{Competition, CompetitionType, CompetitionUser};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Where a lives figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeSource {
    /// Reported by the server in `remaining_lives`
    Authoritative,
    /// Recomputed locally from interval history
    Derived,
}

/// Elimination state of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeStatus {
    pub lives_budget: u32,
    pub lives_remaining: u32,
    pub is_eliminated: bool,
    /// Closed intervals below the goal, oldest first
    pub missed_intervals: Vec<IntervalKey>,
    /// Interval whose miss used up the last life, when known locally
    pub eliminated_at: Option<IntervalKey>,
    pub source: LifeSource,
}

/// Closed intervals from the competition start up to (excluding) the interval
/// containing `today` where the participant stayed below `goal`
pub fn missed_intervals(
    user: &CompetitionUser,
    goal: f64,
    start: Option<NaiveDate>,
    today: NaiveDate,
    calendar: &IntervalCalendar,
) -> Vec<IntervalKey> {
    let Some(start) = start else {
        return Vec::new();
    };
    let current = calendar.start(today);

    calendar
        .keys_between(start, today)
        .into_iter()
        .filter(|key| key.start_date().is_some_and(|d| d < current))
        .filter(|key| user.distance_for(key) < goal)
        .collect()
}

/// Lives left after the given misses, ignoring any server-reported value
pub fn derive_life_status(lives_budget: u32, missed: Vec<IntervalKey>) -> LifeStatus {
    let missed_count = u32::try_from(missed.len()).unwrap_or(u32::MAX);
    let lives_remaining = lives_budget.saturating_sub(missed_count).min(lives_budget);
    let eliminated_at = if lives_budget > 0 && missed_count >= lives_budget {
        missed.get(lives_budget as usize - 1).cloned()
    } else {
        None
    };

    LifeStatus {
        lives_budget,
        lives_remaining,
        is_eliminated: lives_remaining == 0,
        missed_intervals: missed,
        eliminated_at,
        source: LifeSource::Derived,
    }
}

/// Locally recomputed status for a participant, `None` when lives don't apply
pub fn derived_status(
    competition: &Competition,
    user: &CompetitionUser,
    today: NaiveDate,
    calendar: &IntervalCalendar,
) -> Option<LifeStatus> {
    let budget = competition.options.lives_budget_or_zero();
    if !competition.competition_type.uses_lives() || budget == 0 {
        return None;
    }
    // Days after the end instant never count
    let today = match competition.options.end_date {
        Some(end) => (end - Duration::nanoseconds(1)).date_naive().min(today),
        None => today,
    };
    let missed = missed_intervals(
        user,
        competition.options.goal_or_zero(),
        competition.start_day(),
        today,
        calendar,
    );
    Some(derive_life_status(budget, missed))
}

/// Authoritative-if-present, else derived
pub fn life_status(
    competition: &Competition,
    user: &CompetitionUser,
    today: NaiveDate,
    calendar: &IntervalCalendar,
) -> Option<LifeStatus> {
    let budget = competition.options.lives_budget_or_zero();
    let derived = derived_status(competition, user, today, calendar);

    match (user.remaining_lives, derived) {
        (Some(reported), Some(derived)) => {
            let lives_remaining = reported.min(budget);
            Some(LifeStatus {
                lives_remaining,
                is_eliminated: lives_remaining == 0,
                eliminated_at: if lives_remaining == 0 {
                    derived.eliminated_at
                } else {
                    None
                },
                source: LifeSource::Authoritative,
                ..derived
            })
        }
        // Clash never derives lives locally but honours a server verdict
        (Some(reported), None)
            if competition.competition_type == CompetitionType::Clash && budget > 0 =>
        {
            let lives_remaining = reported.min(budget);
            Some(LifeStatus {
                lives_budget: budget,
                lives_remaining,
                is_eliminated: lives_remaining == 0,
                missed_intervals: Vec::new(),
                eliminated_at: None,
                source: LifeSource::Authoritative,
            })
        }
        (_, derived) => derived,
    }
}
