// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Client-side reconciliation of displayed competition state
//!
//! A freshly fetched competition replaces whatever was displayed, wholesale.
//! Optimistic flags set after a mutation only last until the next fetch lands.

use crate::models::Competition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    ViewAppeared,
    PullToRefresh,
    MutationCompleted,
}

/// Handle for one in-flight fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
    pub trigger: RefreshTrigger,
}

/// Local guesses made right after a mutation, before the server confirms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticFlags {
    pub flex_sent_today: bool,
    pub nudged_today: BTreeSet<String>,
}

/// What the client is currently showing for one competition
#[derive(Debug, Clone, Default)]
pub struct DisplayedCompetition {
    competition: Option<Competition>,
    optimistic: OptimisticFlags,
    generation: u64,
    last_refreshed_at: Option<DateTime<Utc>>,
}

impl DisplayedCompetition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn competition(&self) -> Option<&Competition> {
        self.competition.as_ref()
    }

    pub fn optimistic(&self) -> &OptimisticFlags {
        &self.optimistic
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed_at
    }

    /// Start a refresh. Any older ticket still in flight becomes stale.
    pub fn begin_refresh(&mut self, trigger: RefreshTrigger) -> RefreshTicket {
        self.generation += 1;
        RefreshTicket {
            generation: self.generation,
            trigger,
        }
    }

    /// Apply a fetched snapshot. Returns `false` when the ticket was superseded
    /// and the snapshot was discarded.
    pub fn apply_fetch(&mut self, ticket: RefreshTicket, fetched: Competition, now: DateTime<Utc>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                competition.id = %fetched.id,
                ticket.generation = ticket.generation,
                current.generation = self.generation,
                "Discarding stale competition snapshot"
            );
            return false;
        }
        self.competition = Some(fetched);
        self.optimistic = OptimisticFlags::default();
        self.last_refreshed_at = Some(now);
        true
    }

    /// Abandon an in-flight refresh; a late result for it will be ignored
    pub fn cancel(&mut self, ticket: RefreshTicket) {
        if ticket.generation == self.generation {
            self.generation += 1;
        }
    }

    pub fn mark_flex_sent(&mut self) {
        self.optimistic.flex_sent_today = true;
    }

    pub fn mark_nudged(&mut self, target_id: impl Into<String>) {
        self.optimistic.nudged_today.insert(target_id.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompetitionType, DistanceUnit, NewCompetition};
    use chrono::TimeZone;

    fn snapshot(name: &str) -> Competition {
        Competition::new(
            "amy",
            NewCompetition {
                name: name.into(),
                competition_type: CompetitionType::Race,
                workout_filters: Default::default(),
                goal: Some(10.0),
                unit: DistanceUnit::Kilometers,
                lives_budget: None,
                interval_bucket: None,
                duration_hours: None,
            },
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_fetched_state_replaces_everything() {
        let mut displayed = DisplayedCompetition::new();
        let ticket = displayed.begin_refresh(RefreshTrigger::ViewAppeared);
        assert!(displayed.apply_fetch(ticket, snapshot("old"), now()));

        let mut fetched = snapshot("new");
        fetched.users[0].remaining_lives = Some(1);
        let ticket = displayed.begin_refresh(RefreshTrigger::PullToRefresh);
        assert!(displayed.apply_fetch(ticket, fetched.clone(), now()));

        assert_eq!(displayed.competition(), Some(&fetched));
        assert_eq!(displayed.last_refreshed_at(), Some(now()));
    }

    #[test]
    fn test_optimistic_flags_cleared_by_fetch() {
        let mut displayed = DisplayedCompetition::new();
        displayed.mark_flex_sent();
        displayed.mark_nudged("ben");
        assert!(displayed.optimistic().flex_sent_today);

        let ticket = displayed.begin_refresh(RefreshTrigger::MutationCompleted);
        displayed.apply_fetch(ticket, snapshot("after flex"), now());
        assert_eq!(displayed.optimistic(), &OptimisticFlags::default());
    }

    #[test]
    fn test_stale_and_cancelled_fetches_are_discarded() {
        let mut displayed = DisplayedCompetition::new();
        let slow = displayed.begin_refresh(RefreshTrigger::ViewAppeared);
        let fast = displayed.begin_refresh(RefreshTrigger::PullToRefresh);

        assert!(displayed.apply_fetch(fast, snapshot("fast"), now()));
        assert!(!displayed.apply_fetch(slow, snapshot("slow"), now()));
        assert_eq!(displayed.competition().unwrap().name, "fast");

        let cancelled = displayed.begin_refresh(RefreshTrigger::PullToRefresh);
        displayed.cancel(cancelled);
        assert!(!displayed.apply_fetch(cancelled, snapshot("cancelled"), now()));
        assert_eq!(displayed.competition().unwrap().name, "fast");
    }
}
