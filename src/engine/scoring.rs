// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Scoring Engine
//!
//! One [`ScoringStrategy`] per [`CompetitionType`]. The strategy is picked
//! once by [`strategy_for`]; everything downstream works with the resulting
//! [`ScoreCard`] and never switches on the competition type again.
//!
//! Strategies are pure projections over the interval records already held by
//! the competition. Missing interval data counts as zero distance.

use super::elimination::{self, LifeStatus};
use super::interval::{IntervalCalendar, IntervalKey};
use crate::models::{Competition, CompetitionType, CompetitionUser};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// How a single interval turned out for a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Goal reached
    Met,
    /// Closed below the goal
    Missed,
    /// Clash: strictly best distance of the interval
    Won,
    /// Clash: beaten or tied
    NoPoint,
    /// Distance counted towards a running total
    Counted,
    /// Still in progress and not yet decided
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalOutcome {
    pub key: IntervalKey,
    pub distance: f64,
    pub kind: OutcomeKind,
}

/// Result of scoring one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub user_id: String,
    pub comparable_score: f64,
    pub outcomes: Vec<IntervalOutcome>,
}

/// Everything a strategy may look at
pub struct ScoringContext<'a> {
    pub competition: &'a Competition,
    pub calendar: IntervalCalendar,
    pub as_of: NaiveDate,
}

impl<'a> ScoringContext<'a> {
    pub fn new(competition: &'a Competition, as_of: NaiveDate, first_weekday: Weekday) -> Self {
        Self {
            competition,
            calendar: IntervalCalendar::for_competition(competition, first_weekday),
            as_of,
        }
    }

    /// Last day that still belongs to the competition
    fn last_day(&self) -> NaiveDate {
        match self.competition.options.end_date {
            // The end instant itself is exclusive
            Some(end) => {
                let end_day = (end - chrono::Duration::nanoseconds(1)).date_naive();
                end_day.min(self.as_of)
            }
            None => self.as_of,
        }
    }

    /// Interval keys from the start through the interval containing `as_of`
    pub fn window(&self) -> Vec<IntervalKey> {
        match self.competition.start_day() {
            Some(start) => self.calendar.keys_between(start, self.last_day()),
            None => Vec::new(),
        }
    }

    /// Whether an interval can no longer change.
    ///
    /// The interval holding the last counted day stays undecided, even after
    /// the competition finished: it only counts once its goal is met.
    pub fn is_closed(&self, key: &IntervalKey) -> bool {
        let current = self.calendar.start(self.last_day());
        key.start_date().is_some_and(|start| start < current)
    }

    pub fn goal(&self) -> f64 {
        self.competition.options.goal_or_zero()
    }

    pub fn life_status(&self, user: &CompetitionUser) -> Option<LifeStatus> {
        elimination::life_status(self.competition, user, self.as_of, &self.calendar)
    }
}

pub trait ScoringStrategy: Send + Sync {
    fn competition_type(&self) -> CompetitionType;

    fn score(&self, ctx: &ScoringContext<'_>, user: &CompetitionUser) -> ScoreCard;
}

/// Select the strategy for a competition type
pub fn strategy_for(competition_type: CompetitionType) -> &'static dyn ScoringStrategy {
    match competition_type {
        CompetitionType::Streaks => &StreaksScoring,
        CompetitionType::Clash => &ClashScoring,
        CompetitionType::Apex => &ApexScoring,
        CompetitionType::Targets => &TargetsScoring,
        CompetitionType::Race => &RaceScoring,
    }
}

/// Score every accepted participant, in membership order
pub fn score_all(ctx: &ScoringContext<'_>) -> Vec<ScoreCard> {
    let strategy = strategy_for(ctx.competition.competition_type);
    ctx.competition
        .accepted_users()
        .map(|user| strategy.score(ctx, user))
        .collect()
}

/// Met / Missed / Pending against the goal for each interval in the window
fn goal_outcomes(ctx: &ScoringContext<'_>, user: &CompetitionUser) -> Vec<IntervalOutcome> {
    let goal = ctx.goal();
    ctx.window()
        .into_iter()
        .map(|key| {
            let distance = user.distance_for(&key);
            let kind = if distance >= goal {
                OutcomeKind::Met
            } else if ctx.is_closed(&key) {
                OutcomeKind::Missed
            } else {
                OutcomeKind::Pending
            };
            IntervalOutcome { key, distance, kind }
        })
        .collect()
}

fn counted_outcomes(ctx: &ScoringContext<'_>, user: &CompetitionUser) -> Vec<IntervalOutcome> {
    ctx.window()
        .into_iter()
        .map(|key| IntervalOutcome {
            distance: user.distance_for(&key),
            key,
            kind: OutcomeKind::Counted,
        })
        .collect()
}

fn total_distance(outcomes: &[IntervalOutcome]) -> f64 {
    outcomes.iter().map(|o| o.distance).sum()
}

fn count_of(outcomes: &[IntervalOutcome], kind: OutcomeKind) -> f64 {
    outcomes.iter().filter(|o| o.kind == kind).count() as f64
}

/// Consecutive intervals at or above the goal, ending at the latest interval
/// before elimination. An undecided current interval neither extends nor
/// breaks the streak.
pub struct StreaksScoring;

impl ScoringStrategy for StreaksScoring {
    fn competition_type(&self) -> CompetitionType {
        CompetitionType::Streaks
    }

    fn score(&self, ctx: &ScoringContext<'_>, user: &CompetitionUser) -> ScoreCard {
        let outcomes = goal_outcomes(ctx, user);
        let cutoff = ctx.life_status(user).and_then(|status| status.eliminated_at);

        let streak = outcomes
            .iter()
            .filter(|o| cutoff.as_ref().map_or(true, |cut| o.key < *cut))
            .rev()
            .skip_while(|o| o.kind == OutcomeKind::Pending)
            .take_while(|o| o.kind == OutcomeKind::Met)
            .count();

        ScoreCard {
            user_id: user.user_id.clone(),
            comparable_score: streak as f64,
            outcomes,
        }
    }
}

/// A point for every closed interval where the participant strictly beat
/// every accepted rival. Ties score nothing.
pub struct ClashScoring;

impl ScoringStrategy for ClashScoring {
    fn competition_type(&self) -> CompetitionType {
        CompetitionType::Clash
    }

    fn score(&self, ctx: &ScoringContext<'_>, user: &CompetitionUser) -> ScoreCard {
        let outcomes: Vec<IntervalOutcome> = ctx
            .window()
            .into_iter()
            .map(|key| {
                let distance = user.distance_for(&key);
                if !ctx.is_closed(&key) {
                    return IntervalOutcome { key, distance, kind: OutcomeKind::Pending };
                }
                let best_rival = ctx
                    .competition
                    .accepted_users()
                    .filter(|rival| rival.user_id != user.user_id)
                    .map(|rival| rival.distance_for(&key))
                    .fold(None, |best: Option<f64>, d| Some(best.map_or(d, |b| b.max(d))));
                let kind = match best_rival {
                    Some(best) if distance > best => OutcomeKind::Won,
                    _ => OutcomeKind::NoPoint,
                };
                IntervalOutcome { key, distance, kind }
            })
            .collect();

        ScoreCard {
            user_id: user.user_id.clone(),
            comparable_score: count_of(&outcomes, OutcomeKind::Won),
            outcomes,
        }
    }
}

/// Total distance across the competition window
pub struct ApexScoring;

impl ScoringStrategy for ApexScoring {
    fn competition_type(&self) -> CompetitionType {
        CompetitionType::Apex
    }

    fn score(&self, ctx: &ScoringContext<'_>, user: &CompetitionUser) -> ScoreCard {
        let outcomes = counted_outcomes(ctx, user);
        ScoreCard {
            user_id: user.user_id.clone(),
            comparable_score: total_distance(&outcomes),
            outcomes,
        }
    }
}

/// One point per interval at or above the goal
pub struct TargetsScoring;

impl ScoringStrategy for TargetsScoring {
    fn competition_type(&self) -> CompetitionType {
        CompetitionType::Targets
    }

    fn score(&self, ctx: &ScoringContext<'_>, user: &CompetitionUser) -> ScoreCard {
        let outcomes = goal_outcomes(ctx, user);
        ScoreCard {
            user_id: user.user_id.clone(),
            comparable_score: count_of(&outcomes, OutcomeKind::Met),
            outcomes,
        }
    }
}

/// Cumulative distance since the start
pub struct RaceScoring;

impl RaceScoring {
    /// Whether a cumulative distance finishes the race; reaching the goal exactly counts
    pub fn has_finished(cumulative: f64, goal: f64) -> bool {
        goal > 0.0 && cumulative >= goal
    }
}

impl ScoringStrategy for RaceScoring {
    fn competition_type(&self) -> CompetitionType {
        CompetitionType::Race
    }

    fn score(&self, ctx: &ScoringContext<'_>, user: &CompetitionUser) -> ScoreCard {
        let outcomes = counted_outcomes(ctx, user);
        ScoreCard {
            user_id: user.user_id.clone(),
            comparable_score: total_distance(&outcomes),
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompetitionOptions, CompetitionStatus, DistanceUnit, IntervalBucket};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn key(d: u32) -> IntervalKey {
        IntervalKey::from_start(day(d))
    }

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, d, 0, 0, 0).unwrap()
    }

    fn competition(
        competition_type: CompetitionType,
        goal: Option<f64>,
        lives: Option<u32>,
        users: Vec<CompetitionUser>,
    ) -> Competition {
        Competition {
            id: Uuid::new_v4(),
            name: "test".into(),
            competition_type,
            owner: users[0].user_id.clone(),
            status: CompetitionStatus::Active,
            options: CompetitionOptions {
                goal,
                unit: DistanceUnit::Miles,
                interval_bucket: IntervalBucket::Day,
                lives_budget: lives,
                duration_hours: None,
                scheduled_start: None,
                start_date: Some(at(1)),
                end_date: None,
            },
            workout_filters: BTreeSet::new(),
            users,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    fn user(id: &str, days: &[(u32, f64)]) -> CompetitionUser {
        days.iter()
            .fold(CompetitionUser::accepted(id), |u, (d, dist)| u.with_interval(key(*d), *dist))
    }

    fn scores(competition: &Competition, as_of: u32) -> Vec<f64> {
        let ctx = ScoringContext::new(competition, day(as_of), Weekday::Mon);
        score_all(&ctx).into_iter().map(|c| c.comparable_score).collect()
    }

    #[test]
    fn test_strategy_selection_matches_type() {
        for t in CompetitionType::ALL {
            assert_eq!(strategy_for(t).competition_type(), t);
        }
    }

    #[test]
    fn test_streak_resets_on_miss() {
        let runner = user("a", &[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0), (5, 1.0), (6, 0.1)]);
        let c = competition(CompetitionType::Streaks, Some(1.0), Some(3), vec![runner]);

        assert_eq!(scores(&c, 6), vec![5.0], "today still open");
        assert_eq!(scores(&c, 7), vec![0.0], "miss closes the streak");
    }

    #[test]
    fn test_streak_counts_today_once_met() {
        let runner = user("a", &[(1, 1.0), (2, 2.0)]);
        let c = competition(CompetitionType::Streaks, Some(1.0), Some(1), vec![runner]);
        assert_eq!(scores(&c, 2), vec![2.0]);
    }

    #[test]
    fn test_streak_frozen_at_elimination() {
        let runner = user("a", &[(1, 1.2), (2, 0.0), (3, 5.0)]);
        let c = competition(CompetitionType::Streaks, Some(1.0), Some(1), vec![runner]);
        // Eliminated on day 2; the later run doesn't revive the streak
        assert_eq!(scores(&c, 4), vec![1.0]);
    }

    #[test]
    fn test_clash_strict_winner_scores() {
        let c = competition(
            CompetitionType::Clash,
            None,
            Some(3),
            vec![user("a", &[(1, 5.0)]), user("b", &[(1, 3.0)])],
        );
        assert_eq!(scores(&c, 2), vec![1.0, 0.0]);
    }

    #[test]
    fn test_clash_tie_scores_nobody() {
        let c = competition(
            CompetitionType::Clash,
            None,
            Some(3),
            vec![user("a", &[(1, 4.0)]), user("b", &[(1, 4.0)])],
        );
        assert_eq!(scores(&c, 2), vec![0.0, 0.0]);
    }

    #[test]
    fn test_clash_open_interval_is_pending() {
        let c = competition(
            CompetitionType::Clash,
            None,
            Some(3),
            vec![user("a", &[(1, 5.0)]), user("b", &[(1, 3.0)])],
        );
        let ctx = ScoringContext::new(&c, day(1), Weekday::Mon);
        let card = strategy_for(CompetitionType::Clash).score(&ctx, &c.users[0]);
        assert_eq!(card.comparable_score, 0.0);
        assert_eq!(card.outcomes[0].kind, OutcomeKind::Pending);
    }

    #[test]
    fn test_clash_ignores_pending_invites() {
        let mut pending = user("b", &[(1, 9.0)]);
        pending.invite_status = crate::models::InviteStatus::Pending;
        let c = competition(
            CompetitionType::Clash,
            None,
            Some(3),
            vec![user("a", &[(1, 5.0)]), pending, user("c", &[(1, 1.0)])],
        );
        assert_eq!(scores(&c, 2), vec![1.0, 0.0]);
    }

    #[test]
    fn test_apex_sums_window_only() {
        let runner = user("a", &[(1, 2.5), (2, 3.0), (3, 1.5)]).with_interval(
            IntervalKey::from_start(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()),
            100.0,
        );
        let c = competition(CompetitionType::Apex, None, None, vec![runner]);
        assert_eq!(scores(&c, 3), vec![7.0]);
    }

    #[test]
    fn test_targets_counts_hits() {
        let runner = user("a", &[(1, 1.0), (2, 0.5), (3, 3.0), (4, 1.0)]);
        let c = competition(CompetitionType::Targets, Some(1.0), None, vec![runner]);
        assert_eq!(scores(&c, 4), vec![3.0]);
    }

    #[test]
    fn test_race_exact_goal_finishes() {
        assert!(RaceScoring::has_finished(26.2, 26.2));
        assert!(!RaceScoring::has_finished(26.1, 26.2));

        let runner = user("a", &[(1, 10.0), (2, 16.0)]);
        let c = competition(CompetitionType::Race, Some(26.0), None, vec![runner]);
        let total = scores(&c, 2)[0];
        assert_eq!(total, 26.0);
        assert!(RaceScoring::has_finished(total, 26.0));
    }

    #[test]
    fn test_window_stops_at_end_date() {
        let runner = user("a", &[(1, 1.0), (2, 1.0), (3, 1.0)]);
        let mut c = competition(CompetitionType::Apex, None, None, vec![runner]);
        c.options.end_date = Some(at(3));
        assert_eq!(scores(&c, 10), vec![2.0]);
    }

    #[test]
    fn test_final_partial_interval_only_counts_when_met() {
        let runner = user("a", &[(1, 1.0), (2, 1.0), (3, 0.2)]);
        let mut c = competition(CompetitionType::Streaks, Some(1.0), Some(1), vec![runner]);
        c.status = CompetitionStatus::Finished;
        c.options.end_date = Some(Utc.with_ymd_and_hms(2026, 4, 3, 10, 0, 0).unwrap());
        assert_eq!(scores(&c, 20), vec![2.0]);

        c.users[0].intervals.insert(key(3), 1.5);
        assert_eq!(scores(&c, 20), vec![3.0]);
    }

    #[test]
    fn test_not_started_scores_zero() {
        let runner = user("a", &[(1, 1.0)]);
        let mut c = competition(CompetitionType::Race, Some(5.0), None, vec![runner]);
        c.options.start_date = None;
        assert_eq!(scores(&c, 3), vec![0.0]);
    }
}
