// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Lifecycle State Machine
//!
//! `lobby -> scheduled -> active -> finished`, never backwards.
//!
//! Every transition takes the current competition by reference and returns
//! the next value, so a rejected transition leaves the input untouched.

use super::ranking::{placements, Leaderboard};
use super::scoring::{score_all, RaceScoring, ScoringContext};
use crate::config::EngineConfig;
use crate::errors::{CompetitionError, CompetitionResult};
use crate::models::{Competition, CompetitionStatus, CompetitionType, InviteStatus, Trophy};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a competition finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FinishReason {
    /// The fixed duration ran out
    DurationElapsed,
    /// Race: a participant covered the goal distance
    GoalReached { user_id: String },
    /// Clash: a participant collected the points needed to win
    PointsTargetReached { user_id: String },
    /// Streaks: at most one participant is still alive
    LastSurvivor { user_id: Option<String> },
    /// The owner ended it
    Terminated,
}

/// A competition that just finished, with the trophies it minted
#[derive(Debug, Clone)]
pub struct Finished {
    pub competition: Competition,
    pub trophies: Vec<Trophy>,
    pub reason: FinishReason,
}

fn ensure_owner(competition: &Competition, actor: &str, action: &'static str) -> CompetitionResult<()> {
    if competition.is_owner(actor) {
        Ok(())
    } else {
        Err(CompetitionError::PermissionDenied { action })
    }
}

fn ensure_status(
    competition: &Competition,
    allowed: &[CompetitionStatus],
    action: &'static str,
) -> CompetitionResult<()> {
    if allowed.contains(&competition.status) {
        Ok(())
    } else {
        Err(CompetitionError::InvalidTransition {
            from: competition.status,
            action,
        })
    }
}

fn ensure_participants(competition: &Competition, config: &EngineConfig) -> CompetitionResult<()> {
    let accepted = competition.accepted_count();
    if accepted < config.min_participants {
        return Err(CompetitionError::InsufficientParticipants {
            required: config.min_participants,
            accepted,
        });
    }
    Ok(())
}

/// Settings may only change while the owner is still gathering people
pub fn ensure_editable(competition: &Competition, actor: &str) -> CompetitionResult<()> {
    ensure_owner(competition, actor, "edit the competition")?;
    ensure_status(competition, &[CompetitionStatus::Lobby], "edit")
}

/// Invites are handed out before the competition starts
pub fn ensure_inviting(competition: &Competition, actor: &str) -> CompetitionResult<()> {
    ensure_owner(competition, actor, "invite participants")?;
    ensure_status(
        competition,
        &[CompetitionStatus::Lobby, CompetitionStatus::Scheduled],
        "invite to",
    )
}

/// Owner picks a future start instant
pub fn schedule(
    competition: &Competition,
    actor: &str,
    start_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CompetitionResult<Competition> {
    ensure_owner(competition, actor, "schedule the competition")?;
    ensure_status(competition, &[CompetitionStatus::Lobby], "schedule")?;
    if start_at <= now {
        return Err(CompetitionError::InvalidOptions(
            "scheduled start must be in the future".into(),
        ));
    }
    let has_invitee = competition
        .users
        .iter()
        .any(|u| u.user_id != competition.owner && u.invite_status != InviteStatus::Declined);
    if !has_invitee {
        return Err(CompetitionError::InsufficientParticipants {
            required: 2,
            accepted: competition.accepted_count(),
        });
    }

    let mut next = competition.clone();
    next.status = CompetitionStatus::Scheduled;
    next.options.scheduled_start = Some(start_at);
    next.updated_at = now;
    Ok(next)
}

fn activate(competition: &Competition, start: DateTime<Utc>, now: DateTime<Utc>) -> Competition {
    let mut next = competition.clone();
    next.status = CompetitionStatus::Active;
    next.options.start_date = Some(start);
    next.options.end_date = competition
        .options
        .duration_hours
        .map(|hours| start + Duration::hours(i64::from(hours)));
    next.updated_at = now;
    next
}

/// Owner-triggered "start now"
pub fn start_now(
    competition: &Competition,
    actor: &str,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> CompetitionResult<Competition> {
    ensure_owner(competition, actor, "start the competition")?;
    ensure_status(
        competition,
        &[CompetitionStatus::Lobby, CompetitionStatus::Scheduled],
        "start",
    )?;
    ensure_participants(competition, config)?;
    Ok(activate(competition, now, now))
}

/// Automatic activation once the scheduled instant has passed.
///
/// Returns `None` when nothing should change yet.
pub fn activate_if_due(
    competition: &Competition,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Option<Competition> {
    if competition.status != CompetitionStatus::Scheduled {
        return None;
    }
    let start = competition.options.scheduled_start?;
    if start > now || ensure_participants(competition, config).is_err() {
        return None;
    }
    Some(activate(competition, start, now))
}

/// Variant-specific end condition for an active competition
pub fn end_condition(
    competition: &Competition,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Option<FinishReason> {
    if competition.status != CompetitionStatus::Active {
        return None;
    }

    let ctx = ScoringContext::new(competition, now.date_naive(), config.first_weekday);
    let options = &competition.options;

    let by_rules = match competition.competition_type {
        CompetitionType::Race => {
            let goal = options.goal_or_zero();
            score_all(&ctx)
                .into_iter()
                .filter(|card| RaceScoring::has_finished(card.comparable_score, goal))
                .max_by(|a, b| {
                    a.comparable_score
                        .partial_cmp(&b.comparable_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        // max_by keeps the last of equals; prefer earlier members
                        .then(std::cmp::Ordering::Greater)
                })
                .map(|card| FinishReason::GoalReached { user_id: card.user_id })
        }
        CompetitionType::Clash => {
            let target = f64::from(options.lives_budget_or_zero());
            let leaderboard = Leaderboard::build(competition, ctx.as_of, None, config);
            leaderboard
                .leader()
                .filter(|leader| target > 0.0 && leader.comparable_score >= target)
                .map(|leader| FinishReason::PointsTargetReached {
                    user_id: leader.user_id.clone(),
                })
        }
        CompetitionType::Streaks => {
            let leaderboard = Leaderboard::build(competition, ctx.as_of, None, config);
            if competition.accepted_count() >= 2 && leaderboard.active.len() <= 1 {
                Some(FinishReason::LastSurvivor {
                    user_id: leaderboard.leader().map(|s| s.user_id.clone()),
                })
            } else {
                None
            }
        }
        CompetitionType::Apex | CompetitionType::Targets => None,
    };

    by_rules.or_else(|| {
        options
            .end_date
            .filter(|end| *end <= now)
            .map(|_| FinishReason::DurationElapsed)
    })
}

/// Close an active competition and mint a trophy for every accepted participant
pub fn finish(
    competition: &Competition,
    reason: FinishReason,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> CompetitionResult<Finished> {
    ensure_status(competition, &[CompetitionStatus::Active], "finish")?;

    let mut next = competition.clone();
    next.options.end_date = Some(match competition.options.end_date {
        Some(end) if end <= now => end,
        _ => now,
    });

    // Final standings are taken on the last day that belongs to the competition
    let final_day = next
        .options
        .end_date
        .map(|end| (end - Duration::nanoseconds(1)).date_naive())
        .unwrap_or_else(|| now.date_naive());
    next.status = CompetitionStatus::Finished;
    let leaderboard = Leaderboard::build(&next, final_day, None, config);

    let standings = leaderboard.full_standings();
    let trophies = placements(&standings, config.placement_policy)
        .into_iter()
        .map(|placement| Trophy {
            id: Uuid::new_v4(),
            competition_id: next.id,
            competition_name: next.name.clone(),
            competition_type: next.competition_type,
            user_id: placement.user_id,
            placement: placement.placement,
            score: placement.score,
            awarded_at: now,
        })
        .collect::<Vec<_>>();

    for standing in standings {
        if let Some(user) = next.member_mut(&standing.user_id) {
            user.score = standing.comparable_score;
            if let Some(lives) = &standing.lives {
                user.remaining_lives = Some(lives.lives_remaining);
            }
        }
    }
    next.updated_at = now;

    Ok(Finished {
        competition: next,
        trophies,
        reason,
    })
}

/// Owner-triggered early end
pub fn terminate(
    competition: &Competition,
    actor: &str,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> CompetitionResult<Finished> {
    ensure_owner(competition, actor, "end the competition")?;
    finish(competition, FinishReason::Terminated, now, config)
}
