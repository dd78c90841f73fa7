// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Flex / nudge rate limiting
//!
//! Flex: once per UTC day per `(competition, actor)`, only after the actor met
//! today's goal. Nudge: once per UTC day per `(competition, actor, target)`,
//! only while the target has not met it.

use super::interval::IntervalCalendar;
use super::scoring::{strategy_for, ScoringContext};
use crate::errors::{CompetitionError, CompetitionResult};
use crate::models::{Competition, CompetitionStatus, CompetitionType, CompetitionUser};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialActionKind {
    Flex,
    Nudge,
}

impl SocialActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flex => "flex",
            Self::Nudge => "nudge",
        }
    }
}

impl fmt::Display for SocialActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialActionKind {
    type Err = CompetitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flex" => Ok(Self::Flex),
            "nudge" => Ok(Self::Nudge),
            other => Err(CompetitionError::DecodeFailure(format!(
                "unknown social action: {other}"
            ))),
        }
    }
}

/// A flex or nudge that went through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialAction {
    pub competition_id: Uuid,
    pub actor_id: String,
    pub target_id: Option<String>,
    pub kind: SocialActionKind,
    /// UTC calendar day the action counts against
    pub day: NaiveDate,
    pub performed_at: DateTime<Utc>,
}

impl SocialAction {
    fn same_slot(&self, other: &SocialAction) -> bool {
        self.competition_id == other.competition_id
            && self.actor_id == other.actor_id
            && self.target_id == other.target_id
            && self.kind == other.kind
            && self.day == other.day
    }
}

/// Whether a participant is done for the current interval.
///
/// Goal-based variants compare the current interval with the goal, Race
/// compares the running total, and Clash/Apex (no per-interval goal) count
/// any distance logged in the current interval.
pub fn has_met_current_goal(
    competition: &Competition,
    user: &CompetitionUser,
    now: DateTime<Utc>,
    first_weekday: Weekday,
) -> bool {
    let today = now.date_naive();
    let calendar = IntervalCalendar::for_competition(competition, first_weekday);
    let current = user.distance_for(&calendar.key(today));
    let goal = competition.options.goal_or_zero();

    match competition.competition_type {
        CompetitionType::Streaks | CompetitionType::Targets => current >= goal,
        CompetitionType::Race => {
            let ctx = ScoringContext::new(competition, today, first_weekday);
            strategy_for(CompetitionType::Race).score(&ctx, user).comparable_score >= goal
        }
        CompetitionType::Clash | CompetitionType::Apex => current > 0.0,
    }
}

fn accepted_member<'a>(competition: &'a Competition, user_id: &str) -> CompetitionResult<&'a CompetitionUser> {
    competition
        .member(user_id)
        .filter(|u| u.is_accepted())
        .ok_or_else(|| CompetitionError::NotParticipant(user_id.to_string()))
}

fn ensure_active(competition: &Competition, action: &'static str) -> CompetitionResult<()> {
    if competition.status == CompetitionStatus::Active {
        Ok(())
    } else {
        Err(CompetitionError::InvalidTransition {
            from: competition.status,
            action,
        })
    }
}

fn ensure_not_repeated(candidate: &SocialAction, history: &[SocialAction]) -> CompetitionResult<()> {
    if history.iter().any(|done| done.same_slot(candidate)) {
        return Err(CompetitionError::AlreadyPerformedToday {
            action: candidate.kind,
        });
    }
    Ok(())
}

/// Check a flex; on success returns the record to persist before dispatching
pub fn authorize_flex(
    competition: &Competition,
    actor_id: &str,
    history: &[SocialAction],
    now: DateTime<Utc>,
    first_weekday: Weekday,
) -> CompetitionResult<SocialAction> {
    ensure_active(competition, "flex in")?;
    let actor = accepted_member(competition, actor_id)?;

    let candidate = SocialAction {
        competition_id: competition.id,
        actor_id: actor_id.to_string(),
        target_id: None,
        kind: SocialActionKind::Flex,
        day: now.date_naive(),
        performed_at: now,
    };
    ensure_not_repeated(&candidate, history)?;

    if !has_met_current_goal(competition, actor, now, first_weekday) {
        return Err(CompetitionError::GoalNotMet);
    }
    Ok(candidate)
}

/// Check a nudge; on success returns the record to persist before dispatching
pub fn authorize_nudge(
    competition: &Competition,
    actor_id: &str,
    target_id: &str,
    history: &[SocialAction],
    now: DateTime<Utc>,
    first_weekday: Weekday,
) -> CompetitionResult<SocialAction> {
    ensure_active(competition, "nudge in")?;
    accepted_member(competition, actor_id)?;
    let target = accepted_member(competition, target_id)?;
    if actor_id == target_id {
        return Err(CompetitionError::SelfTarget {
            action: SocialActionKind::Nudge,
        });
    }

    let candidate = SocialAction {
        competition_id: competition.id,
        actor_id: actor_id.to_string(),
        target_id: Some(target_id.to_string()),
        kind: SocialActionKind::Nudge,
        day: now.date_naive(),
        performed_at: now,
    };
    ensure_not_repeated(&candidate, history)?;

    if has_met_current_goal(competition, target, now, first_weekday) {
        return Err(CompetitionError::TargetAlreadyDone {
            target: target_id.to_string(),
        });
    }
    Ok(candidate)
}
