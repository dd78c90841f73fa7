// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Data Models
//!
//! Core data structures shared by the competition engine, the store and the
//! service layer.
//!
//! ## Core Models
//!
//! - [`Competition`]: one instance of a challenge between friends
//! - [`CompetitionUser`]: a participant's membership record and interval history
//! - [`CompetitionOptions`]: goal, unit, bucketing and life budget settings
//! - [`Trophy`]: immutable outcome record minted when a competition finishes
//! - [`Workout`] / [`DailyDistance`]: what the workout data provider hands us

use crate::engine::interval::{IntervalCalendar, IntervalKey};
use crate::errors::{CompetitionError, CompetitionResult};
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::units::{METERS_PER_KILOMETER, METERS_PER_MILE};

/// The five scoring games a competition can be played as.
///
/// Fixed at creation time; the scoring strategy is selected once from this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionType {
    /// Keep a streak of intervals at or above the goal; misses cost lives
    Streaks,
    /// Head-to-head: the best distance of each interval earns a point
    Clash,
    /// Highest total distance over a fixed duration
    Apex,
    /// One point per interval where the goal was hit
    Targets,
    /// First to cover the goal distance wins
    Race,
}

impl CompetitionType {
    pub const ALL: [CompetitionType; 5] = [
        Self::Streaks,
        Self::Clash,
        Self::Apex,
        Self::Targets,
        Self::Race,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaks => "streaks",
            Self::Clash => "clash",
            Self::Apex => "apex",
            Self::Targets => "targets",
            Self::Race => "race",
        }
    }

    /// Whether `options.goal` carries meaning for this variant
    pub fn requires_goal(&self) -> bool {
        matches!(self, Self::Streaks | Self::Targets | Self::Race)
    }

    /// Whether `options.lives_budget` ("first to") is mandatory
    pub fn requires_lives_budget(&self) -> bool {
        matches!(self, Self::Streaks | Self::Clash)
    }

    /// Whether the interval bucket must be chosen explicitly
    pub fn requires_interval_bucket(&self) -> bool {
        matches!(self, Self::Apex | Self::Targets | Self::Clash)
    }

    /// Whether the competition only ends when its duration runs out
    pub fn requires_duration(&self) -> bool {
        matches!(self, Self::Apex | Self::Targets)
    }

    /// Whether missed intervals cost lives
    pub fn uses_lives(&self) -> bool {
        matches!(self, Self::Streaks)
    }
}

impl fmt::Display for CompetitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompetitionType {
    type Err = CompetitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CompetitionError::DecodeFailure(format!("unknown competition type: {s}")))
    }
}

/// Lifecycle state. Ordering follows the only legal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionStatus {
    Lobby,
    Scheduled,
    Active,
    Finished,
}

impl CompetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompetitionStatus {
    type Err = CompetitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lobby" => Ok(Self::Lobby),
            "scheduled" => Ok(Self::Scheduled),
            "active" => Ok(Self::Active),
            "finished" => Ok(Self::Finished),
            other => Err(CompetitionError::DecodeFailure(format!(
                "unknown competition status: {other}"
            ))),
        }
    }
}

/// Size of the scoring time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalBucket {
    #[default]
    Day,
    Week,
    Month,
}

impl FromStr for IntervalBucket {
    type Err = CompetitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            other => Err(CompetitionError::DecodeFailure(format!(
                "unknown interval bucket: {other}"
            ))),
        }
    }
}

/// Distance unit a competition is expressed in.
///
/// Goals and interval distances are stored in this unit; conversion is only
/// needed when ingesting provider data (meters) or for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
    Meters,
}

impl DistanceUnit {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            Self::Miles => METERS_PER_MILE,
            Self::Kilometers => METERS_PER_KILOMETER,
            Self::Meters => 1.0,
        }
    }

    pub fn from_meters(&self, meters: f64) -> f64 {
        meters / self.meters_per_unit()
    }

    /// Convert a value expressed in `self` into `target`
    pub fn convert(&self, value: f64, target: DistanceUnit) -> f64 {
        target.from_meters(value * self.meters_per_unit())
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Self::Miles => "mi",
            Self::Kilometers => "km",
            Self::Meters => "m",
        }
    }
}

/// Kinds of workouts that may contribute distance to a competition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Walk,
    Run,
    Hike,
    Ride,
    Swim,
    WheelchairWalk,
    WheelchairRun,
    /// Provider-specific kind that doesn't map to the standard categories
    Other(String),
}

/// Invite state of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

/// Competition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionOptions {
    /// Distance threshold per interval (Race: total distance). Absent for Clash/Apex
    pub goal: Option<f64>,
    pub unit: DistanceUnit,
    #[serde(default)]
    pub interval_bucket: IntervalBucket,
    /// "First to": misses before elimination (Streaks), points to win (Clash)
    pub lives_budget: Option<u32>,
    pub duration_hours: Option<u32>,
    /// Start instant requested by the owner when scheduling
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Set when the competition becomes active
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Set at activation for fixed-length competitions, or when it finishes
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl CompetitionOptions {
    /// Goal with absent treated as no threshold
    pub fn goal_or_zero(&self) -> f64 {
        self.goal.unwrap_or(0.0)
    }

    pub fn lives_budget_or_zero(&self) -> u32 {
        self.lives_budget.unwrap_or(0)
    }
}

/// A participant's membership record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionUser {
    pub user_id: String,
    pub invite_status: InviteStatus,
    /// Server-computed aggregate; meaning depends on the competition type
    #[serde(default)]
    pub score: f64,
    /// Accumulated distance per canonical interval key
    #[serde(default)]
    pub intervals: BTreeMap<IntervalKey, f64>,
    /// Authoritative lives left, once the server has settled elimination state
    #[serde(default)]
    pub remaining_lives: Option<u32>,
}

impl CompetitionUser {
    pub fn invited(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            invite_status: InviteStatus::Pending,
            score: 0.0,
            intervals: BTreeMap::new(),
            remaining_lives: None,
        }
    }

    pub fn accepted(user_id: impl Into<String>) -> Self {
        Self {
            invite_status: InviteStatus::Accepted,
            ..Self::invited(user_id)
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.invite_status == InviteStatus::Accepted
    }

    /// Distance recorded for an interval; a missing record is zero
    pub fn distance_for(&self, key: &IntervalKey) -> f64 {
        self.intervals.get(key).copied().unwrap_or(0.0)
    }

    pub fn with_interval(mut self, key: IntervalKey, distance: f64) -> Self {
        self.intervals.insert(key, distance);
        self
    }
}

/// Parameters for creating a competition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompetition {
    pub name: String,
    pub competition_type: CompetitionType,
    #[serde(default)]
    pub workout_filters: BTreeSet<ActivityKind>,
    pub goal: Option<f64>,
    #[serde(default)]
    pub unit: DistanceUnit,
    pub lives_budget: Option<u32>,
    pub interval_bucket: Option<IntervalBucket>,
    pub duration_hours: Option<u32>,
}

/// Settings edit. Only allowed while the competition sits in the lobby.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompetitionUpdate {
    pub name: Option<String>,
    pub goal: Option<f64>,
    pub unit: Option<DistanceUnit>,
    pub lives_budget: Option<u32>,
    pub interval_bucket: Option<IntervalBucket>,
    /// `Some(None)` clears the duration
    pub duration_hours: Option<Option<u32>>,
    pub workout_filters: Option<BTreeSet<ActivityKind>>,
}

/// One instance of a challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub competition_type: CompetitionType,
    pub owner: String,
    pub status: CompetitionStatus,
    pub options: CompetitionOptions,
    #[serde(default)]
    pub workout_filters: BTreeSet<ActivityKind>,
    pub users: Vec<CompetitionUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Competition {
    /// Create a competition in the lobby with the owner as its only member
    pub fn new(owner: &str, params: NewCompetition, now: DateTime<Utc>) -> CompetitionResult<Self> {
        let name = params.name.trim().to_string();
        if name.is_empty() {
            return Err(CompetitionError::InvalidOptions(
                "competition name must not be empty".into(),
            ));
        }

        let competition_type = params.competition_type;
        if competition_type.requires_interval_bucket() && params.interval_bucket.is_none() {
            return Err(CompetitionError::InvalidOptions(format!(
                "{competition_type} competitions need an interval bucket"
            )));
        }

        let competition = Self {
            id: Uuid::new_v4(),
            name,
            competition_type,
            owner: owner.to_string(),
            status: CompetitionStatus::Lobby,
            options: CompetitionOptions {
                goal: params.goal,
                unit: params.unit,
                interval_bucket: params.interval_bucket.unwrap_or_default(),
                lives_budget: params.lives_budget,
                duration_hours: params.duration_hours,
                scheduled_start: None,
                start_date: None,
                end_date: None,
            },
            workout_filters: params.workout_filters,
            users: vec![CompetitionUser::accepted(owner)],
            created_at: now,
            updated_at: now,
        };

        validate_options(competition_type, &competition.options)?;
        Ok(competition)
    }

    /// Apply a settings edit, re-validating the result
    pub fn apply_update(&self, update: CompetitionUpdate, now: DateTime<Utc>) -> CompetitionResult<Self> {
        let mut next = self.clone();
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CompetitionError::InvalidOptions(
                    "competition name must not be empty".into(),
                ));
            }
            next.name = name;
        }
        if let Some(goal) = update.goal {
            next.options.goal = Some(goal);
        }
        if let Some(unit) = update.unit {
            next.options.unit = unit;
        }
        if let Some(lives) = update.lives_budget {
            next.options.lives_budget = Some(lives);
        }
        if let Some(bucket) = update.interval_bucket {
            next.options.interval_bucket = bucket;
        }
        if let Some(duration) = update.duration_hours {
            next.options.duration_hours = duration;
        }
        if let Some(filters) = update.workout_filters {
            next.workout_filters = filters;
        }
        validate_options(next.competition_type, &next.options)?;
        next.updated_at = now;
        Ok(next)
    }

    pub fn member(&self, user_id: &str) -> Option<&CompetitionUser> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: &str) -> Option<&mut CompetitionUser> {
        self.users.iter_mut().find(|u| u.user_id == user_id)
    }

    pub fn accepted_users(&self) -> impl Iterator<Item = &CompetitionUser> {
        self.users.iter().filter(|u| u.is_accepted())
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted_users().count()
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner == user_id
    }

    /// UTC calendar date the scoring window starts on
    pub fn start_day(&self) -> Option<NaiveDate> {
        self.options.start_date.map(|d| d.date_naive())
    }

    /// Check structural invariants of a decoded or fetched competition
    pub fn validate(&self) -> CompetitionResult<()> {
        match self.member(&self.owner) {
            Some(owner) if owner.is_accepted() => {}
            Some(_) => {
                return Err(CompetitionError::DecodeFailure(format!(
                    "owner {} of competition {} is not an accepted member",
                    self.owner, self.id
                )))
            }
            None => {
                return Err(CompetitionError::DecodeFailure(format!(
                    "owner {} missing from competition {}",
                    self.owner, self.id
                )))
            }
        }

        let mut seen = BTreeSet::new();
        let mut week_starts = BTreeSet::new();
        for user in &self.users {
            if !seen.insert(user.user_id.as_str()) {
                return Err(CompetitionError::DecodeFailure(format!(
                    "user {} appears twice in competition {}",
                    user.user_id, self.id
                )));
            }
            for key in user.intervals.keys() {
                let Some(start) = key.start_date() else {
                    return Err(non_canonical(key, &user.user_id));
                };
                // Week keys must all share one first weekday; which one is a config concern
                let canonical = match self.options.interval_bucket {
                    IntervalBucket::Day => true,
                    IntervalBucket::Week => {
                        week_starts.insert(start.weekday().num_days_from_monday());
                        week_starts.len() == 1
                    }
                    IntervalBucket::Month => start.day() == 1,
                };
                if !canonical {
                    return Err(non_canonical(key, &user.user_id));
                }
            }
        }
        Ok(())
    }

    /// [`Competition::validate`] plus every interval key starting a bucket
    /// under the given week convention
    pub fn validate_with_calendar(&self, first_weekday: Weekday) -> CompetitionResult<()> {
        self.validate()?;
        let calendar = IntervalCalendar::for_competition(self, first_weekday);
        for user in &self.users {
            if let Some(key) = user.intervals.keys().find(|key| !calendar.is_canonical(key)) {
                return Err(non_canonical(key, &user.user_id));
            }
        }
        Ok(())
    }
}

fn non_canonical(key: &IntervalKey, user_id: &str) -> CompetitionError {
    CompetitionError::DecodeFailure(format!("non-canonical interval key {key} for user {user_id}"))
}

/// Validate options against what the competition type needs
pub fn validate_options(competition_type: CompetitionType, options: &CompetitionOptions) -> CompetitionResult<()> {
    if competition_type.requires_goal() {
        match options.goal {
            Some(goal) if goal.is_finite() && goal > 0.0 => {}
            _ => {
                return Err(CompetitionError::InvalidOptions(format!(
                    "{competition_type} competitions need a positive goal"
                )))
            }
        }
    }
    if competition_type.requires_lives_budget() && options.lives_budget_or_zero() == 0 {
        return Err(CompetitionError::InvalidOptions(format!(
            "{competition_type} competitions need a lives budget of at least 1"
        )));
    }
    if competition_type.requires_duration() && options.duration_hours.unwrap_or(0) == 0 {
        return Err(CompetitionError::InvalidOptions(format!(
            "{competition_type} competitions need a duration"
        )));
    }
    if matches!(options.duration_hours, Some(0)) {
        return Err(CompetitionError::InvalidOptions(
            "duration must be at least one hour".into(),
        ));
    }
    Ok(())
}

/// Immutable record of a finished competition's outcome for one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trophy {
    pub id: Uuid,
    pub competition_id: Uuid,
    pub competition_name: String,
    pub competition_type: CompetitionType,
    pub user_id: String,
    /// 1-based final position
    pub placement: u32,
    pub score: f64,
    pub awarded_at: DateTime<Utc>,
}

/// A single recorded workout as delivered by a data provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub kind: ActivityKind,
    pub start_date: DateTime<Utc>,
    pub distance_meters: f64,
}

/// Already-aggregated distance for one UTC calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyDistance {
    pub date: NaiveDate,
    pub distance_meters: f64,
}
