// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Competition Service
//!
//! The authoritative side of the competition engine. Every operation loads
//! the stored competition, runs the pure engine rules over it and persists the
//! result. Mutations of one competition are serialized through a per-competition
//! lock so concurrent settlements can't lose `score` or `remaining_lives` updates.

use crate::config::{Config, EngineConfig};
use crate::database::Database;
use crate::engine::elimination;
use crate::engine::interval::IntervalCalendar;
use crate::engine::lifecycle::{self, FinishReason};
use crate::engine::ranking::Leaderboard;
use crate::engine::scoring::{score_all, ScoringContext};
use crate::engine::throttle::{self, SocialAction, SocialActionKind};
use crate::errors::{CompetitionError, CompetitionResult};
use crate::logging::AppLogger;
use crate::models::{
    Competition, CompetitionStatus, CompetitionType, CompetitionUpdate, CompetitionUser, InviteStatus,
    NewCompetition, Trophy,
};
use crate::notifications::{NotificationDispatcher, SocialEvent, TracingDispatcher};
use crate::providers::{create_provider, WorkoutDataProvider};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Client-chosen token that makes a retried mutation a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub Uuid);

impl IdempotencyKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

/// What a settlement pass did to one competition
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub competition: Competition,
    pub status_before: CompetitionStatus,
    pub finish_reason: Option<FinishReason>,
    pub trophies: Vec<Trophy>,
}

impl SettlementOutcome {
    pub fn status_changed(&self) -> bool {
        self.status_before != self.competition.status
    }
}

const REPLAYED: &str = "ok";

pub struct CompetitionService {
    database: Database,
    provider: Arc<dyn WorkoutDataProvider>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    locks: LockMap,
    create_locks: LockMap,
}

type LockMap = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

fn keyed_lock(map: &LockMap, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = map.lock().unwrap_or_else(|e| e.into_inner());
    locks.entry(id).or_default().clone()
}

fn release_keyed_lock(map: &LockMap, id: Uuid) {
    map.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
}

impl CompetitionService {
    pub fn new(
        database: Database,
        provider: Arc<dyn WorkoutDataProvider>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            database,
            provider,
            dispatcher,
            config,
            clock: Arc::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
            create_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wire up storage and the workout provider named in the configuration
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let database = Database::new(&config.database.url).await?;
        let provider: Arc<dyn WorkoutDataProvider> = Arc::from(create_provider(&config.workout_provider)?);
        info!(
            provider = provider.provider_name(),
            database.url = %config.database.url,
            "Competition service ready"
        );
        Ok(Self::new(
            database,
            provider,
            Arc::new(TracingDispatcher),
            config.engine.clone(),
        ))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock_for(&self, competition_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        keyed_lock(&self.locks, competition_id)
    }

    fn forget_lock(&self, competition_id: Uuid) {
        release_keyed_lock(&self.locks, competition_id);
    }

    async fn fetch(&self, competition_id: Uuid) -> CompetitionResult<Competition> {
        self.database
            .get_competition(competition_id)
            .await?
            .ok_or_else(|| CompetitionError::NotFound(competition_id.to_string()))
    }

    /// Stored result for a key already used by `operation`. A key first
    /// used by a different operation is refused.
    async fn replayed(&self, key: Option<IdempotencyKey>, operation: &str) -> CompetitionResult<Option<String>> {
        let Some(IdempotencyKey(key)) = key else {
            return Ok(None);
        };
        match self.database.idempotency_result(key).await? {
            Some((stored, result)) if stored == operation => Ok(Some(result)),
            Some((stored, _)) => Err(CompetitionError::IdempotencyKeyReused {
                key: key.to_string(),
                operation: stored,
            }),
            None => Ok(None),
        }
    }

    async fn remember(&self, key: Option<IdempotencyKey>, operation: &str, result: &str) -> CompetitionResult<()> {
        if let Some(IdempotencyKey(key)) = key {
            self.database
                .record_idempotency_key(key, operation, result, self.now())
                .await?;
        }
        Ok(())
    }

    fn ensure_visible(competition: &Competition, caller: &str) -> CompetitionResult<()> {
        match competition.member(caller) {
            Some(user) if user.invite_status != InviteStatus::Declined => Ok(()),
            _ => Err(CompetitionError::Unauthorized {
                user_id: caller.to_string(),
                competition_id: competition.id.to_string(),
            }),
        }
    }

    /// Fetch a competition the caller belongs to
    pub async fn load_competition(&self, competition_id: Uuid, caller: &str) -> CompetitionResult<Competition> {
        let competition = self.fetch(competition_id).await?;
        Self::ensure_visible(&competition, caller)?;
        Ok(competition)
    }

    /// Competitions the user was invited to or joined, newest first
    pub async fn competitions_for(&self, user_id: &str) -> CompetitionResult<Vec<Competition>> {
        let competitions = self.database.competitions_for_user(user_id).await?;
        Ok(competitions
            .into_iter()
            .filter(|c| Self::ensure_visible(c, user_id).is_ok())
            .collect())
    }

    pub async fn create_competition(
        &self,
        owner: &str,
        params: NewCompetition,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<Uuid> {
        // Retries of one create share a lock keyed by the idempotency key
        let lock = key.map(|IdempotencyKey(k)| keyed_lock(&self.create_locks, k));
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        if let Some(previous) = self.replayed(key, "create_competition").await? {
            return Uuid::parse_str(&previous)
                .map_err(|e| CompetitionError::DecodeFailure(format!("stored competition id {previous}: {e}")));
        }

        let competition = Competition::new(owner, params, self.now())?;
        let id = match key {
            Some(IdempotencyKey(k)) => {
                let id = self
                    .database
                    .insert_competition_once(&competition, k, "create_competition", self.now())
                    .await?;
                release_keyed_lock(&self.create_locks, k);
                id
            }
            None => self.database.insert_competition(&competition).await?,
        };
        if id != competition.id {
            return Ok(id);
        }

        info!(
            competition.id = %id,
            competition.kind = %competition.competition_type,
            user.id = %owner,
            "Competition created"
        );
        Ok(id)
    }

    pub async fn invite_user(
        &self,
        competition_id: Uuid,
        caller: &str,
        invitee: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, "invite_user").await?.is_some() {
            return Ok(());
        }

        let mut competition = self.fetch(competition_id).await?;
        lifecycle::ensure_inviting(&competition, caller)?;

        match competition.member_mut(invitee) {
            Some(user) if user.invite_status == InviteStatus::Declined => {
                user.invite_status = InviteStatus::Pending;
            }
            Some(_) => return Err(CompetitionError::AlreadyInvited(invitee.to_string())),
            None => competition.users.push(CompetitionUser::invited(invitee)),
        }
        competition.updated_at = self.now();

        self.database.save_competition(&competition).await?;
        self.remember(key, "invite_user", REPLAYED).await?;
        debug!(competition.id = %competition_id, user.id = %invitee, "User invited");
        Ok(())
    }

    async fn answer_invite(
        &self,
        competition_id: Uuid,
        caller: &str,
        answer: InviteStatus,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, "answer_invite").await?.is_some() {
            return Ok(());
        }

        let mut competition = self.fetch(competition_id).await?;
        if !matches!(
            competition.status,
            CompetitionStatus::Lobby | CompetitionStatus::Scheduled
        ) {
            return Err(CompetitionError::InvalidTransition {
                from: competition.status,
                action: "answer an invite to",
            });
        }

        let now = self.now();
        let user = competition
            .member_mut(caller)
            .ok_or_else(|| CompetitionError::Unauthorized {
                user_id: caller.to_string(),
                competition_id: competition_id.to_string(),
            })?;
        if user.invite_status != InviteStatus::Pending {
            return Err(CompetitionError::NotPending(caller.to_string()));
        }
        user.invite_status = answer;
        competition.updated_at = now;

        self.database.save_competition(&competition).await?;
        self.remember(key, "answer_invite", REPLAYED).await?;
        debug!(competition.id = %competition_id, user.id = %caller, answer = ?answer, "Invite answered");
        Ok(())
    }

    pub async fn accept_invite(
        &self,
        competition_id: Uuid,
        caller: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        self.answer_invite(competition_id, caller, InviteStatus::Accepted, key).await
    }

    pub async fn decline_invite(
        &self,
        competition_id: Uuid,
        caller: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        self.answer_invite(competition_id, caller, InviteStatus::Declined, key).await
    }

    pub async fn schedule_competition(
        &self,
        competition_id: Uuid,
        caller: &str,
        start_at: DateTime<Utc>,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, "schedule_competition").await?.is_some() {
            return Ok(());
        }

        let competition = self.fetch(competition_id).await?;
        let scheduled = lifecycle::schedule(&competition, caller, start_at, self.now())?;
        self.database.save_competition(&scheduled).await?;
        self.remember(key, "schedule_competition", REPLAYED).await?;

        AppLogger::log_lifecycle_transition(competition_id, competition.status, scheduled.status, Some(caller));
        Ok(())
    }

    pub async fn start_competition(
        &self,
        competition_id: Uuid,
        caller: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, "start_competition").await?.is_some() {
            return Ok(());
        }

        let competition = self.fetch(competition_id).await?;
        let started = lifecycle::start_now(&competition, caller, self.now(), &self.config)?;
        self.database.save_competition(&started).await?;
        self.remember(key, "start_competition", REPLAYED).await?;

        AppLogger::log_lifecycle_transition(competition_id, competition.status, started.status, Some(caller));
        Ok(())
    }

    pub async fn update_competition(
        &self,
        competition_id: Uuid,
        caller: &str,
        update: CompetitionUpdate,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, "update_competition").await?.is_some() {
            return Ok(());
        }

        let competition = self.fetch(competition_id).await?;
        lifecycle::ensure_editable(&competition, caller)?;
        let updated = competition.apply_update(update, self.now())?;
        self.database.save_competition(&updated).await?;
        self.remember(key, "update_competition", REPLAYED).await?;
        Ok(())
    }

    pub async fn delete_competition(
        &self,
        competition_id: Uuid,
        caller: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, "delete_competition").await?.is_some() {
            return Ok(());
        }

        let competition = self.fetch(competition_id).await?;
        if !competition.is_owner(caller) {
            return Err(CompetitionError::PermissionDenied {
                action: "delete the competition",
            });
        }
        if competition.status == CompetitionStatus::Finished {
            return Err(CompetitionError::InvalidTransition {
                from: competition.status,
                action: "delete",
            });
        }

        self.database.delete_competition(competition_id).await?;
        self.remember(key, "delete_competition", REPLAYED).await?;
        drop(_guard);
        self.forget_lock(competition_id);

        info!(competition.id = %competition_id, user.id = %caller, "Competition deleted");
        Ok(())
    }

    /// Last UTC day whose distance counts, as of `now`
    fn last_counted_day(competition: &Competition, now: DateTime<Utc>) -> NaiveDate {
        let today = now.date_naive();
        match competition.options.end_date {
            Some(end) => (end - Duration::nanoseconds(1)).date_naive().min(today),
            None => today,
        }
    }

    /// Replace interval records of `user_ids` with fresh provider data
    async fn pull_intervals(
        &self,
        competition: &mut Competition,
        user_ids: &[String],
        now: DateTime<Utc>,
    ) -> CompetitionResult<()> {
        let Some(from) = competition.start_day() else {
            return Ok(());
        };
        let to = Self::last_counted_day(competition, now);
        let calendar = IntervalCalendar::for_competition(competition, self.config.first_weekday);
        let unit = competition.options.unit;
        let filters = competition.workout_filters.clone();

        for user_id in user_ids {
            let days = self
                .provider
                .daily_distances(user_id, &filters, from, to)
                .await
                .map_err(|e| CompetitionError::Provider(format!("{e:#}")))?;
            if let Some(user) = competition.member_mut(user_id) {
                user.intervals = calendar.aggregate(&days, unit);
            }
        }
        Ok(())
    }

    async fn pull_accepted(&self, competition: &mut Competition, now: DateTime<Utc>) -> CompetitionResult<()> {
        let accepted: Vec<String> = competition.accepted_users().map(|u| u.user_id.clone()).collect();
        self.pull_intervals(competition, &accepted, now).await
    }

    /// Recompute scores and lives from the interval records
    fn recompute(&self, competition: &mut Competition, now: DateTime<Utc>) {
        // Derive from the records alone, ignoring whatever was settled before
        let mut baseline = competition.clone();
        for user in &mut baseline.users {
            user.remaining_lives = None;
        }
        let as_of = now.date_naive();
        let ctx = ScoringContext::new(&baseline, as_of, self.config.first_weekday);
        let cards = score_all(&ctx);
        let tracks_lives = competition.competition_type == CompetitionType::Streaks;

        for card in cards {
            let lives = baseline.member(&card.user_id).and_then(|user| {
                elimination::derived_status(&baseline, user, as_of, &ctx.calendar)
            });
            if let Some(user) = competition.member_mut(&card.user_id) {
                user.score = card.comparable_score;
                if tracks_lives {
                    user.remaining_lives = lives.map(|l| l.lives_remaining);
                }
            }
        }
    }

    async fn settle_locked(&self, competition: Competition) -> CompetitionResult<SettlementOutcome> {
        let now = self.now();
        let status_before = competition.status;
        let mut current = competition.clone();

        if let Some(activated) = lifecycle::activate_if_due(&current, now, &self.config) {
            AppLogger::log_lifecycle_transition(current.id, current.status, activated.status, None);
            current = activated;
        }

        if current.status != CompetitionStatus::Active {
            if current != competition {
                self.database.save_competition(&current).await?;
            }
            return Ok(SettlementOutcome {
                competition: current,
                status_before,
                finish_reason: None,
                trophies: Vec::new(),
            });
        }

        self.pull_accepted(&mut current, now).await?;
        self.recompute(&mut current, now);

        match lifecycle::end_condition(&current, now, &self.config) {
            Some(reason) => {
                let finished = lifecycle::finish(&current, reason, now, &self.config)?;
                self.database
                    .finish_competition(&finished.competition, &finished.trophies)
                    .await?;
                AppLogger::log_lifecycle_transition(
                    current.id,
                    current.status,
                    finished.competition.status,
                    None,
                );
                AppLogger::log_settlement(current.id, &format!("{:?}", finished.reason), finished.trophies.len());
                Ok(SettlementOutcome {
                    competition: finished.competition,
                    status_before,
                    finish_reason: Some(finished.reason),
                    trophies: finished.trophies,
                })
            }
            None => {
                current.updated_at = now;
                self.database.save_competition(&current).await?;
                Ok(SettlementOutcome {
                    competition: current,
                    status_before,
                    finish_reason: None,
                    trophies: Vec::new(),
                })
            }
        }
    }

    /// Authoritative recompute: auto-activation, scores, lives, end condition
    pub async fn settle(&self, competition_id: Uuid) -> CompetitionResult<SettlementOutcome> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        let competition = self.fetch(competition_id).await?;
        if competition.status == CompetitionStatus::Finished {
            return Ok(SettlementOutcome {
                status_before: competition.status,
                competition,
                finish_reason: None,
                trophies: Vec::new(),
            });
        }
        self.settle_locked(competition).await
    }

    /// Settle every scheduled or active competition. Failures are logged and skipped.
    pub async fn settle_all(&self) -> CompetitionResult<Vec<SettlementOutcome>> {
        let mut outcomes = Vec::new();
        for competition_id in self.database.unsettled_competition_ids().await? {
            match self.settle(competition_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(competition.id = %competition_id, error = %e, "Settlement failed"),
            }
        }
        Ok(outcomes)
    }

    /// Pull one participant's workouts and settle the competition
    pub async fn sync_user_intervals(
        &self,
        competition_id: Uuid,
        user_id: &str,
    ) -> CompetitionResult<SettlementOutcome> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        let mut competition = self.fetch(competition_id).await?;
        Self::ensure_visible(&competition, user_id)?;
        if competition.status != CompetitionStatus::Active {
            return self.settle_locked(competition).await;
        }

        self.pull_intervals(&mut competition, &[user_id.to_string()], self.now())
            .await?;
        self.settle_locked(competition).await
    }

    pub async fn terminate_competition(
        &self,
        competition_id: Uuid,
        caller: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<Vec<Trophy>> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, "terminate_competition").await?.is_some() {
            return self.database.trophies_for_competition(competition_id).await;
        }

        let mut competition = self.fetch(competition_id).await?;
        let now = self.now();
        if competition.status == CompetitionStatus::Active {
            self.pull_accepted(&mut competition, now).await?;
            self.recompute(&mut competition, now);
        }
        let finished = lifecycle::terminate(&competition, caller, now, &self.config)?;
        self.database
            .finish_competition(&finished.competition, &finished.trophies)
            .await?;
        self.remember(key, "terminate_competition", REPLAYED).await?;

        AppLogger::log_lifecycle_transition(competition_id, competition.status, finished.competition.status, Some(caller));
        AppLogger::log_settlement(competition_id, "terminated", finished.trophies.len());
        Ok(finished.trophies)
    }

    async fn refreshed_for_social(
        &self,
        competition_id: Uuid,
        participants: &[String],
    ) -> CompetitionResult<Competition> {
        let mut competition = self.fetch(competition_id).await?;
        if competition.status == CompetitionStatus::Active {
            self.pull_intervals(&mut competition, participants, self.now()).await?;
        }
        Ok(competition)
    }

    async fn dispatch(&self, event: SocialEvent) {
        if let Err(e) = self.dispatcher.dispatch(&event).await {
            warn!(
                dispatcher = self.dispatcher.dispatcher_name(),
                error = %e,
                "Notification delivery failed"
            );
        }
    }

    async fn commit_social_action(&self, action: &SocialAction, key: Option<IdempotencyKey>) -> CompetitionResult<()> {
        self.database.record_social_action(action).await?;
        self.remember(key, action.kind.as_str(), REPLAYED).await?;
        AppLogger::log_social_action(
            action.competition_id,
            action.kind,
            &action.actor_id,
            action.target_id.as_deref(),
        );
        Ok(())
    }

    /// Broadcast "I hit today's goal" to the other participants
    pub async fn send_flex(
        &self,
        competition_id: Uuid,
        caller: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, SocialActionKind::Flex.as_str()).await?.is_some() {
            return Ok(());
        }

        let now = self.now();
        let competition = self
            .refreshed_for_social(competition_id, &[caller.to_string()])
            .await?;
        let history = self
            .database
            .social_actions_for_day(competition_id, now.date_naive())
            .await?;

        let action = throttle::authorize_flex(&competition, caller, &history, now, self.config.first_weekday)
            .inspect_err(|e| AppLogger::log_rejected_action(competition_id, caller, "flex", &e.to_string()))?;
        self.commit_social_action(&action, key).await?;

        self.dispatch(SocialEvent::Flex {
            competition_id,
            competition_name: competition.name.clone(),
            actor_id: caller.to_string(),
            recipients: competition
                .accepted_users()
                .filter(|u| u.user_id != caller)
                .map(|u| u.user_id.clone())
                .collect(),
        })
        .await;
        Ok(())
    }

    /// Remind one participant who hasn't met the goal yet
    pub async fn send_nudge(
        &self,
        competition_id: Uuid,
        caller: &str,
        target: &str,
        key: Option<IdempotencyKey>,
    ) -> CompetitionResult<()> {
        let lock = self.lock_for(competition_id);
        let _guard = lock.lock().await;
        if self.replayed(key, SocialActionKind::Nudge.as_str()).await?.is_some() {
            return Ok(());
        }

        let now = self.now();
        let competition = self
            .refreshed_for_social(competition_id, &[target.to_string()])
            .await?;
        let history = self
            .database
            .social_actions_for_day(competition_id, now.date_naive())
            .await?;

        let action = throttle::authorize_nudge(&competition, caller, target, &history, now, self.config.first_weekday)
            .inspect_err(|e| AppLogger::log_rejected_action(competition_id, caller, "nudge", &e.to_string()))?;
        self.commit_social_action(&action, key).await?;

        self.dispatch(SocialEvent::Nudge {
            competition_id,
            competition_name: competition.name.clone(),
            actor_id: caller.to_string(),
            target_id: target.to_string(),
        })
        .await;
        Ok(())
    }

    /// Current standings as seen by `caller`
    pub async fn leaderboard(&self, competition_id: Uuid, caller: &str) -> CompetitionResult<Leaderboard> {
        let competition = self.load_competition(competition_id, caller).await?;
        Ok(Leaderboard::build(
            &competition,
            self.now().date_naive(),
            Some(caller),
            &self.config,
        ))
    }

    pub async fn trophies_for(&self, user_id: &str) -> CompetitionResult<Vec<Trophy>> {
        self.database.trophies_for_user(user_id).await
    }
}
