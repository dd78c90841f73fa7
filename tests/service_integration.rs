// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Competition service integration tests
//!
//! Lifecycle, permissions, invites, social throttling and idempotency against
//! an in-memory database and provider.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use streak_engine::config::EngineConfig;
use streak_engine::database::Database;
use streak_engine::engine::lifecycle::FinishReason;
use streak_engine::engine::SocialActionKind;
use streak_engine::errors::CompetitionError;
use streak_engine::models::{
    ActivityKind, CompetitionStatus, CompetitionType, CompetitionUpdate, DistanceUnit, IntervalBucket,
    NewCompetition, Workout,
};
use streak_engine::notifications::{NotificationDispatcher, SocialEvent};
use streak_engine::providers::in_memory::InMemoryWorkoutProvider;
use streak_engine::service::{CompetitionService, FixedClock, IdempotencyKey};
use uuid::Uuid;

/// Keeps every dispatched event; can be told to fail
#[derive(Default)]
struct RecordingDispatcher {
    events: Mutex<Vec<SocialEvent>>,
    fail: bool,
}

impl RecordingDispatcher {
    fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &SocialEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            anyhow::bail!("push gateway unavailable");
        }
        Ok(())
    }

    fn dispatcher_name(&self) -> &'static str {
        "recording"
    }
}

struct Harness {
    service: CompetitionService,
    clock: Arc<FixedClock>,
    provider: Arc<InMemoryWorkoutProvider>,
    dispatcher: Arc<RecordingDispatcher>,
}

fn at(d: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, d, hour, 0, 0).unwrap()
}

async fn harness_with(dispatcher: RecordingDispatcher) -> Result<Harness> {
    let clock = Arc::new(FixedClock::new(at(1, 8)));
    let provider = Arc::new(InMemoryWorkoutProvider::new());
    let dispatcher = Arc::new(dispatcher);
    let service = CompetitionService::new(
        Database::new("sqlite::memory:").await?,
        provider.clone(),
        dispatcher.clone(),
        EngineConfig::default(),
    )
    .with_clock(clock.clone());

    Ok(Harness {
        service,
        clock,
        provider,
        dispatcher,
    })
}

async fn harness() -> Result<Harness> {
    harness_with(RecordingDispatcher::default()).await
}

fn params(competition_type: CompetitionType) -> NewCompetition {
    let (goal, lives, bucket, duration) = match competition_type {
        CompetitionType::Streaks => (Some(2.0), Some(2), None, None),
        CompetitionType::Clash => (None, Some(2), Some(IntervalBucket::Day), None),
        CompetitionType::Apex => (None, None, Some(IntervalBucket::Day), Some(72)),
        CompetitionType::Targets => (Some(2.0), None, Some(IntervalBucket::Day), Some(72)),
        CompetitionType::Race => (Some(10.0), None, None, None),
    };
    NewCompetition {
        name: format!("{competition_type} test"),
        competition_type,
        workout_filters: BTreeSet::new(),
        goal,
        unit: DistanceUnit::Kilometers,
        lives_budget: lives,
        interval_bucket: bucket,
        duration_hours: duration,
    }
}

fn km(d: u32, hour: u32, kilometers: f64) -> Workout {
    Workout {
        kind: ActivityKind::Run,
        start_date: at(d, hour),
        distance_meters: kilometers * 1000.0,
    }
}

/// Owner "amy" plus accepted "ben", started at day 1 09:00
async fn active(h: &Harness, competition_type: CompetitionType) -> Result<Uuid> {
    let id = h.service.create_competition("amy", params(competition_type), None).await?;
    h.service.invite_user(id, "amy", "ben", None).await?;
    h.service.accept_invite(id, "ben", None).await?;
    h.clock.set(at(1, 9));
    h.service.start_competition(id, "amy", None).await?;
    Ok(id)
}

#[tokio::test]
async fn test_owner_only_operations() -> Result<()> {
    let h = harness().await?;
    let id = h.service.create_competition("amy", params(CompetitionType::Race), None).await?;
    h.service.invite_user(id, "amy", "ben", None).await?;
    h.service.accept_invite(id, "ben", None).await?;

    assert!(matches!(
        h.service.invite_user(id, "ben", "cy", None).await,
        Err(CompetitionError::PermissionDenied { .. })
    ));
    assert!(matches!(
        h.service.start_competition(id, "ben", None).await,
        Err(CompetitionError::PermissionDenied { .. })
    ));
    assert!(matches!(
        h.service
            .update_competition(id, "ben", CompetitionUpdate { goal: Some(5.0), ..Default::default() }, None)
            .await,
        Err(CompetitionError::PermissionDenied { .. })
    ));
    assert!(matches!(
        h.service.delete_competition(id, "ben", None).await,
        Err(CompetitionError::PermissionDenied { .. })
    ));

    // Rejections changed nothing
    let competition = h.service.load_competition(id, "amy").await?;
    assert_eq!(competition.status, CompetitionStatus::Lobby);
    assert_eq!(competition.options.goal, Some(10.0));
    assert!(competition.member("cy").is_none());
    Ok(())
}

#[tokio::test]
async fn test_invite_rules() -> Result<()> {
    let h = harness().await?;
    let id = h.service.create_competition("amy", params(CompetitionType::Race), None).await?;

    h.service.invite_user(id, "amy", "ben", None).await?;
    assert!(matches!(
        h.service.invite_user(id, "amy", "ben", None).await,
        Err(CompetitionError::AlreadyInvited(_))
    ));

    h.service.accept_invite(id, "ben", None).await?;
    assert!(matches!(
        h.service.accept_invite(id, "ben", None).await,
        Err(CompetitionError::NotPending(_))
    ));
    assert!(matches!(
        h.service.decline_invite(id, "ben", None).await,
        Err(CompetitionError::NotPending(_))
    ));
    assert!(matches!(
        h.service.load_competition(id, "stranger").await,
        Err(CompetitionError::Unauthorized { .. })
    ));
    assert!(matches!(
        h.service.load_competition(Uuid::new_v4(), "amy").await,
        Err(CompetitionError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_start_requires_two_accepted() -> Result<()> {
    let h = harness().await?;
    let id = h.service.create_competition("amy", params(CompetitionType::Apex), None).await?;
    h.service.invite_user(id, "amy", "ben", None).await?;

    assert!(matches!(
        h.service.start_competition(id, "amy", None).await,
        Err(CompetitionError::InsufficientParticipants { required: 2, accepted: 1 })
    ));

    h.service.accept_invite(id, "ben", None).await?;
    h.service.start_competition(id, "amy", None).await?;
    let competition = h.service.load_competition(id, "ben").await?;
    assert_eq!(competition.status, CompetitionStatus::Active);
    assert_eq!(competition.options.end_date, Some(at(1, 8) + Duration::hours(72)));

    // Settings are frozen once running
    assert!(matches!(
        h.service
            .update_competition(id, "amy", CompetitionUpdate { name: Some("x".into()), ..Default::default() }, None)
            .await,
        Err(CompetitionError::InvalidTransition { from: CompetitionStatus::Active, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_scheduled_competition_activates_on_settle() -> Result<()> {
    let h = harness().await?;
    let id = h.service.create_competition("amy", params(CompetitionType::Targets), None).await?;
    h.service.invite_user(id, "amy", "ben", None).await?;
    h.service.schedule_competition(id, "amy", at(3, 6), None).await?;
    h.service.accept_invite(id, "ben", None).await?;

    h.clock.set(at(2, 12));
    assert_eq!(h.service.settle(id).await?.competition.status, CompetitionStatus::Scheduled);

    h.clock.set(at(3, 7));
    let outcome = h.service.settle(id).await?;
    assert!(outcome.status_changed());
    assert_eq!(outcome.competition.status, CompetitionStatus::Active);
    assert_eq!(outcome.competition.options.start_date, Some(at(3, 6)));
    assert_eq!(outcome.competition.options.end_date, Some(at(6, 6)));
    Ok(())
}

#[tokio::test]
async fn test_race_finishes_when_goal_reached() -> Result<()> {
    let h = harness().await?;
    let id = active(&h, CompetitionType::Race).await?;

    h.provider.record_workout("ben", km(1, 12, 6.0)).await;
    h.provider.record_workout("ben", km(2, 12, 4.0)).await;
    h.provider.record_workout("amy", km(2, 12, 9.0)).await;

    h.clock.set(at(2, 18));
    let outcome = h.service.sync_user_intervals(id, "ben").await?;
    assert_eq!(
        outcome.finish_reason,
        Some(FinishReason::GoalReached { user_id: "ben".into() })
    );
    assert_eq!(outcome.trophies.len(), 2);
    assert_eq!(outcome.trophies[0].user_id, "ben");

    // Finished competitions are read-only
    assert!(matches!(
        h.service.delete_competition(id, "amy", None).await,
        Err(CompetitionError::InvalidTransition { from: CompetitionStatus::Finished, .. })
    ));
    assert!(matches!(
        h.service.terminate_competition(id, "amy", None).await,
        Err(CompetitionError::InvalidTransition { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_workout_filters_apply() -> Result<()> {
    let h = harness().await?;
    let mut race = params(CompetitionType::Race);
    race.workout_filters = [ActivityKind::Walk].into_iter().collect();
    let id = h.service.create_competition("amy", race, None).await?;
    h.service.invite_user(id, "amy", "ben", None).await?;
    h.service.accept_invite(id, "ben", None).await?;
    h.service.start_competition(id, "amy", None).await?;

    h.provider.record_workout("ben", km(1, 12, 30.0)).await;
    h.provider
        .record_workout(
            "ben",
            Workout { kind: ActivityKind::Walk, start_date: at(1, 13), distance_meters: 2500.0 },
        )
        .await;

    h.clock.set(at(1, 20));
    let outcome = h.service.settle(id).await?;
    assert_eq!(outcome.competition.status, CompetitionStatus::Active);
    assert_eq!(outcome.competition.member("ben").unwrap().score, 2.5);
    Ok(())
}

#[tokio::test]
async fn test_flex_once_per_day_without_duplicate_dispatch() -> Result<()> {
    let h = harness().await?;
    let id = active(&h, CompetitionType::Streaks).await?;
    h.clock.set(at(1, 18));

    assert!(matches!(
        h.service.send_flex(id, "amy", None).await,
        Err(CompetitionError::GoalNotMet)
    ));

    h.provider.record_workout("amy", km(1, 12, 2.5)).await;
    h.service.send_flex(id, "amy", None).await?;
    assert_eq!(h.dispatcher.count(), 1);
    assert!(matches!(
        &h.dispatcher.events.lock().unwrap()[0],
        SocialEvent::Flex { recipients, .. } if recipients == &vec!["ben".to_string()]
    ));

    assert!(matches!(
        h.service.send_flex(id, "amy", None).await,
        Err(CompetitionError::AlreadyPerformedToday { action: SocialActionKind::Flex })
    ));
    assert_eq!(h.dispatcher.count(), 1);

    // A new UTC day opens a new slot
    h.provider.record_workout("amy", km(2, 7, 2.0)).await;
    h.clock.set(at(2, 9));
    h.service.send_flex(id, "amy", None).await?;
    assert_eq!(h.dispatcher.count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_nudge_rules() -> Result<()> {
    let h = harness().await?;
    let id = active(&h, CompetitionType::Streaks).await?;
    h.clock.set(at(1, 18));

    h.service.send_nudge(id, "amy", "ben", None).await?;
    assert!(matches!(
        h.service.send_nudge(id, "amy", "ben", None).await,
        Err(CompetitionError::AlreadyPerformedToday { action: SocialActionKind::Nudge })
    ));

    h.provider.record_workout("amy", km(1, 12, 3.0)).await;
    assert!(matches!(
        h.service.send_nudge(id, "ben", "amy", None).await,
        Err(CompetitionError::TargetAlreadyDone { .. })
    ));
    assert!(matches!(
        h.service.send_nudge(id, "amy", "zed", None).await,
        Err(CompetitionError::NotParticipant(_))
    ));
    assert!(matches!(
        h.service.send_nudge(id, "ben", "ben", None).await,
        Err(CompetitionError::SelfTarget { action: SocialActionKind::Nudge })
    ));
    assert_eq!(h.dispatcher.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_failure_keeps_action() -> Result<()> {
    let h = harness_with(RecordingDispatcher { fail: true, ..Default::default() }).await?;
    let id = active(&h, CompetitionType::Streaks).await?;
    h.clock.set(at(1, 18));

    h.service.send_nudge(id, "amy", "ben", None).await?;
    assert_eq!(h.dispatcher.count(), 1);
    assert!(matches!(
        h.service.send_nudge(id, "amy", "ben", None).await,
        Err(CompetitionError::AlreadyPerformedToday { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_idempotent_replays() -> Result<()> {
    let h = harness().await?;
    let id = active(&h, CompetitionType::Clash).await?;
    h.clock.set(at(1, 18));

    let nudge_key = Some(IdempotencyKey::new());
    h.service.send_nudge(id, "amy", "ben", nudge_key).await?;
    h.service.send_nudge(id, "amy", "ben", nudge_key).await?;
    assert_eq!(h.dispatcher.count(), 1);

    let terminate_key = Some(IdempotencyKey::new());
    let trophies = h.service.terminate_competition(id, "amy", terminate_key).await?;
    let replayed = h.service.terminate_competition(id, "amy", terminate_key).await?;
    assert_eq!(trophies.len(), 2);
    assert_eq!(replayed.len(), 2);
    assert_eq!(h.service.trophies_for("amy").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_create_retries_make_one_competition() -> Result<()> {
    let h = harness().await?;
    let key = Some(IdempotencyKey::new());

    let (first, second) = tokio::join!(
        h.service.create_competition("amy", params(CompetitionType::Race), key),
        h.service.create_competition("amy", params(CompetitionType::Race), key),
    );
    assert_eq!(first?, second?);
    assert_eq!(h.service.competitions_for("amy").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_key_is_bound_to_its_first_operation() -> Result<()> {
    let h = harness().await?;
    let id = h
        .service
        .create_competition("amy", params(CompetitionType::Race), None)
        .await?;
    let key = Some(IdempotencyKey::new());

    h.service.invite_user(id, "amy", "ben", key).await?;
    h.service.accept_invite(id, "ben", None).await?;
    assert!(matches!(
        h.service.start_competition(id, "amy", key).await,
        Err(CompetitionError::IdempotencyKeyReused { ref operation, .. }) if operation == "invite_user"
    ));
    assert_eq!(h.service.load_competition(id, "amy").await?.status, CompetitionStatus::Lobby);

    h.service.start_competition(id, "amy", None).await?;
    assert_eq!(h.service.load_competition(id, "amy").await?.status, CompetitionStatus::Active);
    Ok(())
}

#[tokio::test]
async fn test_clash_first_to_points() -> Result<()> {
    let h = harness().await?;
    let id = active(&h, CompetitionType::Clash).await?;

    h.provider.record_workout("amy", km(1, 12, 5.0)).await;
    h.provider.record_workout("ben", km(1, 13, 3.0)).await;
    h.provider.record_workout("amy", km(2, 12, 4.0)).await;
    h.provider.record_workout("ben", km(2, 13, 4.0)).await;
    h.provider.record_workout("amy", km(3, 12, 6.0)).await;

    h.clock.set(at(3, 20));
    let outcome = h.service.settle(id).await?;
    assert_eq!(outcome.competition.status, CompetitionStatus::Active, "tie on day 2 scores nobody");
    assert_eq!(outcome.competition.member("amy").unwrap().score, 1.0);

    h.clock.set(at(4, 1));
    let outcome = h.service.settle(id).await?;
    assert_eq!(
        outcome.finish_reason,
        Some(FinishReason::PointsTargetReached { user_id: "amy".into() })
    );
    Ok(())
}

#[tokio::test]
async fn test_delete_and_lists() -> Result<()> {
    let h = harness().await?;
    let keep = h.service.create_competition("amy", params(CompetitionType::Apex), None).await?;
    let doomed = h.service.create_competition("amy", params(CompetitionType::Race), None).await?;
    h.service.invite_user(doomed, "amy", "ben", None).await?;

    assert_eq!(h.service.competitions_for("amy").await?.len(), 2);
    assert_eq!(h.service.competitions_for("ben").await?.len(), 1);

    h.service.delete_competition(doomed, "amy", None).await?;
    let remaining: Vec<Uuid> = h.service.competitions_for("amy").await?.iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec![keep]);
    assert!(h.service.competitions_for("ben").await?.is_empty());
    Ok(())
}
