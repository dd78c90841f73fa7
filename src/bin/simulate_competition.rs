// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Plays a competition out day by day against an in-memory database with
//! synthetic workouts, printing the standings after each settlement.

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use std::collections::BTreeSet;
use std::sync::Arc;
use streak_engine::config::EngineConfig;
use streak_engine::database::Database;
use streak_engine::logging;
use streak_engine::models::{
    ActivityKind, CompetitionStatus, CompetitionType, DistanceUnit, IntervalBucket, NewCompetition, Workout,
};
use streak_engine::notifications::TracingDispatcher;
use streak_engine::providers::in_memory::InMemoryWorkoutProvider;
use streak_engine::service::{CompetitionService, FixedClock};

#[derive(Parser)]
#[command(name = "simulate-competition")]
#[command(about = "Simulate a competition with synthetic daily workouts")]
struct Args {
    /// streaks, clash, apex, targets or race
    #[arg(long, default_value = "streaks")]
    competition_type: CompetitionType,

    /// Number of participants, owner included
    #[arg(long, default_value_t = 3)]
    participants: usize,

    /// Stop after this many days even if the competition is still running
    #[arg(long, default_value_t = 14)]
    days: i64,
}

fn params_for(competition_type: CompetitionType) -> NewCompetition {
    let (goal, lives_budget, duration_hours) = match competition_type {
        CompetitionType::Streaks => (Some(2.0), Some(2), None),
        CompetitionType::Clash => (None, Some(3), None),
        CompetitionType::Apex => (None, None, Some(24 * 7)),
        CompetitionType::Targets => (Some(2.0), None, Some(24 * 7)),
        CompetitionType::Race => (Some(15.0), None, None),
    };

    NewCompetition {
        name: format!("Simulated {competition_type}"),
        competition_type,
        workout_filters: BTreeSet::new(),
        goal,
        unit: DistanceUnit::Miles,
        lives_budget,
        interval_bucket: Some(IntervalBucket::Day),
        duration_hours,
    }
}

/// Distance-scored types show the unit; lives follow when tracked
fn score_suffix(competition_type: CompetitionType, lives: &str) -> String {
    match competition_type {
        CompetitionType::Apex | CompetitionType::Race => {
            format!(" {}{}", DistanceUnit::Miles.abbreviation(), lives)
        }
        _ => lives.to_string(),
    }
}

/// Deterministic distance pattern so runs are reproducible
fn miles_for(participant: usize, day: i64) -> f64 {
    let wobble = ((day as usize + 1) * (participant + 3)) % 5;
    0.8 + wobble as f64 * 0.45
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env()?;
    let args = Args::parse();

    let first_day = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).single().unwrap_or_else(Utc::now);
    let clock = Arc::new(FixedClock::new(first_day));
    let provider = Arc::new(InMemoryWorkoutProvider::new());
    let service = CompetitionService::new(
        Database::new("sqlite::memory:").await?,
        provider.clone(),
        Arc::new(TracingDispatcher),
        EngineConfig::default(),
    )
    .with_clock(clock.clone());

    let players: Vec<String> = (0..args.participants.max(2))
        .map(|i| format!("athlete-{}", i + 1))
        .collect();
    let owner = &players[0];

    println!("🏁 Setting up a {} competition for {} athletes", args.competition_type, players.len());
    let id = service
        .create_competition(owner, params_for(args.competition_type), None)
        .await?;
    for player in &players[1..] {
        service.invite_user(id, owner, player, None).await?;
        service.accept_invite(id, player, None).await?;
    }
    service.start_competition(id, owner, None).await?;

    for day in 0..args.days {
        for (i, player) in players.iter().enumerate() {
            let workout = Workout {
                kind: ActivityKind::Run,
                start_date: first_day + Duration::days(day) + Duration::hours(7),
                distance_meters: DistanceUnit::Miles.convert(miles_for(i, day), DistanceUnit::Meters),
            };
            provider.record_workout(player, workout).await;
        }

        clock.set(first_day + Duration::days(day + 1) + Duration::hours(1));
        let outcome = service.settle(id).await?;
        let board = service.leaderboard(id, owner).await?;

        println!("\n📅 Day {}", day + 1);
        for (place, standing) in board.full_standings().into_iter().enumerate() {
            let lives = standing
                .lives
                .as_ref()
                .map(|l| format!(" ({} lives)", l.lives_remaining))
                .unwrap_or_default();
            let marker = if standing.is_eliminated { "❌" } else { "  " };
            println!(
                "   {} {}. {} {:.2}{}",
                marker,
                place + 1,
                standing.user_id,
                standing.comparable_score,
                score_suffix(args.competition_type, &lives)
            );
        }

        if outcome.competition.status == CompetitionStatus::Finished {
            println!("\n🏆 Finished: {:?}", outcome.finish_reason);
            for trophy in &outcome.trophies {
                println!("   #{} {} ({:.2})", trophy.placement, trophy.user_id, trophy.score);
            }
            return Ok(());
        }
    }

    println!("\n⏸️  Still running after {} days", args.days);
    Ok(())
}
