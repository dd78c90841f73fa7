// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Streak Engine
//!
//! Competition rules for a social fitness app where small groups compete on
//! distance covered over time. Five competition types share one model:
//!
//! - **Streaks**: meet the per-interval goal; each miss costs a life
//! - **Clash**: win an interval by covering the most distance; first to N points
//! - **Apex**: most total distance within a fixed duration
//! - **Targets**: most intervals meeting the goal within a fixed duration
//! - **Race**: first to cover the goal distance
//!
//! ## Architecture
//!
//! - **Engine**: pure, synchronous rules (intervals, elimination, scoring,
//!   ranking, lifecycle, social throttling, client reconciliation)
//! - **Models**: the competition snapshot and its parts
//! - **Service**: the authoritative async layer that loads, checks and persists
//! - **Database**: SQLite storage through sqlx
//! - **Providers**: where per-day workout distances come from
//! - **Notifications**: outbound flex / nudge delivery
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use streak_engine::config::Config;
//! use streak_engine::engine::Leaderboard;
//! use streak_engine::service::CompetitionService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let service = CompetitionService::from_config(&config).await?;
//!
//!     for competition in service.competitions_for("amy").await? {
//!         let outcome = service.settle(competition.id).await?;
//!         let board: Leaderboard = service.leaderboard(outcome.competition.id, "amy").await?;
//!         println!("{}: leader {:?}", competition.name, board.leader().map(|s| &s.user_id));
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Competition rules as pure functions
pub mod engine;

/// Competition snapshot and related data models
pub mod models;

/// Error taxonomy for competition operations
pub mod errors;

/// Configuration management and persistence
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Workout data provider implementations
pub mod providers;

/// Outbound social notifications
pub mod notifications;

/// Competition storage
pub mod database;

/// Authoritative competition operations
pub mod service;

/// Production logging and structured output
pub mod logging;
