// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Competition Engine
//!
//! The rules of the game, as pure synchronous functions over a
//! [`Competition`](crate::models::Competition) snapshot. Nothing in here
//! performs I/O or holds state between calls, so any of it can run on any
//! thread.
//!
//! This module includes:
//! - Interval bucketing (day / week / month keys)
//! - Life-based elimination for Streaks
//! - One scoring strategy per competition type
//! - Ranking, leaderboards and final placements
//! - The lobby → scheduled → active → finished state machine
//! - Flex / nudge throttling
//! - Client-side reconciliation of fetched snapshots

pub mod elimination;
pub mod interval;
pub mod lifecycle;
pub mod ranking;
pub mod reconciliation;
pub mod scoring;
pub mod throttle;

pub use elimination::{life_status, LifeSource, LifeStatus};
pub use interval::{interval_key, interval_key_at, IntervalCalendar, IntervalKey};
pub use lifecycle::{FinishReason, Finished};
pub use ranking::{placements, rank, Leaderboard, Placement, PlacementPolicy, Standing, TieBreak};
pub use reconciliation::{DisplayedCompetition, RefreshTrigger};
pub use scoring::{strategy_for, ScoreCard, ScoringContext, ScoringStrategy};
pub use throttle::{SocialAction, SocialActionKind};
