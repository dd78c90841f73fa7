// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Ranking, leaderboards and final placements

use super::elimination::LifeStatus;
use super::scoring::{score_all, ScoringContext};
use crate::config::EngineConfig;
use crate::models::Competition;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How participants with equal scores are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep membership order among equal scores
    #[default]
    PreserveOrder,
    /// Order equal scores by user id
    UserId,
}

/// How placements are numbered when final scores tie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// 1, 2, 3... by list position even when scores are equal
    #[default]
    Sequential,
    /// Equal scores share a placement (1, 1, 3)
    SharedOnTie,
}

/// One row of a leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: String,
    pub comparable_score: f64,
    pub lives: Option<LifeStatus>,
    pub is_eliminated: bool,
    pub is_current_user: bool,
}

impl Standing {
    pub fn new(user_id: impl Into<String>, comparable_score: f64) -> Self {
        Self {
            user_id: user_id.into(),
            comparable_score,
            lives: None,
            is_eliminated: false,
            is_current_user: false,
        }
    }
}

fn compare(a: &Standing, b: &Standing, tie_break: TieBreak) -> Ordering {
    let by_score = b
        .comparable_score
        .partial_cmp(&a.comparable_score)
        .unwrap_or(Ordering::Equal);
    match tie_break {
        TieBreak::PreserveOrder => by_score,
        TieBreak::UserId => by_score.then_with(|| a.user_id.cmp(&b.user_id)),
    }
}

/// Sort by score, highest first. The sort is stable.
pub fn rank(mut standings: Vec<Standing>, tie_break: TieBreak) -> Vec<Standing> {
    standings.sort_by(|a, b| compare(a, b, tie_break));
    standings
}

/// Active and eliminated participants of one competition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub active: Vec<Standing>,
    pub eliminated: Vec<Standing>,
}

impl Leaderboard {
    /// Score and rank the accepted participants as of `as_of`.
    ///
    /// `current_user_id` only marks the viewer's row; it never affects order.
    pub fn build(
        competition: &Competition,
        as_of: NaiveDate,
        current_user_id: Option<&str>,
        config: &EngineConfig,
    ) -> Self {
        let ctx = ScoringContext::new(competition, as_of, config.first_weekday);
        let cards = score_all(&ctx);

        let (eliminated, active): (Vec<Standing>, Vec<Standing>) = competition
            .accepted_users()
            .zip(cards)
            .map(|(user, card)| {
                let lives = ctx.life_status(user);
                Standing {
                    is_eliminated: lives.as_ref().is_some_and(|l| l.is_eliminated),
                    is_current_user: current_user_id == Some(user.user_id.as_str()),
                    user_id: card.user_id,
                    comparable_score: card.comparable_score,
                    lives,
                }
            })
            .partition(|s| s.is_eliminated);

        Self {
            active: rank(active, config.tie_break),
            eliminated: rank(eliminated, config.tie_break),
        }
    }

    /// Active participants first, eliminated ones in the tail
    pub fn full_standings(&self) -> Vec<&Standing> {
        self.active.iter().chain(self.eliminated.iter()).collect()
    }

    pub fn leader(&self) -> Option<&Standing> {
        self.active.first()
    }

    pub fn current_user(&self) -> Option<&Standing> {
        self.full_standings().into_iter().find(|s| s.is_current_user)
    }
}

/// Final position of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub user_id: String,
    pub placement: u32,
    pub score: f64,
}

/// Number already-ranked standings into placements
pub fn placements(standings: &[&Standing], policy: PlacementPolicy) -> Vec<Placement> {
    let mut result: Vec<Placement> = Vec::with_capacity(standings.len());
    for (index, standing) in standings.iter().enumerate() {
        let sequential = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let placement = match (policy, result.last()) {
            (PlacementPolicy::SharedOnTie, Some(previous))
                if previous.score == standing.comparable_score
                    && standings[index - 1].is_eliminated == standing.is_eliminated =>
            {
                previous.placement
            }
            _ => sequential,
        };
        result.push(Placement {
            user_id: standing.user_id.clone(),
            placement,
            score: standing.comparable_score,
        });
    }
    result
}
