// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error taxonomy for competition operations
//!
//! Engine-detected violations are returned as typed values. Pure scoring and
//! ranking never produce errors: absent workout data is zero distance.

use crate::engine::throttle::SocialActionKind;
use crate::models::CompetitionStatus;

/// Errors raised by lifecycle, throttle, store and service operations
#[derive(Debug, thiserror::Error)]
pub enum CompetitionError {
    #[error("Cannot {action} a competition that is {from}")]
    InvalidTransition {
        from: CompetitionStatus,
        action: &'static str,
    },

    #[error("Only the competition owner may {action}")]
    PermissionDenied { action: &'static str },

    #[error("At least {required} accepted participants are required, found {accepted}")]
    InsufficientParticipants { required: usize, accepted: usize },

    #[error("A {action} was already sent today")]
    AlreadyPerformedToday { action: SocialActionKind },

    #[error("Today's goal has not been met yet")]
    GoalNotMet,

    #[error("{target} has already met today's goal")]
    TargetAlreadyDone { target: String },

    #[error("Competition {0} not found")]
    NotFound(String),

    #[error("User {user_id} may not access competition {competition_id}")]
    Unauthorized {
        user_id: String,
        competition_id: String,
    },

    #[error("Malformed competition state: {0}")]
    DecodeFailure(String),

    #[error("{0} is already invited")]
    AlreadyInvited(String),

    #[error("{0} has no pending invite")]
    NotPending(String),

    #[error("{0} is not an accepted participant")]
    NotParticipant(String),

    #[error("Cannot {action} yourself")]
    SelfTarget { action: SocialActionKind },

    #[error("Invalid competition options: {0}")]
    InvalidOptions(String),

    #[error("Idempotency key {key} was already used for {operation}")]
    IdempotencyKeyReused { key: String, operation: String },

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Workout data provider error: {0}")]
    Provider(String),
}

impl CompetitionError {
    /// Whether the failure is a rule rejection rather than an infrastructure fault
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Provider(_) | Self::DecodeFailure(_))
    }
}

pub type CompetitionResult<T> = Result<T, CompetitionError>;
