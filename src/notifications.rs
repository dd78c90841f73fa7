// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Outbound social notifications
//!
//! The service hands accepted flexes and nudges to a [`NotificationDispatcher`]
//! after they have been recorded. Delivery failures never undo the action.

use crate::constants::messages;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SocialEvent {
    /// Broadcast to every other accepted participant
    Flex {
        competition_id: Uuid,
        competition_name: String,
        actor_id: String,
        recipients: Vec<String>,
    },
    /// Sent to one participant who has not met the goal yet
    Nudge {
        competition_id: Uuid,
        competition_name: String,
        actor_id: String,
        target_id: String,
    },
}

impl SocialEvent {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Flex { .. } => messages::FLEX_TITLE,
            Self::Nudge { .. } => messages::NUDGE_TITLE,
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Flex { competition_name, actor_id, .. } => {
                format!("{actor_id} hit today's goal in {competition_name}")
            }
            Self::Nudge { competition_name, actor_id, .. } => {
                format!("{actor_id} is waiting on you in {competition_name}")
            }
        }
    }

    pub fn recipients(&self) -> Vec<&str> {
        match self {
            Self::Flex { recipients, .. } => recipients.iter().map(String::as_str).collect(),
            Self::Nudge { target_id, .. } => vec![target_id.as_str()],
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: &SocialEvent) -> Result<()>;

    fn dispatcher_name(&self) -> &'static str;
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn dispatch(&self, event: &SocialEvent) -> Result<()> {
        info!(
            notification.title = event.title(),
            notification.recipients = ?event.recipients(),
            "{}",
            event.body()
        );
        Ok(())
    }

    fn dispatcher_name(&self) -> &'static str {
        "tracing"
    }
}
