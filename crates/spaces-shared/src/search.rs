//! Search results and their ordering.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Message;
use crate::types::{ChannelId, ChatId, SpaceId, UserId};

/// One search result.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchHit {
    Space {
        space_id: SpaceId,
        name: String,
    },
    Channel {
        space_id: SpaceId,
        channel_id: ChannelId,
        name: String,
    },
    User {
        user_id: UserId,
        name: String,
    },
    Message {
        chat_id: String,
        space_id: Option<SpaceId>,
        message: Message,
    },
}

impl SearchHit {
    pub fn message(chat: ChatId, space_id: Option<SpaceId>, message: &Message) -> Self {
        SearchHit::Message {
            chat_id: chat.to_string(),
            space_id,
            message: message.clone(),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SearchHit::Message { message, .. } => message.timestamp,
            _ => None,
        }
    }
}

/// Case-insensitive needle, lowered once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Needle(String);

impl Needle {
    /// `None` for a blank query.
    pub fn new(query: &str) -> Option<Self> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_lowercase()))
        }
    }

    pub fn matches(&self, haystack: &str) -> bool {
        haystack.to_lowercase().contains(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Newest first among timestamped hits.
///
/// Hits without a timestamp keep their slot; timestamped hits are sorted
/// among the slots they already occupy.  This keeps the comparison a total
/// order while only reordering pairs that both carry timestamps.
pub fn sort_hits(hits: &mut [SearchHit]) {
    let slots: Vec<usize> = hits
        .iter()
        .enumerate()
        .filter(|(_, hit)| hit.timestamp().is_some())
        .map(|(i, _)| i)
        .collect();

    let mut timed: Vec<SearchHit> = slots.iter().map(|&i| hits[i].clone()).collect();
    timed.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

    for (slot, hit) in slots.into_iter().zip(timed) {
        hits[slot] = hit;
    }
}
