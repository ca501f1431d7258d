//! Raw social messages from the message-source provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::SnapshotWindow;

/// Coarse sentiment tag attached by the message source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SentimentTag {
    Bullish,
    Bearish,
    #[default]
    #[serde(other)]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub sentiment: SentimentTag,
}

impl RawMessage {
    /// Non-empty message inside the window
    pub fn qualifies_for(&self, window: &SnapshotWindow) -> bool {
        !self.body.trim().is_empty() && window.contains(self.created_at)
    }
}

/// Messages that count toward a snapshot
pub fn qualifying_messages(messages: Vec<RawMessage>, window: &SnapshotWindow) -> Vec<RawMessage> {
    messages
        .into_iter()
        .filter(|m| m.qualifies_for(window))
        .collect()
}

/// Number of distinct authors
pub fn unique_authors(messages: &[RawMessage]) -> u32 {
    let mut authors: Vec<&str> = messages.iter().map(|m| m.author_id.as_str()).collect();
    authors.sort_unstable();
    authors.dedup();
    authors.len() as u32
}
