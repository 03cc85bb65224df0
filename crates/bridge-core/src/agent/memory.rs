use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::prompt::ChatMessage;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TurnRecord {
    pub level: u32,
    pub snapshot: String,
    /// Raw decision-maker output, including lines that were not dispatched.
    pub response: String,
}

/// Ordered record of past turns, fed back to the decision-maker as conversation.
///
/// Unbounded unless `limit` is set; nothing here is persisted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConversationHistory {
    pub turns: VecDeque<TurnRecord>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Lines from the most recent response that matched no verb.
    #[serde(default)]
    pub last_rejected: Vec<String>,
}

impl ConversationHistory {
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn record(&mut self, level: u32, snapshot: impl Into<String>, response: impl Into<String>) {
        self.last_error = None;
        self.turns.push_back(TurnRecord {
            level,
            snapshot: snapshot.into(),
            response: response.into(),
        });
        if let Some(limit) = self.limit {
            while self.turns.len() > limit {
                self.turns.pop_front();
            }
        }
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Past turns as alternating user (state) / assistant (response) messages.
    pub fn messages(&self) -> impl Iterator<Item = ChatMessage> + '_ {
        self.turns.iter().flat_map(|t| {
            [
                ChatMessage::user(t.snapshot.clone()),
                ChatMessage::assistant(t.response.clone()),
            ]
        })
    }
}
