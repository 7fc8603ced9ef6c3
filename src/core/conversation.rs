use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::message::{new_id, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
    Completed,
}

/// An ordered, titled sequence of messages bound to a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub agent_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ConversationStatus,
}

impl Conversation {
    pub fn new(agent_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: title.into(),
            agent_id: agent_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            status: ConversationStatus::Active,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.updated_at = self.updated_at.max(message.timestamp);
        self.messages.push(message);
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Messages that form the prompt history: everything except the given
    /// in-flight placeholder, app-authored system notices and agent replies
    /// that never received any content.
    pub fn history_excluding(&self, placeholder_id: &str) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.id != placeholder_id && !m.is_system())
            .filter(|m| !(m.is_agent() && m.content.is_empty()))
            .cloned()
            .collect()
    }
}
