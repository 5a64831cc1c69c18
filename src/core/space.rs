use crate::core::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Retrieval strategy tag for a space. The core treats it as opaque.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    #[default]
    Simple,
    Graph,
}

impl SpaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SpaceType::Simple => "simple",
            SpaceType::Graph => "graph",
        }
    }
}

/// A knowledge-base file registered to a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    /// Human-readable size, e.g. `"12.5 KB"`.
    pub size: String,
    pub upload_date: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: format_document_size(size_bytes),
            upload_date: Utc::now(),
        }
    }
}

pub fn format_document_size(size_bytes: u64) -> String {
    format!("{:.1} KB", size_bytes as f64 / 1024.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Timestamp of the last message, or the creation time for an empty
    /// conversation.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map(|message| message.timestamp)
            .unwrap_or(self.created_at)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub(crate) fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    fn matches_query(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .messages
                .iter()
                .any(|message| message.content.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SpaceType,
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Stored in insertion order (new conversations go to the front); use
    /// [`Space::conversations_display_order`] for presentation.
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub active_conversation_id: Option<String>,
}

impl Space {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: SpaceType::default(),
            documents: Vec::new(),
            conversations: Vec::new(),
            active_conversation_id: None,
        }
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|conversation| conversation.id == id)
    }

    pub(crate) fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| conversation.id == id)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    /// Pinned first, then most recent activity first.
    pub fn conversations_display_order(&self) -> Vec<&Conversation> {
        display_order(&self.conversations)
    }

    /// Most recent activity first, ignoring pins. Used by the space overview.
    pub fn recent_conversations(&self, limit: usize) -> Vec<&Conversation> {
        let mut recent: Vec<&Conversation> = self.conversations.iter().collect();
        recent.sort_by(|a, b| by_recent_activity(a, b));
        recent.truncate(limit);
        recent
    }

    pub(crate) fn search_conversations(&self, needle: &str) -> Vec<&Conversation> {
        self.conversations
            .iter()
            .filter(|conversation| conversation.matches_query(needle))
            .collect()
    }
}

fn by_recent_activity(a: &Conversation, b: &Conversation) -> Ordering {
    b.last_activity().cmp(&a.last_activity())
}

/// Sort conversations for display. The sort is stable, so conversations with
/// identical activity keep their stored relative order.
pub fn display_order(conversations: &[Conversation]) -> Vec<&Conversation> {
    let mut ordered: Vec<&Conversation> = conversations.iter().collect();
    ordered.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| by_recent_activity(a, b))
    });
    ordered
}
