//! Support chat models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tienda_core::{ConversationId, ConversationStatus, MessageId, MessageSender};

/// A support conversation with one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Realtime channel name shared by the customer widget and agents.
    #[must_use]
    pub fn channel(&self) -> String {
        channel_name(self.id)
    }
}

/// Realtime channel for a conversation.
#[must_use]
pub fn channel_name(id: ConversationId) -> String {
    format!("chat:{id}")
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: MessageSender,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
