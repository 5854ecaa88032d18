//! Support chat persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use tienda_core::{ConversationId, ConversationStatus, MessageId, MessageSender};

use super::{RepositoryError, parse_column};
use crate::models::{Conversation, Message};

const CONVERSATION_COLUMNS: &str =
    "id, customer_name, customer_email, status, created_at, updated_at, closed_at";

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: i32,
    customer_name: String,
    customer_email: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = RepositoryError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ConversationId::new(row.id),
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            status: parse_column(&row.status, "conversations.status")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i32,
    conversation_id: i32,
    sender: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RepositoryError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: MessageId::new(row.id),
            conversation_id: ConversationId::new(row.conversation_id),
            sender: parse_column(&row.sender, "messages.sender")?,
            body: row.body,
            created_at: row.created_at,
        })
    }
}

/// Repository for chat conversations and messages.
pub struct ChatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepository<'a> {
    /// Create a new chat repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Open a conversation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_conversation(
        &self,
        customer_name: &str,
        customer_email: Option<&str>,
    ) -> Result<Conversation, RepositoryError> {
        sqlx::query_as::<_, ConversationRow>(&format!(
            "INSERT INTO conversations (customer_name, customer_email) VALUES ($1, $2) \
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(customer_name)
        .bind(customer_email)
        .fetch_one(self.pool)
        .await?
        .try_into()
    }

    /// Get a conversation by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the conversation doesn't exist.
    pub async fn get(&self, id: ConversationId) -> Result<Conversation, RepositoryError> {
        sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// Conversations for the agent inbox, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<ConversationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY updated_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status.map(ConversationStatus::as_str))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Messages of a conversation, oldest first, optionally only those
    /// after a given message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn messages(
        &self,
        id: ConversationId,
        after: Option<MessageId>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, sender, body, created_at FROM messages \
             WHERE conversation_id = $1 AND ($2::int IS NULL OR id > $2) ORDER BY id",
        )
        .bind(id)
        .bind(after)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Append a message to an open conversation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the conversation doesn't exist
    /// and `RepositoryError::Conflict` if it is closed.
    pub async fn add_message(
        &self,
        id: ConversationId,
        sender: MessageSender,
        body: &str,
    ) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> = sqlx::query_scalar(
            "UPDATE conversations SET updated_at = now() WHERE id = $1 RETURNING status",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let status: ConversationStatus =
            parse_column(&status.ok_or(RepositoryError::NotFound)?, "conversations.status")?;

        if status == ConversationStatus::Closed {
            return Err(RepositoryError::Conflict(
                "conversation is closed".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (conversation_id, sender, body) VALUES ($1, $2, $3) \
             RETURNING id, conversation_id, sender, body, created_at",
        )
        .bind(id)
        .bind(sender.as_str())
        .bind(body)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Close a conversation. Closing twice keeps the first close time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the conversation doesn't exist.
    pub async fn close(&self, id: ConversationId) -> Result<Conversation, RepositoryError> {
        sqlx::query_as::<_, ConversationRow>(&format!(
            "UPDATE conversations SET status = 'closed', \
             closed_at = COALESCE(closed_at, now()), updated_at = now() \
             WHERE id = $1 RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_row_rejects_unknown_sender() {
        let row = MessageRow {
            id: 1,
            conversation_id: 2,
            sender: "bot".to_string(),
            body: "hola".to_string(),
            created_at: Utc::now(),
        };
        assert!(Message::try_from(row).is_err());
    }

    #[test]
    fn test_conversation_row_converts() {
        let now = Utc::now();
        let row = ConversationRow {
            id: 5,
            customer_name: "Luis".to_string(),
            customer_email: None,
            status: "closed".to_string(),
            created_at: now,
            updated_at: now,
            closed_at: Some(now),
        };
        let conversation = Conversation::try_from(row).expect("valid row");
        assert_eq!(conversation.status, ConversationStatus::Closed);
        assert_eq!(conversation.channel(), "chat:5");
    }
}
