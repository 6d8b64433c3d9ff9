//! # Message Model
//!
//! Append-only message records. The transport delivery id, when present, is
//! unique across all messages and serves as the inbound idempotency key:
//! the insert is `ON CONFLICT DO NOTHING` against that partial index, so a
//! duplicate webhook yields zero rows rather than an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::state_machine::MessageSender;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: String,
    pub content: String,
    pub transport_sid: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Slim history row for provider requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub sender: String,
    pub content: String,
}

impl Message {
    pub fn sender(&self) -> Option<MessageSender> {
        self.sender.parse().ok()
    }

    /// Insert an inbound message keyed on the transport sid. Returns `None`
    /// when the sid was already recorded (duplicate delivery).
    pub async fn insert_inbound(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        content: &str,
        transport_sid: Option<&str>,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO messages (conversation_id, sender, content, transport_sid)
            VALUES ($1, 'user', $2, $3)
            ON CONFLICT (transport_sid) WHERE transport_sid IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(content)
        .bind(transport_sid)
        .fetch_optional(&mut **tx)
        .await
    }

    /// Record an outgoing message, tagging it with the transport's returned
    /// identifier when the send already happened.
    pub async fn insert_outbound(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        content: &str,
        transport_sid: Option<&str>,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO messages (conversation_id, sender, content, transport_sid)
            VALUES ($1, 'agent', $2, $3)
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(content)
        .bind(transport_sid)
        .fetch_one(&mut **tx)
        .await
    }

    /// Cheap pre-routing duplicate check. The authoritative dedup is the
    /// under-lock insert above; this avoids touching routing for retries.
    pub async fn sid_exists(
        executor: impl sqlx::PgExecutor<'_>,
        transport_sid: &str,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM messages WHERE transport_sid = $1")
                .bind(transport_sid)
                .fetch_optional(executor)
                .await?;
        Ok(found.is_some())
    }

    /// Full ordered history for a conversation.
    pub async fn load_history(
        executor: impl sqlx::PgExecutor<'_>,
        conversation_id: Uuid,
    ) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT sender, content
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(conversation_id)
        .fetch_all(executor)
        .await
    }

    /// Full message rows for the conversation detail endpoint.
    pub async fn list_for_conversation(
        executor: impl sqlx::PgExecutor<'_>,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, sender, content, transport_sid, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(conversation_id)
        .fetch_all(executor)
        .await
    }
}
