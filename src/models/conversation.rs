//! # Conversation Model
//!
//! The unit of state-machine execution. A conversation belongs to one user
//! and optionally one campaign (a null campaign is an onboarding or ad hoc
//! thread). Status strings are owned by
//! [`crate::state_machine::ConversationStatus`]; this module holds the row
//! type and the persistence operations shared by the handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::constants::status_groups::{
    LIVE_CONVERSATION_STATUSES, TERMINAL_CONVERSATION_STATUSES,
};
use crate::state_machine::ConversationStatus;

fn live_statuses() -> Vec<String> {
    LIVE_CONVERSATION_STATUSES.iter().map(|s| s.to_string()).collect()
}

fn terminal_statuses() -> Vec<String> {
    TERMINAL_CONVERSATION_STATUSES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub user_id: Uuid,
    pub phone_number: String,
    pub status: String,
    pub extracted_data: serde_json::Value,
    pub message_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

const CONVERSATION_COLUMNS: &str = "id, campaign_id, user_id, phone_number, status, \
     extracted_data, message_count, created_at, updated_at, completed_at";

impl Conversation {
    pub fn status(&self) -> ConversationStatus {
        self.status.parse().unwrap_or_default()
    }

    pub fn extracted_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.extracted_data
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Most recently created live conversation for an address, if any.
    pub async fn find_live_by_phone(
        pool: &PgPool,
        phone_number: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE phone_number = $1
              AND status = ANY($2)
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(phone_number)
        .bind(live_statuses())
        .fetch_optional(pool)
        .await
    }

    /// The user's live campaign-less thread (onboarding in progress), if any.
    pub async fn find_live_uncampaigned(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE user_id = $1
              AND campaign_id IS NULL
              AND status = ANY($2)
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(live_statuses())
        .fetch_optional(pool)
        .await
    }

    /// Create a campaign-less thread (onboarding or ad hoc), already active.
    pub async fn create_uncampaigned(
        pool: &PgPool,
        user_id: Uuid,
        phone_number: &str,
    ) -> Result<Conversation, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (user_id, phone_number, status)
            VALUES ($1, $2, 'active')
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(phone_number)
        .fetch_one(pool)
        .await
    }

    /// Idempotent insert for campaign launch: a pre-existing conversation
    /// for the (campaign, address) pair is left untouched and `None` is
    /// returned.
    pub async fn create_for_campaign(
        tx: &mut Transaction<'_, Postgres>,
        campaign_id: Uuid,
        user_id: Uuid,
        phone_number: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO conversations (campaign_id, user_id, phone_number, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (campaign_id, phone_number) WHERE campaign_id IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(campaign_id)
        .bind(user_id)
        .bind(phone_number)
        .fetch_optional(&mut **tx)
        .await
    }

    /// List a campaign's conversations in creation order.
    pub async fn list_for_campaign(
        pool: &PgPool,
        campaign_id: Uuid,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE campaign_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(campaign_id)
        .fetch_all(pool)
        .await
    }

    /// Completed conversations with their extracted data, oldest completion
    /// first.
    pub async fn list_completed_for_campaign(
        pool: &PgPool,
        campaign_id: Uuid,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE campaign_id = $1 AND status = 'completed'
            ORDER BY completed_at
            "#
        ))
        .bind(campaign_id)
        .fetch_all(pool)
        .await
    }

    /// Whether the user holds any other live thread. Used by the bounty
    /// dispatcher's one-live-thread-per-user guard.
    pub async fn user_has_other_live(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        excluding: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM conversations
            WHERE user_id = $1
              AND id <> $2
              AND status = ANY($3)
            "#,
        )
        .bind(user_id)
        .bind(excluding)
        .bind(live_statuses())
        .fetch_one(&mut **tx)
        .await?;
        Ok(count > 0)
    }

    /// Count of conversations in a terminal status for a campaign. The
    /// completion check recounts here instead of trusting counters because
    /// terminal states arrive from several independent paths.
    pub async fn count_terminal_for_campaign(
        executor: impl sqlx::PgExecutor<'_>,
        campaign_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM conversations
            WHERE campaign_id = $1
              AND status = ANY($2)
            "#,
        )
        .bind(campaign_id)
        .bind(terminal_statuses())
        .fetch_one(executor)
        .await
    }
}
