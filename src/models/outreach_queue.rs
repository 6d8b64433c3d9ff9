//! # Outreach Queue Model
//!
//! Scheduled units of dispatch. The Campaign Lifecycle Manager produces
//! entries at launch; the Outreach Dispatcher consumes them. Claiming flips
//! status to `sent` and stamps `claimed_at` in the same statement — claim
//! and mark-taken are never separate operations — and `FOR UPDATE SKIP
//! LOCKED` keeps concurrent dispatcher instances off each other's rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::state_machine::QueueStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OutreachQueueEntry {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A claimed entry handed to per-entry dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ClaimedEntry {
    pub id: Uuid,
    pub conversation_id: Uuid,
}

impl OutreachQueueEntry {
    pub fn status(&self) -> Option<QueueStatus> {
        self.status.parse().ok()
    }

    pub async fn enqueue(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO outreach_queue (conversation_id, scheduled_at, status)
            VALUES ($1, $2, 'pending')
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(scheduled_at)
        .fetch_one(&mut **tx)
        .await
    }

    /// Atomically claim a batch of due, pending entries ordered by schedule
    /// time. The subselect skips rows locked by a concurrent claimant.
    pub async fn claim_due_batch(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<ClaimedEntry>, sqlx::Error> {
        sqlx::query_as::<_, ClaimedEntry>(
            r#"
            UPDATE outreach_queue
            SET status = 'sent', claimed_at = NOW()
            WHERE id IN (
                SELECT id FROM outreach_queue
                WHERE status = 'pending' AND scheduled_at <= NOW()
                ORDER BY scheduled_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, conversation_id
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Stamp a claimed entry as fully dispatched.
    pub async fn mark_sent(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE outreach_queue SET sent_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(
        executor: impl sqlx::PgExecutor<'_>,
        id: Uuid,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE outreach_queue SET status = 'failed', error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Return a claimed entry to the pending pool for the next cycle.
    pub async fn revert_to_pending(
        executor: impl sqlx::PgExecutor<'_>,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE outreach_queue SET status = 'pending', claimed_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Revert claims that never completed their send — a crash mid-dispatch
    /// leaves status `sent` with no `sent_at`. Returns the number of
    /// recovered entries.
    pub async fn requeue_stale_claims(
        pool: &PgPool,
        older_than_seconds: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE outreach_queue
            SET status = 'pending', claimed_at = NULL
            WHERE status = 'sent'
              AND sent_at IS NULL
              AND claimed_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than_seconds as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
