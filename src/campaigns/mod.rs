//! # Campaign Lifecycle Manager
//!
//! Launch, pause, and completion checking. Launch populates the outreach
//! queue with a deterministic stagger so sends respect the configured rate
//! ceiling; the completion check is a reconciliation recount because
//! terminal conversations arrive from several independent paths (stop
//! keyword, provider completion, dispatch failure) that must not race each
//! other into a double count.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{MeshError, Result};
use crate::models::{Campaign, Conversation, NewCampaign, OutreachQueueEntry, User};
use crate::state_machine::CampaignStatus;

/// Offset in seconds for the entry at `position` in a launch sequence,
/// producing a smooth schedule of `rate_per_minute` sends per minute.
pub fn stagger_offset_seconds(position: usize, rate_per_minute: u32) -> i64 {
    let rate = rate_per_minute.max(1) as i64;
    (position as i64 * 60) / rate
}

/// Outcome of a launch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResult {
    pub conversations_created: i32,
    pub entries_reactivated: i32,
    pub outreach_rate_per_minute: u32,
    pub estimated_completion_minutes: i64,
}

/// Campaign lifecycle operations over the durable store.
#[derive(Clone)]
pub struct CampaignLifecycle {
    pool: PgPool,
}

impl CampaignLifecycle {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a campaign in `draft`.
    pub async fn create(&self, new_campaign: NewCampaign) -> Result<Campaign> {
        if new_campaign.name.trim().is_empty() {
            return Err(MeshError::Validation("campaign name cannot be empty".into()));
        }
        if new_campaign.research_brief.trim().is_empty() {
            return Err(MeshError::Validation("research brief cannot be empty".into()));
        }
        if new_campaign.phone_numbers.is_empty() {
            return Err(MeshError::Validation("recipient list cannot be empty".into()));
        }
        if !new_campaign.extraction_schema.is_object() {
            return Err(MeshError::Validation("extraction schema must be an object".into()));
        }

        Ok(Campaign::create(&self.pool, new_campaign).await?)
    }

    /// Launch (or resume) a campaign: reactivate paused queue entries in
    /// their original order, then create conversations and queue entries
    /// for recipients not yet contacted, all on one stagger sequence in one
    /// transaction.
    #[instrument(skip(self), fields(campaign_id = %campaign_id))]
    pub async fn launch(&self, campaign_id: Uuid, rate_per_minute: u32) -> Result<LaunchResult> {
        let mut tx = self.pool.begin().await?;

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, name, research_brief, extraction_schema, system_prompt_override,
                   reward_text, reward_link, phone_numbers, targeting, status,
                   total_conversations, completed_conversations, created_at, updated_at
            FROM campaigns
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(campaign_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| MeshError::NotFound(format!("campaign {campaign_id}")))?;

        if !campaign.status().can_launch() {
            return Err(MeshError::StateTransition(format!(
                "cannot launch campaign with status '{}'",
                campaign.status
            )));
        }

        let now = Utc::now();

        // Previously paused entries go back on the schedule first, keeping
        // their relative send order.
        let paused_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT q.id
            FROM outreach_queue q
            JOIN conversations c ON c.id = q.conversation_id
            WHERE c.campaign_id = $1 AND q.status = 'paused'
            ORDER BY q.scheduled_at
            FOR UPDATE OF q
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&mut *tx)
        .await?;

        for (position, queue_id) in paused_ids.iter().enumerate() {
            let scheduled_at =
                now + ChronoDuration::seconds(stagger_offset_seconds(position, rate_per_minute));
            sqlx::query(
                "UPDATE outreach_queue SET status = 'pending', scheduled_at = $2, error = NULL \
                 WHERE id = $1",
            )
            .bind(queue_id)
            .bind(scheduled_at)
            .execute(&mut *tx)
            .await?;
        }

        let mut position = paused_ids.len();
        let mut conversations_created = 0i32;
        let recipients = campaign.phone_numbers.clone().unwrap_or_default();

        for phone in &recipients {
            let user_id = User::upsert_for_launch(&mut tx, phone).await?;

            let Some(conversation_id) =
                Conversation::create_for_campaign(&mut tx, campaign_id, user_id, phone).await?
            else {
                continue; // already part of this campaign
            };

            let scheduled_at =
                now + ChronoDuration::seconds(stagger_offset_seconds(position, rate_per_minute));
            OutreachQueueEntry::enqueue(&mut tx, conversation_id, scheduled_at).await?;
            position += 1;
            conversations_created += 1;
        }

        sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'active', total_conversations = total_conversations + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(campaign_id)
        .bind(conversations_created)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let scheduled_total = position as i64;
        let estimated_completion_minutes =
            (stagger_offset_seconds(scheduled_total.max(1) as usize - 1, rate_per_minute) / 60) + 1;

        info!(
            campaign_id = %campaign_id,
            conversations_created = conversations_created,
            entries_reactivated = paused_ids.len(),
            "campaign launched"
        );

        Ok(LaunchResult {
            conversations_created,
            entries_reactivated: paused_ids.len() as i32,
            outreach_rate_per_minute: rate_per_minute,
            estimated_completion_minutes,
        })
    }

    /// Pause an active campaign: pending queue entries are parked; entries
    /// already sent or in flight are left alone.
    #[instrument(skip(self), fields(campaign_id = %campaign_id))]
    pub async fn pause(&self, campaign_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM campaigns WHERE id = $1 FOR UPDATE")
                .bind(campaign_id)
                .fetch_optional(&mut *tx)
                .await?;
        let status = status.ok_or_else(|| MeshError::NotFound(format!("campaign {campaign_id}")))?;

        let parsed: CampaignStatus = status
            .parse()
            .map_err(MeshError::StateTransition)?;
        if !parsed.can_pause() {
            return Err(MeshError::StateTransition(
                "can only pause active campaigns".to_string(),
            ));
        }

        sqlx::query("UPDATE campaigns SET status = 'paused', updated_at = NOW() WHERE id = $1")
            .bind(campaign_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE outreach_queue
            SET status = 'paused'
            WHERE conversation_id IN (SELECT id FROM conversations WHERE campaign_id = $1)
              AND status = 'pending'
            "#,
        )
        .bind(campaign_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(campaign_id = %campaign_id, "campaign paused");
        Ok(())
    }

    /// Completion check, invoked after any conversation reaches a terminal
    /// status. Recounts terminal conversations instead of incrementing a
    /// counter so concurrent terminal paths cannot double-complete.
    #[instrument(skip(self), fields(campaign_id = %campaign_id))]
    pub async fn check_completion(&self, campaign_id: Uuid) -> Result<()> {
        let total: Option<i32> =
            sqlx::query_scalar("SELECT total_conversations FROM campaigns WHERE id = $1")
                .bind(campaign_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(total) = total else {
            return Ok(());
        };
        if total <= 0 {
            return Ok(()); // empty campaigns never auto-complete
        }

        let terminal = Conversation::count_terminal_for_campaign(&self.pool, campaign_id).await?;
        if terminal >= total as i64 {
            let result = sqlx::query(
                r#"
                UPDATE campaigns
                SET status = 'completed', updated_at = NOW()
                WHERE id = $1 AND status IN ('active', 'paused')
                "#,
            )
            .bind(campaign_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() > 0 {
                info!(campaign_id = %campaign_id, terminal = terminal, "campaign completed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stagger_produces_smooth_schedule() {
        // rate=10/min: entries 0-9 land at 0..54s six seconds apart
        assert_eq!(stagger_offset_seconds(0, 10), 0);
        assert_eq!(stagger_offset_seconds(1, 10), 6);
        assert_eq!(stagger_offset_seconds(9, 10), 54);
        // second minute
        assert_eq!(stagger_offset_seconds(10, 10), 60);
        assert_eq!(stagger_offset_seconds(19, 10), 114);
        // third minute, 25 recipients end at +144s
        assert_eq!(stagger_offset_seconds(20, 10), 120);
        assert_eq!(stagger_offset_seconds(24, 10), 144);
    }

    #[test]
    fn test_stagger_is_monotonically_non_decreasing() {
        for rate in [1u32, 3, 7, 10, 60, 120] {
            let mut last = -1;
            for position in 0..200 {
                let offset = stagger_offset_seconds(position, rate);
                assert!(offset >= last, "rate {rate} position {position}");
                last = offset;
            }
        }
    }

    #[test]
    fn test_stagger_guards_zero_rate() {
        // A zero rate clamps to one per minute instead of dividing by zero
        assert_eq!(stagger_offset_seconds(3, 0), 180);
    }
}
