//! # Outreach Dispatcher
//!
//! A single background loop that drains the outreach queue at a bounded
//! rate. Each cycle claims a batch of due entries atomically (skip-locked,
//! claim-and-mark in one statement) and dispatches them independently: a
//! failure in one entry never aborts the batch, and a failed cycle never
//! terminates the loop.
//!
//! Bounty-style entries take a per-user advisory lock and reserve the
//! user's single live outbound slot before sending; if another live thread
//! exists the entry reverts to pending for the next cycle.

use std::sync::Arc;

use futures::future::join_all;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::{AgentMode, AgentRequest, ConversationAgent};
use crate::campaigns::CampaignLifecycle;
use crate::config::OutreachConfig;
use crate::database::locks;
use crate::error::{MeshError, Result};
use crate::models::{Campaign, ClaimedEntry, Conversation, Message, OutreachQueueEntry, User};
use crate::transport::MessageTransport;

/// Deterministic opening message for bounty dispatch; no generation call is
/// warranted before the recipient has opted in.
pub fn bounty_opener(campaign: &Campaign) -> String {
    match &campaign.reward_text {
        Some(reward) => format!(
            "Hey! New paid research chat: {}. Reward: {}. Reply 'go' to jump in or 'pass' to skip.",
            campaign.name, reward
        ),
        None => format!(
            "Hey! New research chat: {}. Reply 'go' to jump in or 'pass' to skip.",
            campaign.name
        ),
    }
}

/// Running dispatcher, stoppable exactly once via its cancellation token.
pub struct DispatcherHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl DispatcherHandle {
    /// Signal the loop and wait for the current iteration to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "dispatcher task join failed");
        }
        info!("outreach dispatcher stopped");
    }
}

pub struct OutreachDispatcher {
    pool: PgPool,
    agent: Arc<dyn ConversationAgent>,
    transport: Arc<dyn MessageTransport>,
    config: OutreachConfig,
    lifecycle: CampaignLifecycle,
}

impl OutreachDispatcher {
    pub fn new(
        pool: PgPool,
        agent: Arc<dyn ConversationAgent>,
        transport: Arc<dyn MessageTransport>,
        config: OutreachConfig,
    ) -> Self {
        let lifecycle = CampaignLifecycle::new(pool.clone());
        Self {
            pool,
            agent,
            transport,
            config,
            lifecycle,
        }
    }

    /// Spawn the polling loop and hand back its supervisor handle.
    pub fn start(self: Arc<Self>) -> DispatcherHandle {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            self.run(loop_cancel).await;
        });
        info!("outreach dispatcher started");
        DispatcherHandle { handle, cancel }
    }

    async fn run(&self, cancel: CancellationToken) {
        // Recover claims orphaned by a crash mid-dispatch.
        match OutreachQueueEntry::requeue_stale_claims(&self.pool, self.config.stale_claim_seconds)
            .await
        {
            Ok(0) => {}
            Ok(n) => warn!(recovered = n, "requeued stale outreach claims"),
            Err(e) => error!(error = %e, "failed to requeue stale claims"),
        }

        let interval = self.config.poll_interval();
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let processed = match self.process_batch().await {
                Ok(count) => count,
                Err(e) => {
                    error!(error = %e, "outreach cycle failed");
                    0
                }
            };

            // Nonzero batches loop again immediately to drain backlog.
            if processed == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }
    }

    /// Claim and dispatch one batch. Returns the number of claimed entries.
    async fn process_batch(&self) -> Result<usize> {
        let claimed = OutreachQueueEntry::claim_due_batch(&self.pool, self.config.batch_size).await?;
        if claimed.is_empty() {
            return Ok(0);
        }

        debug!(claimed = claimed.len(), "claimed outreach entries");

        let dispatches = claimed
            .iter()
            .map(|entry| self.dispatch_entry_isolated(*entry));
        join_all(dispatches).await;

        Ok(claimed.len())
    }

    /// Per-entry dispatch with its own failure boundary: any error marks
    /// the entry and conversation failed and runs the completion check.
    async fn dispatch_entry_isolated(&self, entry: ClaimedEntry) {
        if let Err(e) = self.dispatch_entry(entry).await {
            error!(
                queue_id = %entry.id,
                conversation_id = %entry.conversation_id,
                error = %e,
                "outreach dispatch failed"
            );
            if let Err(mark_err) = self.mark_dispatch_failed(entry, &e.to_string()).await {
                error!(queue_id = %entry.id, error = %mark_err, "failed to record dispatch failure");
            }
        }
    }

    #[instrument(skip(self), fields(conversation_id = %entry.conversation_id))]
    async fn dispatch_entry(&self, entry: ClaimedEntry) -> Result<()> {
        let conversation = Conversation::find_by_id(&self.pool, entry.conversation_id)
            .await?
            .ok_or_else(|| {
                MeshError::NotFound(format!("conversation {}", entry.conversation_id))
            })?;
        let campaign_id = conversation.campaign_id.ok_or_else(|| {
            MeshError::StateTransition("outreach entry without campaign".to_string())
        })?;
        let campaign = Campaign::find_by_id(&self.pool, campaign_id)
            .await?
            .ok_or_else(|| MeshError::NotFound(format!("campaign {campaign_id}")))?;
        let user = User::find_by_id(&self.pool, conversation.user_id)
            .await?
            .ok_or_else(|| MeshError::NotFound(format!("user {}", conversation.user_id)))?;

        if campaign.is_bounty() {
            self.dispatch_bounty(entry, &conversation, &campaign, &user).await
        } else {
            self.dispatch_campaign_opener(entry, &conversation, &campaign, &user)
                .await
        }
    }

    /// Bounty dispatch: reserve the user's single live outbound slot under
    /// the per-user lock, then send the templated notification.
    async fn dispatch_bounty(
        &self,
        entry: ClaimedEntry,
        conversation: &Conversation,
        campaign: &Campaign,
        user: &User,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        locks::user_lock(&mut tx, user.id).await?;

        if Conversation::user_has_other_live(&mut tx, user.id, conversation.id).await? {
            // One live outbound thread per user, across campaigns: back to
            // pending for a later cycle.
            OutreachQueueEntry::revert_to_pending(&mut *tx, entry.id).await?;
            tx.commit().await?;
            info!(
                conversation_id = %conversation.id,
                user_id = %user.id,
                "user has a live thread, outreach deferred"
            );
            return Ok(());
        }

        // Reserve the slot before sending so a concurrent bounty claim for
        // the same user defers instead of double-sending.
        sqlx::query(
            "UPDATE conversations SET status = 'bounty_sent', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(conversation.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let opener = bounty_opener(campaign);
        let sid = self.transport.send(&conversation.phone_number, &opener).await?;

        let mut tx = self.pool.begin().await?;
        locks::conversation_lock(&mut tx, conversation.id).await?;
        Message::insert_outbound(&mut tx, conversation.id, &opener, Some(&sid)).await?;
        sqlx::query(
            "UPDATE conversations SET message_count = 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(conversation.id)
        .execute(&mut *tx)
        .await?;
        OutreachQueueEntry::mark_sent(&mut tx, entry.id).await?;
        tx.commit().await?;

        info!(conversation_id = %conversation.id, transport_sid = %sid, "bounty notification sent");
        Ok(())
    }

    /// Direct campaign dispatch: the provider writes the opener from an
    /// empty history.
    async fn dispatch_campaign_opener(
        &self,
        entry: ClaimedEntry,
        conversation: &Conversation,
        campaign: &Campaign,
        user: &User,
    ) -> Result<()> {
        let mut request = AgentRequest::new(AgentMode::Campaign);
        request.user_demographics = user.demographics_map();
        request.research_brief = Some(campaign.research_brief.clone());
        request.extraction_schema = Some(campaign.extraction_schema.clone());
        request.extracted_data = Some(serde_json::Map::new());
        request.reward_text = campaign.reward_text.clone();
        request.reward_link = campaign.reward_link.clone();
        request.system_prompt_override = campaign.system_prompt_override.clone();

        let reply = self.agent.respond(request).await?;
        let sid = self
            .transport
            .send(&conversation.phone_number, &reply.message)
            .await?;

        let mut tx = self.pool.begin().await?;
        locks::conversation_lock(&mut tx, conversation.id).await?;
        Message::insert_outbound(&mut tx, conversation.id, &reply.message, Some(&sid)).await?;
        sqlx::query(
            "UPDATE conversations SET status = 'outreach_sent', message_count = 1, \
             updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(conversation.id)
        .execute(&mut *tx)
        .await?;
        OutreachQueueEntry::mark_sent(&mut tx, entry.id).await?;
        tx.commit().await?;

        info!(conversation_id = %conversation.id, transport_sid = %sid, "outreach opener sent");
        Ok(())
    }

    /// Failure path: the queue entry records the error, the conversation
    /// goes terminal, and the campaign gets a completion check (a failed
    /// conversation still counts toward completion).
    async fn mark_dispatch_failed(&self, entry: ClaimedEntry, error_text: &str) -> Result<()> {
        OutreachQueueEntry::mark_failed(&self.pool, entry.id, error_text).await?;

        sqlx::query(
            "UPDATE conversations SET status = 'failed', updated_at = NOW() WHERE id = $1",
        )
        .bind(entry.conversation_id)
        .execute(&self.pool)
        .await?;

        let campaign_id: Option<uuid::Uuid> =
            sqlx::query_scalar("SELECT campaign_id FROM conversations WHERE id = $1")
                .bind(entry.conversation_id)
                .fetch_optional(&self.pool)
                .await?
                .flatten();
        if let Some(campaign_id) = campaign_id {
            self.lifecycle.check_completion(campaign_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn campaign(reward_text: Option<&str>) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            name: "Metro habits".to_string(),
            research_brief: "Commute patterns".to_string(),
            extraction_schema: serde_json::json!({}),
            system_prompt_override: None,
            reward_text: reward_text.map(String::from),
            reward_link: None,
            phone_numbers: None,
            targeting: None,
            status: "active".to_string(),
            total_conversations: 0,
            completed_conversations: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_bounty_opener_includes_reward() {
        let opener = bounty_opener(&campaign(Some("AED 20 voucher")));
        assert!(opener.contains("Metro habits"));
        assert!(opener.contains("AED 20 voucher"));
        assert!(opener.contains("'go'"));
    }

    #[test]
    fn test_bounty_opener_without_reward_still_prompts_opt_in() {
        let opener = bounty_opener(&campaign(None));
        assert!(opener.contains("Metro habits"));
        assert!(opener.contains("'pass'"));
    }
}
