//! State-machine handlers for inbound messages.
//!
//! Each handler runs the shared skeleton: phase one takes the conversation
//! lock, records the inbound message idempotently and handles stop
//! keywords; the provider call happens between the phases with no lock
//! held; phase two re-acquires the lock to append the outgoing message and
//! apply the status transition the provider dictated.

use sqlx::{Postgres, Transaction};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agent::{AgentMode, AgentRequest, BountyDecision};
use crate::constants::{is_stop_keyword, BOUNTY_CLARIFICATION, STOP_ACKNOWLEDGMENT};
use crate::database::locks;
use crate::error::Result;
use crate::models::{Campaign, Conversation, DemographicsUpdate, Message, User};
use crate::state_machine::ConversationStatus;

use super::InboundProcessor;

/// What phase one decided about an inbound message.
enum InboundOutcome {
    /// Message recorded; history loaded for the provider call.
    Proceed(Vec<crate::models::HistoryEntry>),
    /// Transport sid already recorded; drop the event.
    Duplicate,
    /// Stop keyword closed the conversation.
    Stopped,
}

impl InboundProcessor {
    /// Phase one of the handler skeleton, shared by all modes. When
    /// `promote_opener` is set, a first reply to an opening message flips
    /// the conversation to `active` inside the same locked transaction.
    async fn record_inbound(
        &self,
        conversation_id: Uuid,
        body: &str,
        transport_sid: Option<&str>,
        promote_opener: bool,
    ) -> Result<InboundOutcome> {
        let mut tx = self.pool().begin().await?;
        locks::conversation_lock(&mut tx, conversation_id).await?;

        let inserted = Message::insert_inbound(&mut tx, conversation_id, body, transport_sid).await?;
        if inserted.is_none() {
            tx.rollback().await?;
            info!(conversation_id = %conversation_id, "duplicate inbound message, skipping");
            return Ok(InboundOutcome::Duplicate);
        }

        if promote_opener {
            sqlx::query(
                "UPDATE conversations SET status = 'active', updated_at = NOW() \
                 WHERE id = $1 AND status = 'outreach_sent'",
            )
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        }

        if is_stop_keyword(body) {
            close_conversation(&mut tx, conversation_id, ConversationStatus::Abandoned).await?;
            tx.commit().await?;
            return Ok(InboundOutcome::Stopped);
        }

        let history = Message::load_history(&mut *tx, conversation_id).await?;
        tx.commit().await?;
        Ok(InboundOutcome::Proceed(history))
    }

    /// Onboarding: resume or create the user's campaign-less thread and
    /// collect demographics until the required set is complete.
    #[instrument(skip(self, body, transport_sid), fields(user_id = %user.id))]
    pub(crate) async fn handle_onboarding(
        &self,
        user: &User,
        body: &str,
        transport_sid: Option<&str>,
    ) -> Result<()> {
        let conversation = match Conversation::find_live_uncampaigned(self.pool(), user.id).await? {
            Some(conversation) => conversation,
            None => {
                let conversation =
                    Conversation::create_uncampaigned(self.pool(), user.id, &user.phone_number)
                        .await?;
                let mut tx = self.pool().begin().await?;
                User::begin_onboarding(&mut tx, user.id).await?;
                tx.commit().await?;
                conversation
            }
        };

        let history = match self
            .record_inbound(conversation.id, body, transport_sid, false)
            .await?
        {
            InboundOutcome::Proceed(history) => history,
            InboundOutcome::Duplicate => return Ok(()),
            InboundOutcome::Stopped => {
                self.safe_send(&user.phone_number, STOP_ACKNOWLEDGMENT).await;
                return Ok(());
            }
        };

        let mut request = AgentRequest::new(AgentMode::Onboarding);
        request.conversation_history = history;
        request.user_demographics = user.demographics_map();

        let reply = match self.call_agent(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "agent failed, leaving conversation unchanged");
                return Ok(());
            }
        };

        let demographics = DemographicsUpdate::from_map(&reply.user_demographics_update);

        let mut tx = self.pool().begin().await?;
        locks::conversation_lock(&mut tx, conversation.id).await?;
        Message::insert_outbound(&mut tx, conversation.id, &reply.message, None).await?;

        if !demographics.is_empty() {
            let merge = User::apply_demographics(&mut tx, user.id, &demographics).await?;
            if merge.newly_onboarded {
                info!(user_id = %user.id, "user onboarded");
            }
        }

        if reply.conversation_complete {
            bump_and_close(&mut tx, conversation.id, ConversationStatus::Completed).await?;
        } else {
            bump_message_count(&mut tx, conversation.id).await?;
        }
        tx.commit().await?;

        self.safe_send(&user.phone_number, &reply.message).await;
        Ok(())
    }

    /// Campaign conversation: two-way research exchange, extracting toward
    /// the campaign's schema until the provider signals completion.
    #[instrument(skip(self, body, transport_sid), fields(conversation_id = %conversation.id))]
    pub(crate) async fn handle_campaign(
        &self,
        user: &User,
        conversation: Conversation,
        body: &str,
        transport_sid: Option<&str>,
    ) -> Result<()> {
        let Some(campaign_id) = conversation.campaign_id else {
            warn!(conversation_id = %conversation.id, "campaign handler without campaign, degrading to general");
            return self.handle_general(user, body, transport_sid).await;
        };
        let Some(campaign) = Campaign::find_by_id(self.pool(), campaign_id).await? else {
            warn!(campaign_id = %campaign_id, "campaign row missing, degrading to general");
            return self.handle_general(user, body, transport_sid).await;
        };

        // First reply promotes the opener to a live exchange.
        let promote = conversation.status() == ConversationStatus::OutreachSent;
        let history = match self
            .record_inbound(conversation.id, body, transport_sid, promote)
            .await?
        {
            InboundOutcome::Proceed(history) => history,
            InboundOutcome::Duplicate => return Ok(()),
            InboundOutcome::Stopped => {
                self.safe_send(&user.phone_number, STOP_ACKNOWLEDGMENT).await;
                self.lifecycle().check_completion(campaign_id).await?;
                return Ok(());
            }
        };

        let extracted = conversation.extracted_map();
        let mut request = AgentRequest::new(AgentMode::Campaign);
        request.conversation_history = history;
        request.user_demographics = user.demographics_map();
        request.research_brief = Some(campaign.research_brief.clone());
        request.extraction_schema = Some(campaign.extraction_schema.clone());
        request.extracted_data = Some(extracted.clone());
        request.reward_text = campaign.reward_text.clone();
        request.reward_link = campaign.reward_link.clone();
        request.system_prompt_override = campaign.system_prompt_override.clone();

        let reply = match self.call_agent(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "agent failed, leaving conversation unchanged");
                return Ok(());
            }
        };

        let mut merged = extracted;
        merged.extend(reply.extracted_data_update.clone());
        let merged = serde_json::Value::Object(merged);

        let demographics = DemographicsUpdate::from_map(&reply.user_demographics_update);

        let mut tx = self.pool().begin().await?;
        locks::conversation_lock(&mut tx, conversation.id).await?;
        Message::insert_outbound(&mut tx, conversation.id, &reply.message, None).await?;

        if !demographics.is_empty() {
            User::apply_demographics(&mut tx, user.id, &demographics).await?;
        }

        if reply.conversation_complete {
            sqlx::query(
                r#"
                UPDATE conversations
                SET extracted_data = $2, message_count = message_count + 2,
                    status = 'completed', completed_at = NOW(), updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(conversation.id)
            .bind(&merged)
            .execute(&mut *tx)
            .await?;
            Campaign::increment_completed(&mut *tx, campaign_id).await?;
        } else {
            sqlx::query(
                r#"
                UPDATE conversations
                SET extracted_data = $2, message_count = message_count + 2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(conversation.id)
            .bind(&merged)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.safe_send(&user.phone_number, &reply.message).await;

        if reply.conversation_complete {
            self.lifecycle().check_completion(campaign_id).await?;
        }
        Ok(())
    }

    /// Bounty interpretation: the recipient has replied to a bounty
    /// notification; the provider reads it as accept, decline, or neither.
    #[instrument(skip(self, body, transport_sid), fields(conversation_id = %conversation.id))]
    pub(crate) async fn handle_bounty(
        &self,
        user: &User,
        conversation: Conversation,
        body: &str,
        transport_sid: Option<&str>,
    ) -> Result<()> {
        let Some(campaign_id) = conversation.campaign_id else {
            warn!(conversation_id = %conversation.id, "bounty handler without campaign, degrading to general");
            return self.handle_general(user, body, transport_sid).await;
        };
        let Some(campaign) = Campaign::find_by_id(self.pool(), campaign_id).await? else {
            warn!(campaign_id = %campaign_id, "campaign row missing, degrading to general");
            return self.handle_general(user, body, transport_sid).await;
        };

        let history = match self
            .record_inbound(conversation.id, body, transport_sid, false)
            .await?
        {
            InboundOutcome::Proceed(history) => history,
            InboundOutcome::Duplicate => return Ok(()),
            InboundOutcome::Stopped => {
                self.safe_send(&user.phone_number, STOP_ACKNOWLEDGMENT).await;
                self.lifecycle().check_completion(campaign_id).await?;
                return Ok(());
            }
        };

        let mut request = AgentRequest::new(AgentMode::Bounty);
        request.conversation_history = history;
        request.user_demographics = user.demographics_map();
        request.research_brief = Some(campaign.research_brief.clone());
        request.reward_text = campaign.reward_text.clone();
        request.reward_link = campaign.reward_link.clone();
        request.system_prompt_override = campaign.system_prompt_override.clone();

        let reply = match self.call_agent(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "agent failed, leaving conversation unchanged");
                return Ok(());
            }
        };

        let decision = reply.bounty_decision();
        let outgoing = if reply.message.trim().is_empty() {
            BOUNTY_CLARIFICATION.to_string()
        } else {
            reply.message.clone()
        };

        let mut tx = self.pool().begin().await?;
        locks::conversation_lock(&mut tx, conversation.id).await?;
        Message::insert_outbound(&mut tx, conversation.id, &outgoing, None).await?;

        match decision {
            BountyDecision::Accepted => {
                sqlx::query(
                    r#"
                    UPDATE conversations
                    SET status = 'active', message_count = message_count + 2, updated_at = NOW()
                    WHERE id = $1 AND status = 'bounty_sent'
                    "#,
                )
                .bind(conversation.id)
                .execute(&mut *tx)
                .await?;
                info!(conversation_id = %conversation.id, "bounty accepted");
            }
            BountyDecision::Declined => {
                sqlx::query(
                    r#"
                    UPDATE conversations
                    SET status = 'declined', message_count = message_count + 2,
                        completed_at = NOW(), updated_at = NOW()
                    WHERE id = $1 AND status = 'bounty_sent'
                    "#,
                )
                .bind(conversation.id)
                .execute(&mut *tx)
                .await?;
                info!(conversation_id = %conversation.id, "bounty declined");
            }
            BountyDecision::Ambiguous => {
                // Re-ask; the conversation stays in bounty_sent.
                bump_message_count(&mut tx, conversation.id).await?;
            }
        }
        tx.commit().await?;

        self.safe_send(&user.phone_number, &outgoing).await;

        if decision == BountyDecision::Declined {
            self.lifecycle().check_completion(campaign_id).await?;
        }
        Ok(())
    }

    /// Ad hoc thread for an onboarded user. One-shot: answered once and
    /// closed in the same pass, never accumulating multi-turn history.
    #[instrument(skip(self, body, transport_sid), fields(user_id = %user.id))]
    pub(crate) async fn handle_general(
        &self,
        user: &User,
        body: &str,
        transport_sid: Option<&str>,
    ) -> Result<()> {
        // A live campaign-less thread can exist on the degraded-routing
        // path; the one-per-user index forbids a second one, so reuse it.
        let conversation = match Conversation::find_live_uncampaigned(self.pool(), user.id).await? {
            Some(conversation) => conversation,
            None => {
                Conversation::create_uncampaigned(self.pool(), user.id, &user.phone_number).await?
            }
        };

        let history = match self
            .record_inbound(conversation.id, body, transport_sid, false)
            .await?
        {
            InboundOutcome::Proceed(history) => history,
            InboundOutcome::Duplicate => return Ok(()),
            InboundOutcome::Stopped => {
                self.safe_send(&user.phone_number, STOP_ACKNOWLEDGMENT).await;
                return Ok(());
            }
        };

        let mut request = AgentRequest::new(AgentMode::General);
        request.conversation_history = history;
        request.user_demographics = user.demographics_map();

        let reply = match self.call_agent(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "agent failed, leaving conversation unchanged");
                return Ok(());
            }
        };

        let mut tx = self.pool().begin().await?;
        locks::conversation_lock(&mut tx, conversation.id).await?;
        Message::insert_outbound(&mut tx, conversation.id, &reply.message, None).await?;
        bump_and_close(&mut tx, conversation.id, ConversationStatus::Completed).await?;
        tx.commit().await?;

        self.safe_send(&user.phone_number, &reply.message).await;
        Ok(())
    }
}

/// Close a conversation into a terminal status, stamping `completed_at`.
async fn close_conversation(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: Uuid,
    status: ConversationStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE conversations
        SET status = $2, completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(conversation_id)
    .bind(status.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// One inbound plus one outgoing message.
async fn bump_message_count(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "UPDATE conversations SET message_count = message_count + 2, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(conversation_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Bump the exchange count and close in one statement.
async fn bump_and_close(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: Uuid,
    status: ConversationStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE conversations
        SET status = $2, message_count = message_count + 2,
            completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(conversation_id)
    .bind(status.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
