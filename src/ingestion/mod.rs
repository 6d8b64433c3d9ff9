//! # Inbound Ingestion
//!
//! Receives inbound webhook events, deduplicates them, and routes each to
//! exactly one state-machine handler. One execution context runs per event;
//! the only cross-event coordination is the database (advisory locks, the
//! transport-sid uniqueness constraint) and the provider-call semaphore.
//!
//! Every handler follows the same skeleton: take the per-conversation
//! advisory lock, insert the inbound message idempotently, short-circuit on
//! stop keywords, then call the response provider *outside* the lock and
//! re-acquire it for the post-generation write.

mod handlers;

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::agent::{AgentReply, AgentRequest, ConversationAgent};
use crate::campaigns::CampaignLifecycle;
use crate::error::{MeshError, Result};
use crate::models::{Conversation, Message, User};
use crate::state_machine::{InboundRoute, RoutingSnapshot};
use crate::transport::MessageTransport;

/// Routes and processes inbound messages against the conversation state
/// machine.
pub struct InboundProcessor {
    pool: PgPool,
    agent: Arc<dyn ConversationAgent>,
    transport: Arc<dyn MessageTransport>,
    agent_semaphore: Arc<Semaphore>,
    lifecycle: CampaignLifecycle,
}

impl InboundProcessor {
    pub fn new(
        pool: PgPool,
        agent: Arc<dyn ConversationAgent>,
        transport: Arc<dyn MessageTransport>,
        max_concurrent_agent_calls: usize,
    ) -> Self {
        let lifecycle = CampaignLifecycle::new(pool.clone());
        Self {
            pool,
            agent,
            transport,
            agent_semaphore: Arc::new(Semaphore::new(max_concurrent_agent_calls)),
            lifecycle,
        }
    }

    /// Process one inbound event: resolve the user, pick a handler, run it.
    ///
    /// Errors returned here are logged by the webhook layer; the HTTP
    /// response has already been sent by then.
    #[instrument(skip(self, body), fields(phone = %phone))]
    pub async fn process_inbound(
        &self,
        phone: &str,
        body: &str,
        transport_sid: Option<&str>,
    ) -> Result<()> {
        // Cheap duplicate check before routing; the authoritative dedup is
        // the under-lock insert in each handler.
        if let Some(sid) = transport_sid {
            if Message::sid_exists(&self.pool, sid).await? {
                info!(transport_sid = sid, "duplicate webhook delivery, skipping");
                return Ok(());
            }
        }

        let (user, user_created) = User::find_or_create_by_phone(&self.pool, phone).await?;
        let live = Conversation::find_live_by_phone(&self.pool, phone).await?;

        let snapshot = RoutingSnapshot {
            user_created,
            user_status: user.status(),
            live_conversation: live
                .as_ref()
                .map(|c| (c.status(), c.campaign_id.is_some())),
        };

        match InboundRoute::decide(snapshot) {
            InboundRoute::Onboarding => self.handle_onboarding(&user, body, transport_sid).await,
            InboundRoute::Campaign => {
                let conversation = live.ok_or_else(|| {
                    MeshError::StateTransition("campaign route without live conversation".into())
                })?;
                self.handle_campaign(&user, conversation, body, transport_sid)
                    .await
            }
            InboundRoute::Bounty => {
                let conversation = live.ok_or_else(|| {
                    MeshError::StateTransition("bounty route without live conversation".into())
                })?;
                self.handle_bounty(&user, conversation, body, transport_sid)
                    .await
            }
            InboundRoute::General => self.handle_general(&user, body, transport_sid).await,
            InboundRoute::GeneralFallback => {
                warn!(
                    user_id = %user.id,
                    live_status = ?snapshot.live_conversation,
                    "no handler matches conversation state, degrading to general"
                );
                self.handle_general(&user, body, transport_sid).await
            }
        }
    }

    /// Provider call bounded by the global semaphore. Never invoked while a
    /// conversation lock is held.
    pub(crate) async fn call_agent(&self, request: AgentRequest) -> Result<AgentReply> {
        let _permit = self
            .agent_semaphore
            .acquire()
            .await
            .map_err(|_| MeshError::Agent("agent semaphore closed".to_string()))?;
        self.agent.respond(request).await
    }

    /// Send a message, logging transport failures instead of propagating
    /// them to the webhook path.
    pub(crate) async fn safe_send(&self, phone: &str, text: &str) -> Option<String> {
        match self.transport.send(phone, text).await {
            Ok(sid) => {
                info!(phone = %phone, transport_sid = %sid, "sent message");
                Some(sid)
            }
            Err(e) => {
                warn!(phone = %phone, error = %e, "failed to send message");
                None
            }
        }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn lifecycle(&self) -> &CampaignLifecycle {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::StaticAgent;
    use crate::agent::AgentMode;

    #[tokio::test]
    async fn test_agent_calls_are_bounded_by_semaphore() {
        let reply = AgentReply {
            message: "hi".to_string(),
            extracted_data_update: serde_json::Map::new(),
            user_demographics_update: serde_json::Map::new(),
            conversation_complete: false,
            bounty_accepted: None,
        };
        let agent = Arc::new(StaticAgent::new(reply));
        let max_in_flight = agent.max_in_flight.clone();

        let semaphore = Arc::new(Semaphore::new(2));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let agent = agent.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();
                agent.respond(AgentRequest::new(AgentMode::General)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(max_in_flight.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }
}
